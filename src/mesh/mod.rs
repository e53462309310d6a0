//! GPU meshes and vertex layouts.
//!
//! A [`Mesh`] bundles vertex buffers, an optional 32-bit index buffer and a
//! shared [`VertexLayout`]. Layouts are `Arc`-shared: there are only a few
//! combinations across many meshes, and pointer equality groups meshes by
//! pipeline variant.

mod data;
mod layout;

pub use data::{Mesh, PrimitiveTopology};
pub use layout::{
    VertexAttribute, VertexAttributeFormat, VertexAttributeSemantic, VertexBufferLayout,
    VertexLayout, VertexStepMode,
};

//! Descriptor and root-signature management.
//!
//! Passes declare their shader binding contract through a
//! [`RootSignatureBuilder`]: constant buffers, shader resources, unordered
//! access views, descriptor tables, static samplers and root constants, each
//! in a register space. Building yields an immutable [`RootSignature`] whose
//! register macros keep the pass and its shaders agreeing on binding slots.
//!
//! Per-pass descriptors live in a [`DescriptorHeap`] with a capacity fixed by
//! the pass kind; each [`DescriptorAllocation`] pins the viewed resource
//! alive for the lifetime of the heap.

mod heap;
mod root_signature;

pub use heap::{DescriptorAllocation, DescriptorBinding, DescriptorHeap, DescriptorView};
pub use root_signature::{
    BINDLESS_DESCRIPTOR_COUNT, RegisterKind, RootParameter, RootParameterKind, RootSignature,
    RootSignatureAllocation, RootSignatureBuilder,
};

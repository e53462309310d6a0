//! GPU resources.
//!
//! This module contains the GPU resource types that are created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer
//! - [`Texture`] - GPU texture/image
//! - [`Sampler`] - Texture sampler
//!
//! Resources are reference-counted with [`Arc`] and can be shared across threads.
//! Each resource holds a strong reference to its parent device and owns its
//! backend handle; dropping the last `Arc` releases the native allocation.
//!
//! Buffers and textures additionally track their last-known
//! [`ResourceState`](crate::state::ResourceState), which the barrier batch
//! consults to skip redundant transitions.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod sampler;
mod texture;

pub use buffer::Buffer;
pub use sampler::Sampler;
pub use texture::Texture;

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique resource id.
pub(crate) fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

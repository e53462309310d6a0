//! GPU buffer resource.

use std::sync::{Arc, Mutex};

use crate::backend::GpuBuffer;
use crate::device::GraphicsDevice;
use crate::state::ResourceState;
use crate::types::{BufferDescriptor, BufferUsage, MemoryLocation};

/// A GPU buffer resource.
///
/// Buffers are created by [`GraphicsDevice::create_buffer`] and are
/// reference-counted. Each buffer owns its backend allocation and holds a
/// strong reference to its parent device; dropping the last `Arc` releases
/// the native memory.
///
/// The buffer tracks its last-known [`ResourceState`], updated by the
/// barrier batch as transitions are recorded.
///
/// # Example
///
/// ```ignore
/// let buffer = device.create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))?;
/// println!("Buffer size: {}", buffer.size());
/// ```
pub struct Buffer {
    device: Arc<GraphicsDevice>,
    descriptor: BufferDescriptor,
    gpu_handle: GpuBuffer,
    /// Process-unique id, used by the barrier batch to dedup transitions.
    id: u64,
    /// Last-known GPU-visible state, updated at CPU recording order.
    state: Mutex<ResourceState>,
}

impl Buffer {
    /// Create a new buffer (called by GraphicsDevice).
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        descriptor: BufferDescriptor,
        gpu_handle: GpuBuffer,
    ) -> Self {
        Self {
            device,
            descriptor,
            gpu_handle,
            id: super::next_resource_id(),
            state: Mutex::new(ResourceState::Common),
        }
    }

    /// Get the parent device.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Get the backend buffer handle.
    pub fn gpu_handle(&self) -> &GpuBuffer {
        &self.gpu_handle
    }

    /// Get the process-unique resource id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the buffer descriptor.
    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    /// Get the buffer size in bytes.
    pub fn size(&self) -> u64 {
        self.descriptor.size
    }

    /// Get the buffer usage flags.
    pub fn usage(&self) -> BufferUsage {
        self.descriptor.usage
    }

    /// Get the memory heap the buffer was allocated from.
    pub fn location(&self) -> MemoryLocation {
        self.descriptor.location
    }

    /// Get the buffer label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Get the last-known resource state.
    pub fn current_state(&self) -> ResourceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Update the tracked resource state (called by the barrier batch).
    pub(crate) fn set_current_state(&self, state: ResourceState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("usage", &self.descriptor.usage)
            .field("location", &self.descriptor.location)
            .field("label", &self.descriptor.label)
            .field("state", &self.current_state())
            .finish()
    }
}

// Ensure Buffer is Send + Sync
static_assertions::assert_impl_all!(Buffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    #[test]
    fn test_buffer_starts_in_common_state() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(1024, BufferUsage::VERTEX))
            .unwrap();
        assert_eq!(buffer.current_state(), ResourceState::Common);
        assert_eq!(buffer.size(), 1024);
    }

    #[test]
    fn test_buffer_ids_are_unique() {
        let device = create_test_device();
        let a = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        let b = device
            .create_buffer(&BufferDescriptor::new(64, BufferUsage::UNIFORM))
            .unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_buffer_debug() {
        let device = create_test_device();
        let buffer = device
            .create_buffer(&BufferDescriptor::new(2048, BufferUsage::INDEX).with_label("indices"))
            .unwrap();
        let debug = format!("{:?}", buffer);
        assert!(debug.contains("2048"));
        assert!(debug.contains("indices"));
    }
}

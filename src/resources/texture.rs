//! GPU texture resource.

use std::sync::{Arc, Mutex};

use crate::backend::GpuTexture;
use crate::device::GraphicsDevice;
use crate::state::ResourceState;
use crate::types::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

/// A GPU texture resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`] and are
/// reference-counted. Each texture owns its backend allocation and holds a
/// strong reference to its parent device.
///
/// Like buffers, textures track their last-known [`ResourceState`]; passes
/// transition them through the command recorder before each access-pattern
/// change.
pub struct Texture {
    device: Arc<GraphicsDevice>,
    descriptor: TextureDescriptor,
    gpu_handle: GpuTexture,
    id: u64,
    state: Mutex<ResourceState>,
}

impl Texture {
    /// Create a new texture (called by GraphicsDevice).
    pub(crate) fn new(
        device: Arc<GraphicsDevice>,
        descriptor: TextureDescriptor,
        gpu_handle: GpuTexture,
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

    /// Get the backend texture handle.
    pub fn gpu_handle(&self) -> &GpuTexture {
        &self.gpu_handle
    }

    /// Get the process-unique resource id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the texture usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the mip level count.
    pub fn mip_level_count(&self) -> u32 {
        self.descriptor.mip_level_count
    }

    /// Get the texture label, if set.
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

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .field("state", &self.current_state())
            .finish()
    }
}

// Ensure Texture is Send + Sync
static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    #[test]
    fn test_texture_dimensions() {
        let device = create_test_device();
        let texture = device
            .create_texture(&TextureDescriptor::new_2d(
                800,
                600,
                TextureFormat::Rgba8Unorm,
                TextureUsage::TEXTURE_BINDING,
            ))
            .unwrap();
        assert_eq!(texture.width(), 800);
        assert_eq!(texture.height(), 600);
        assert_eq!(texture.size().depth, 1);
    }

    #[test]
    fn test_texture_starts_in_common_state() {
        let device = create_test_device();
        let texture = device
            .create_texture(&TextureDescriptor::render_target(
                64,
                64,
                TextureFormat::Rgba16Float,
            ))
            .unwrap();
        assert_eq!(texture.current_state(), ResourceState::Common);
    }
}

//! GPU memory management.
//!
//! The [`MemoryManager`] is the owner of long-lived GPU allocations: it
//! creates buffers and textures through the device, keeps a strong reference
//! to each, and releases them explicitly at teardown. Passes hold `Arc`
//! clones whose lifetime is bounded by the manager.
//!
//! Upload paths go through a [`TempUploadPool`] of host-visible staging
//! buffers aged per frame, so a staging buffer is never reused while a
//! submission referencing it may still be in flight.

mod temp;

pub use temp::{TEMP_BUFFER_FRAME_LIFE_TIME, TempUploadPool};

use std::sync::Arc;

use crate::commands::CommandRecorder;
use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::{Buffer, Texture};
use crate::state::ResourceState;
use crate::types::{BufferDescriptor, MemoryLocation, TextureDescriptor, TextureUsage};

/// Owner of long-lived GPU allocations.
pub struct MemoryManager {
    device: Arc<GraphicsDevice>,
    buffers: Vec<Arc<Buffer>>,
    textures: Vec<Arc<Texture>>,
    temp_pool: TempUploadPool,
}

impl MemoryManager {
    /// Create a memory manager on a device.
    pub fn new(device: Arc<GraphicsDevice>) -> Self {
        Self {
            temp_pool: TempUploadPool::new(Arc::clone(&device)),
            device,
            buffers: Vec::new(),
            textures: Vec::new(),
        }
    }

    /// The device allocations are created on.
    pub fn device(&self) -> &Arc<GraphicsDevice> {
        &self.device
    }

    /// Allocate a buffer owned by the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor is invalid or native allocation
    /// fails; callers treat native failure as fatal.
    pub fn allocate_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<Arc<Buffer>, GraphicsError> {
        let buffer = self.device.create_buffer(descriptor)?;
        self.buffers.push(Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Allocate a texture owned by the manager.
    pub fn allocate_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let texture = self.device.create_texture(descriptor)?;
        self.textures.push(Arc::clone(&texture));
        Ok(texture)
    }

    /// Write bytes into a host-visible upload buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not in [`MemoryLocation::Upload`]
    /// or the range is out of bounds.
    pub fn upload_buffer_data(
        &self,
        buffer: &Arc<Buffer>,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        if buffer.location() != MemoryLocation::Upload {
            return Err(GraphicsError::InvalidParameter(format!(
                "upload_buffer_data on a {:?} buffer; only Upload buffers are host-writable",
                buffer.location()
            )));
        }
        if offset + data.len() as u64 > buffer.size() {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {offset} exceeds buffer size {}",
                data.len(),
                buffer.size()
            )));
        }
        self.device
            .backend()
            .write_buffer(buffer.gpu_handle(), offset, data)
    }

    /// Allocate a texture and record the upload of its mip 0 contents.
    ///
    /// Stages `data` through a temp upload buffer, records the copy into the
    /// texture and a transition to [`ResourceState::ShaderResource`], so the
    /// texture is sample-ready once the recorded commands execute.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` does not match the descriptor's mip 0 byte
    /// size, or any allocation fails.
    pub fn allocate_texture_and_upload(
        &mut self,
        descriptor: &TextureDescriptor,
        data: &[u8],
        recorder: &mut CommandRecorder,
    ) -> Result<Arc<Texture>, GraphicsError> {
        let bytes_per_row = descriptor.size.width * descriptor.format.block_size();
        let expected = bytes_per_row as u64 * descriptor.size.height as u64;
        if data.len() as u64 != expected {
            return Err(GraphicsError::InvalidParameter(format!(
                "texture upload of {} bytes, expected {expected} for {}x{} {:?}",
                data.len(),
                descriptor.size.width,
                descriptor.size.height,
                descriptor.format
            )));
        }

        let descriptor = descriptor
            .clone()
            .with_usage(TextureUsage::COPY_DST | TextureUsage::TEXTURE_BINDING);
        let texture = self.allocate_texture(&descriptor)?;

        let staging = self.temp_pool.allocate(expected)?;
        self.device
            .backend()
            .write_buffer(staging.gpu_handle(), 0, data)?;

        recorder.copy_buffer_to_texture(
            &staging,
            0,
            bytes_per_row,
            &texture,
            0,
            [0, 0],
            [descriptor.size.width, descriptor.size.height],
        );
        recorder.transition_texture(&texture, ResourceState::ShaderResource);

        Ok(texture)
    }

    /// Get a staging buffer from the temp pool.
    pub fn allocate_temp_upload_buffer(&mut self, size: u64) -> Result<Arc<Buffer>, GraphicsError> {
        self.temp_pool.allocate(size)
    }

    /// Age the temp pool; call once per frame.
    pub fn tick_frame(&mut self) {
        self.temp_pool.tick_frame();
    }

    /// The temp upload pool.
    pub fn temp_pool(&self) -> &TempUploadPool {
        &self.temp_pool
    }

    /// Release a buffer owned by the manager.
    ///
    /// The caller must have fence-waited GPU work referencing it first.
    pub fn release_buffer(&mut self, buffer: &Arc<Buffer>) {
        self.buffers.retain(|b| !Arc::ptr_eq(b, buffer));
    }

    /// Release a texture owned by the manager.
    pub fn release_texture(&mut self, texture: &Arc<Texture>) {
        self.textures.retain(|t| !Arc::ptr_eq(t, texture));
    }

    /// Release every owned allocation and the temp pool.
    ///
    /// The caller must have waited the frame pipeline idle first.
    pub fn release_all(&mut self) {
        log::info!(
            "MemoryManager: releasing {} buffers, {} textures",
            self.buffers.len(),
            self.textures.len()
        );
        self.buffers.clear();
        self.textures.clear();
        self.temp_pool.clear();
    }

    /// Number of owned buffers.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of owned textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Total bytes of owned buffer allocations.
    pub fn buffer_bytes(&self) -> u64 {
        self.buffers.iter().map(|b| b.size()).sum()
    }
}

impl std::fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryManager")
            .field("buffer_count", &self.buffers.len())
            .field("texture_count", &self.textures.len())
            .field("temp_pool_size", &self.temp_pool.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRecorder;
    use crate::instance::GraphicsInstance;
    use crate::types::{BufferUsage, TextureFormat};

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    #[test]
    fn test_allocations_are_owned() {
        let device = create_test_device();
        let mut memory = MemoryManager::new(Arc::clone(&device));

        {
            let _buffer = memory
                .allocate_buffer(&BufferDescriptor::new(256, BufferUsage::VERTEX))
                .unwrap();
        }
        // The manager's strong reference keeps the buffer alive after the
        // caller's Arc drops.
        device.cleanup_dead_resources();
        assert_eq!(device.buffer_count(), 1);
        assert_eq!(memory.buffer_count(), 1);

        memory.release_all();
        device.cleanup_dead_resources();
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_upload_requires_upload_heap() {
        let device = create_test_device();
        let mut memory = MemoryManager::new(device);

        let gpu_only = memory
            .allocate_buffer(&BufferDescriptor::new(64, BufferUsage::STORAGE))
            .unwrap();
        assert!(memory.upload_buffer_data(&gpu_only, 0, &[0u8; 16]).is_err());

        let upload = memory
            .allocate_buffer(&BufferDescriptor::upload(64, BufferUsage::COPY_SRC))
            .unwrap();
        memory.upload_buffer_data(&upload, 0, &[7u8; 16]).unwrap();
        let read_back = memory.device().backend().read_buffer(upload.gpu_handle(), 0, 16);
        assert_eq!(read_back, vec![7u8; 16]);
    }

    #[test]
    fn test_upload_bounds_checked() {
        let device = create_test_device();
        let mut memory = MemoryManager::new(device);
        let upload = memory
            .allocate_buffer(&BufferDescriptor::upload(16, BufferUsage::COPY_SRC))
            .unwrap();
        assert!(memory.upload_buffer_data(&upload, 8, &[0u8; 16]).is_err());
    }

    #[test]
    fn test_texture_upload_records_copy_and_transition() {
        let device = create_test_device();
        let mut memory = MemoryManager::new(device);
        let mut recorder = CommandRecorder::new();

        let descriptor =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::empty());
        let data = vec![255u8; 4 * 4 * 4];
        let texture = memory
            .allocate_texture_and_upload(&descriptor, &data, &mut recorder)
            .unwrap();

        let commands = recorder.finish();
        // Copy plus the deferred transition to ShaderResource.
        assert!(!commands.is_empty());
        assert_eq!(texture.current_state(), ResourceState::ShaderResource);
    }

    #[test]
    fn test_texture_upload_size_mismatch() {
        let device = create_test_device();
        let mut memory = MemoryManager::new(device);
        let mut recorder = CommandRecorder::new();

        let descriptor =
            TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::empty());
        let result = memory.allocate_texture_and_upload(&descriptor, &[0u8; 10], &mut recorder);
        assert!(result.is_err());
    }
}

//! Frame-lifetime temp upload buffer pool.

use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Buffer;
use crate::types::{BufferDescriptor, BufferUsage};

/// Frames an allocated temp buffer stays unavailable before reuse.
///
/// Matches the frames-in-flight bound plus one: by the time the counter
/// reaches zero, no in-flight submission can still reference the buffer.
pub const TEMP_BUFFER_FRAME_LIFE_TIME: u32 = 3;

#[derive(Debug)]
struct TempEntry {
    buffer: Arc<Buffer>,
    /// Frames until this entry re-enters the free list. Zero means free.
    remain_frame_to_reuse: u32,
}

/// Pool of host-visible staging buffers with frame-based reuse.
///
/// Allocating hands out a free entry of sufficient size, or creates a new
/// upload buffer. Every handed-out entry starts a countdown of
/// [`TEMP_BUFFER_FRAME_LIFE_TIME`] frames, decremented by
/// [`tick_frame`](Self::tick_frame); only entries that reach zero are
/// eligible for reuse.
#[derive(Debug)]
pub struct TempUploadPool {
    device: Arc<GraphicsDevice>,
    entries: Vec<TempEntry>,
}

impl TempUploadPool {
    /// Create an empty pool on a device.
    pub fn new(device: Arc<GraphicsDevice>) -> Self {
        Self {
            device,
            entries: Vec::new(),
        }
    }

    /// Get a staging buffer of at least `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh buffer allocation fails.
    pub fn allocate(&mut self, size: u64) -> Result<Arc<Buffer>, GraphicsError> {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.remain_frame_to_reuse == 0 && e.buffer.size() >= size)
        {
            entry.remain_frame_to_reuse = TEMP_BUFFER_FRAME_LIFE_TIME;
            log::trace!("TempUploadPool: reusing buffer of size {}", entry.buffer.size());
            return Ok(Arc::clone(&entry.buffer));
        }

        let buffer = self.device.create_buffer(
            &BufferDescriptor::upload(size, BufferUsage::COPY_SRC).with_label("temp_upload"),
        )?;
        log::trace!("TempUploadPool: allocated new buffer of size {size}");
        self.entries.push(TempEntry {
            buffer: Arc::clone(&buffer),
            remain_frame_to_reuse: TEMP_BUFFER_FRAME_LIFE_TIME,
        });
        Ok(buffer)
    }

    /// Age the pool by one frame.
    pub fn tick_frame(&mut self) {
        for entry in &mut self.entries {
            entry.remain_frame_to_reuse = entry.remain_frame_to_reuse.saturating_sub(1);
        }
    }

    /// Total number of pooled buffers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the pool holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries currently eligible for reuse.
    pub fn free_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.remain_frame_to_reuse == 0)
            .count()
    }

    /// Drop every pooled buffer.
    ///
    /// The caller must have waited for in-flight GPU work first.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    #[test]
    fn test_not_reusable_before_lifetime_elapses() {
        let mut pool = TempUploadPool::new(create_test_device());
        let first = pool.allocate(256).unwrap();

        pool.tick_frame();
        pool.tick_frame();

        // Two ticks in, the entry is still cooling down.
        assert_eq!(pool.free_count(), 0);
        let second = pool.allocate(256).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_reusable_after_lifetime_elapses() {
        let mut pool = TempUploadPool::new(create_test_device());
        let first = pool.allocate(256).unwrap();

        pool.tick_frame();
        pool.tick_frame();
        pool.tick_frame();

        assert_eq!(pool.free_count(), 1);
        let second = pool.allocate(256).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_reuse_requires_sufficient_size() {
        let mut pool = TempUploadPool::new(create_test_device());
        pool.allocate(128).unwrap();
        pool.tick_frame();
        pool.tick_frame();
        pool.tick_frame();

        // Free entry is too small; a bigger request allocates fresh.
        pool.allocate(512).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_reuse_restarts_countdown() {
        let mut pool = TempUploadPool::new(create_test_device());
        pool.allocate(64).unwrap();
        for _ in 0..TEMP_BUFFER_FRAME_LIFE_TIME {
            pool.tick_frame();
        }
        pool.allocate(64).unwrap();
        assert_eq!(pool.free_count(), 0);
    }
}

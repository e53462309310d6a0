//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform/constant buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 4;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 5;
        /// Buffer can be mapped for reading.
        const MAP_READ = 1 << 6;
        /// Buffer can be mapped for writing.
        const MAP_WRITE = 1 << 7;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Memory heap a buffer allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryLocation {
    /// Device-local memory, fastest for GPU access.
    #[default]
    GpuOnly,
    /// Host-visible memory for CPU-to-GPU uploads.
    Upload,
    /// Host-visible memory for GPU-to-CPU readback.
    Readback,
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size of the buffer in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Memory heap the buffer is allocated from.
    pub location: MemoryLocation,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor in device-local memory.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            location: MemoryLocation::GpuOnly,
        }
    }

    /// Create an upload buffer descriptor in host-visible memory.
    pub fn upload(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage: usage | BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC,
            location: MemoryLocation::Upload,
        }
    }

    /// Create a readback buffer descriptor in host-visible memory.
    pub fn readback(size: u64) -> Self {
        Self {
            label: None,
            size,
            usage: BufferUsage::MAP_READ | BufferUsage::COPY_DST,
            location: MemoryLocation::Readback,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the memory heap.
    pub fn with_location(mut self, location: MemoryLocation) -> Self {
        self.location = location;
        self
    }
}

impl Default for BufferDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: 0,
            usage: BufferUsage::empty(),
            location: MemoryLocation::GpuOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_descriptor_implies_mapping() {
        let desc = BufferDescriptor::upload(256, BufferUsage::UNIFORM);
        assert_eq!(desc.location, MemoryLocation::Upload);
        assert!(desc.usage.contains(BufferUsage::MAP_WRITE));
        assert!(desc.usage.contains(BufferUsage::COPY_SRC));
    }

    #[test]
    fn test_readback_descriptor() {
        let desc = BufferDescriptor::readback(1024).with_label("readback");
        assert_eq!(desc.location, MemoryLocation::Readback);
        assert!(desc.usage.contains(BufferUsage::MAP_READ));
        assert_eq!(desc.label.as_deref(), Some("readback"));
    }
}

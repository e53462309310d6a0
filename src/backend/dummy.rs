//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations but provides
//! a valid implementation for testing the graphics API without
//! requiring GPU hardware.
//!
//! Buffers are backed by host memory and buffer-to-buffer copies execute on
//! the CPU at submit time, so upload and readback paths round-trip in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::commands::GpuCommand;
use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::instance::{AdapterInfo, AdapterType};
use crate::pipeline_state::PipelineStateDesc;
use crate::types::{BufferDescriptor, SamplerDescriptor, TextureDescriptor};

use super::{
    GpuBackend, GpuBuffer, GpuFence, GpuPipeline, GpuSampler, GpuSemaphore, GpuTexture,
};

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    capabilities: DeviceCapabilities,
    submit_count: AtomicU64,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            // The dummy backend accepts every pass kind so the full frontend
            // runs without hardware; ray tracing work is recorded but not
            // executed.
            capabilities: DeviceCapabilities {
                ray_tracing: true,
                ..DeviceCapabilities::default()
            },
            submit_count: AtomicU64::new(0),
        }
    }

    /// Create a dummy backend reporting the given capabilities.
    ///
    /// Lets tests exercise feature rejection paths.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            submit_count: AtomicU64::new(0),
        }
    }

    /// Number of command list submissions so far.
    pub fn submit_count(&self) -> u64 {
        self.submit_count.load(Ordering::Acquire)
    }

    /// Execute a buffer-to-buffer copy on the host byte stores.
    fn copy_bytes(
        src: &GpuBuffer,
        src_offset: u64,
        dst: &GpuBuffer,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), GraphicsError> {
        let (GpuBuffer::Dummy { data: src_data }, GpuBuffer::Dummy { data: dst_data }) = (src, dst)
        else {
            return Ok(());
        };

        let chunk = {
            let src_data = src_data
                .lock()
                .map_err(|_| GraphicsError::Internal("buffer store poisoned".to_string()))?;
            let start = src_offset as usize;
            let end = start + size as usize;
            if end > src_data.len() {
                return Err(GraphicsError::InvalidParameter(format!(
                    "copy source range {start}..{end} exceeds buffer size {}",
                    src_data.len()
                )));
            }
            src_data[start..end].to_vec()
        };

        let mut dst_data = dst_data
            .lock()
            .map_err(|_| GraphicsError::Internal("buffer store poisoned".to_string()))?;
        let start = dst_offset as usize;
        let end = start + size as usize;
        if end > dst_data.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "copy destination range {start}..{end} exceeds buffer size {}",
                dst_data.len()
            )));
        }
        dst_data[start..end].copy_from_slice(&chunk);
        Ok(())
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        vec![AdapterInfo {
            name: "Dummy Adapter".to_string(),
            vendor: "Vermilion".to_string(),
            device_type: AdapterType::Software,
        }]
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::Dummy {
            data: std::sync::Mutex::new(vec![0u8; descriptor.size as usize]),
        })
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}x{})",
            descriptor.label,
            descriptor.size.width,
            descriptor.size.height,
            descriptor.size.depth
        );
        Ok(GpuTexture::Dummy)
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        log::trace!("DummyBackend: creating sampler {:?}", descriptor.label);
        Ok(GpuSampler::Dummy)
    }

    fn create_pipeline(&self, desc: &PipelineStateDesc) -> Result<GpuPipeline, GraphicsError> {
        log::trace!(
            "DummyBackend: creating pipeline {:?} ({} shaders)",
            desc.label,
            desc.shaders.len()
        );
        Ok(GpuPipeline::Dummy)
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        Ok(GpuFence::Dummy {
            signaled: AtomicBool::new(signaled),
        })
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        Ok(GpuSemaphore::Dummy)
    }

    fn wait_fence(&self, fence: &GpuFence) {
        match fence {
            GpuFence::Dummy { signaled } => {
                // In dummy mode, just spin until signaled
                while !signaled.load(Ordering::Acquire) {
                    std::thread::yield_now();
                }
            }
            #[cfg(feature = "wgpu-backend")]
            GpuFence::Wgpu { .. } => {}
            #[cfg(feature = "vulkan-backend")]
            GpuFence::Vulkan { .. } => {}
        }
    }

    fn wait_fence_timeout(&self, fence: &GpuFence, timeout: std::time::Duration) -> bool {
        match fence {
            GpuFence::Dummy { signaled } => {
                let start = std::time::Instant::now();
                while !signaled.load(Ordering::Acquire) {
                    if start.elapsed() >= timeout {
                        return false;
                    }
                    std::thread::yield_now();
                }
                true
            }
            #[cfg(feature = "wgpu-backend")]
            GpuFence::Wgpu { .. } => false,
            #[cfg(feature = "vulkan-backend")]
            GpuFence::Vulkan { .. } => false,
        }
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        match fence {
            GpuFence::Dummy { signaled } => signaled.load(Ordering::Acquire),
            #[cfg(feature = "wgpu-backend")]
            GpuFence::Wgpu { .. } => false,
            #[cfg(feature = "vulkan-backend")]
            GpuFence::Vulkan { .. } => false,
        }
    }

    fn signal_fence(&self, fence: &GpuFence) {
        match fence {
            GpuFence::Dummy { signaled } => {
                signaled.store(true, Ordering::Release);
            }
            #[cfg(feature = "wgpu-backend")]
            GpuFence::Wgpu { .. } => {}
            #[cfg(feature = "vulkan-backend")]
            GpuFence::Vulkan { .. } => {}
        }
    }

    fn submit(
        &self,
        commands: &[GpuCommand],
        wait_semaphores: &[&GpuSemaphore],
        _signal_semaphore: Option<&GpuSemaphore>,
        signal_fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: submitting {} commands (waiting on {} semaphores)",
            commands.len(),
            wait_semaphores.len()
        );

        for command in commands {
            match command {
                GpuCommand::TransitionTexture { texture, from, to } => {
                    log::trace!(
                        "DummyBackend: transition texture {:?} {from} -> {to}",
                        texture.label()
                    );
                }
                GpuCommand::TransitionBuffer { buffer, from, to } => {
                    log::trace!(
                        "DummyBackend: transition buffer {:?} {from} -> {to}",
                        buffer.label()
                    );
                }
                GpuCommand::BeginRenderTargets { colors, depth, .. } => {
                    log::trace!(
                        "DummyBackend: begin render targets ({} colors, depth: {})",
                        colors.len(),
                        depth.is_some()
                    );
                }
                GpuCommand::EndRenderTargets => {
                    log::trace!("DummyBackend: end render targets");
                }
                GpuCommand::BindPipeline { pipeline } => {
                    log::trace!("DummyBackend: bind pipeline {:?}", pipeline.label());
                }
                GpuCommand::BindDescriptors { bindings } => {
                    log::trace!("DummyBackend: bind {} descriptors", bindings.len());
                }
                GpuCommand::SetRootConstants { register, space, data } => {
                    log::trace!(
                        "DummyBackend: set root constants b{register} space{space} ({} dwords)",
                        data.len()
                    );
                }
                GpuCommand::BindVertexBuffer { slot, buffer, .. } => {
                    log::trace!(
                        "DummyBackend: bind vertex buffer {:?} to slot {slot}",
                        buffer.label()
                    );
                }
                GpuCommand::BindIndexBuffer { buffer, .. } => {
                    log::trace!("DummyBackend: bind index buffer {:?}", buffer.label());
                }
                GpuCommand::Draw {
                    vertex_count,
                    instance_count,
                    ..
                } => {
                    log::trace!("DummyBackend: draw {vertex_count}x{instance_count}");
                }
                GpuCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    ..
                } => {
                    log::trace!("DummyBackend: draw indexed {index_count}x{instance_count}");
                }
                GpuCommand::Dispatch { x, y, z } => {
                    log::trace!("DummyBackend: dispatch {x}x{y}x{z}");
                }
                GpuCommand::CopyBufferToBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => {
                    log::trace!(
                        "DummyBackend: copy buffer {:?} -> {:?} ({size} bytes)",
                        src.label(),
                        dst.label()
                    );
                    Self::copy_bytes(
                        src.gpu_handle(),
                        *src_offset,
                        dst.gpu_handle(),
                        *dst_offset,
                        *size,
                    )?;
                }
                GpuCommand::CopyBufferToTexture { src, dst, extent, .. } => {
                    log::trace!(
                        "DummyBackend: copy buffer {:?} -> texture {:?} ({}x{})",
                        src.label(),
                        dst.label(),
                        extent[0],
                        extent[1]
                    );
                }
                GpuCommand::CopyTextureToBuffer { src, dst, extent, .. } => {
                    log::trace!(
                        "DummyBackend: copy texture {:?} -> buffer {:?} ({}x{})",
                        src.label(),
                        dst.label(),
                        extent[0],
                        extent[1]
                    );
                }
            }
        }

        self.submit_count.fetch_add(1, Ordering::AcqRel);

        // Signal the fence immediately since we don't do real GPU work
        if let Some(fence) = signal_fence {
            self.signal_fence(fence);
        }

        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: write_buffer offset={} len={}",
            offset,
            data.len()
        );
        match buffer {
            GpuBuffer::Dummy { data: store } => {
                let mut store = store
                    .lock()
                    .map_err(|_| GraphicsError::Internal("buffer store poisoned".to_string()))?;
                let start = offset as usize;
                let end = start + data.len();
                if end > store.len() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "write range {start}..{end} exceeds buffer size {}",
                        store.len()
                    )));
                }
                store[start..end].copy_from_slice(data);
                Ok(())
            }
            #[cfg(feature = "wgpu-backend")]
            GpuBuffer::Wgpu(_) => Ok(()),
            #[cfg(feature = "vulkan-backend")]
            GpuBuffer::Vulkan { .. } => Ok(()),
        }
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        log::trace!("DummyBackend: read_buffer offset={} size={}", offset, size);
        match buffer {
            GpuBuffer::Dummy { data: store } => {
                let Ok(store) = store.lock() else {
                    return vec![0u8; size as usize];
                };
                let start = (offset as usize).min(store.len());
                let end = (start + size as usize).min(store.len());
                let mut out = store[start..end].to_vec();
                out.resize(size as usize, 0);
                out
            }
            #[cfg(feature = "wgpu-backend")]
            GpuBuffer::Wgpu(_) => vec![0u8; size as usize],
            #[cfg(feature = "vulkan-backend")]
            GpuBuffer::Vulkan { .. } => vec![0u8; size as usize],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BufferUsage;

    #[test]
    fn test_buffer_round_trip() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::upload(16, BufferUsage::COPY_SRC))
            .unwrap();

        backend.write_buffer(&buffer, 4, &[1, 2, 3, 4]).unwrap();
        let read = backend.read_buffer(&buffer, 4, 4);
        assert_eq!(read, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_write_out_of_range_fails() {
        let backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::upload(8, BufferUsage::COPY_SRC))
            .unwrap();

        assert!(backend.write_buffer(&buffer, 6, &[0; 4]).is_err());
    }

    #[test]
    fn test_fence_signaling() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();
        assert!(!backend.is_fence_signaled(&fence));

        backend.signal_fence(&fence);
        assert!(backend.is_fence_signaled(&fence));
        backend.wait_fence(&fence);
    }

    #[test]
    fn test_submit_signals_fence() {
        let backend = DummyBackend::new();
        let fence = backend.create_fence(false).unwrap();

        backend.submit(&[], &[], None, Some(&fence)).unwrap();
        assert!(backend.is_fence_signaled(&fence));
        assert_eq!(backend.submit_count(), 1);
    }
}

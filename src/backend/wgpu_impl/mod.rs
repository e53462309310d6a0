//! wgpu backend implementation.
//!
//! Cross-platform backend mapping the [`GpuBackend`] contract onto wgpu.
//! Recorded transitions are discarded at submit time since wgpu tracks
//! resource states itself; fences are modeled as queue submission indices
//! and semaphores are implicit in wgpu's submission ordering.

mod conversion;
mod encoder;

use std::sync::{Arc, Mutex};

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::instance::{AdapterInfo, AdapterType};
use crate::pipeline_state::{PipelineStateDesc, ShaderBlob, ShaderStage};
use crate::types::{BufferDescriptor, SamplerDescriptor, TextureDescriptor};

use super::{GpuBackend, GpuBuffer, GpuFence, GpuPipeline, GpuSampler, GpuSemaphore, GpuTexture};
use crate::commands::GpuCommand;
use conversion::{
    convert_blend_state, convert_buffer_descriptor, convert_sampler_descriptor,
    convert_step_mode, convert_texture_descriptor, convert_texture_format, convert_topology,
    convert_vertex_attributes,
};

/// Compiled wgpu pipeline, render or compute.
#[derive(Debug)]
pub enum WgpuPipeline {
    /// Render pipeline with derived bind group layouts.
    Render(wgpu::RenderPipeline),
    /// Compute pipeline with derived bind group layouts.
    Compute(wgpu::ComputePipeline),
}

/// GPU backend over wgpu.
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
}

impl WgpuBackend {
    /// Create the backend, picking a high-performance adapter.
    pub fn new() -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| {
            GraphicsError::InitializationFailed("no compatible wgpu adapter found".to_string())
        })?;

        let info = adapter.get_info();
        log::info!("wgpu adapter: {} ({:?})", info.name, info.backend);

        let required_limits = wgpu::Limits {
            max_push_constant_size: 128,
            ..adapter.limits()
        };
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("graphics device"),
                required_features: wgpu::Features::PUSH_CONSTANTS,
                required_limits,
            },
            None,
        ))
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("wgpu device request failed: {e}"))
        })?;

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue,
        })
    }

    fn shader_module(&self, blob: &ShaderBlob) -> wgpu::ShaderModule {
        self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: None,
            source: wgpu::util::make_spirv(&blob.bytecode),
        })
    }

    fn find_shader<'a>(
        desc: &'a PipelineStateDesc,
        stage: ShaderStage,
    ) -> Option<&'a ShaderBlob> {
        desc.shaders.iter().find(|blob| blob.stage == stage)
    }

    fn create_render_pipeline(
        &self,
        desc: &PipelineStateDesc,
    ) -> Result<wgpu::RenderPipeline, GraphicsError> {
        let vertex = Self::find_shader(desc, ShaderStage::Vertex).ok_or_else(|| {
            GraphicsError::InvalidParameter(
                "render pipeline requires a vertex shader".to_string(),
            )
        })?;
        let fragment = Self::find_shader(desc, ShaderStage::Fragment);

        let vertex_module = self.shader_module(vertex);
        let fragment_module = fragment.map(|blob| self.shader_module(blob));

        let attribute_sets = convert_vertex_attributes(&desc.vertex_layout);
        let buffers: Vec<wgpu::VertexBufferLayout> = desc
            .vertex_layout
            .buffers
            .iter()
            .zip(&attribute_sets)
            .map(|(buffer, attributes)| wgpu::VertexBufferLayout {
                array_stride: u64::from(buffer.stride),
                step_mode: convert_step_mode(buffer.step_mode),
                attributes,
            })
            .collect();

        let targets: Vec<Option<wgpu::ColorTargetState>> = desc
            .color_formats
            .iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format: convert_texture_format(*format),
                    blend: desc.blend_state.map(convert_blend_state),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let topology = convert_topology(desc.topology);
        let fragment_state = fragment_module
            .as_ref()
            .zip(fragment)
            .map(|(module, blob)| wgpu::FragmentState {
                module,
                entry_point: &blob.entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &targets,
            });

        Ok(self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: desc.label.as_deref(),
                // Bind group layouts are derived from the shaders.
                layout: None,
                vertex: wgpu::VertexState {
                    module: &vertex_module,
                    entry_point: &vertex.entry_point,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &buffers,
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    strip_index_format: matches!(
                        topology,
                        wgpu::PrimitiveTopology::TriangleStrip
                    )
                    .then_some(wgpu::IndexFormat::Uint32),
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: desc.depth_format.map(|format| wgpu::DepthStencilState {
                    format: convert_texture_format(format),
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: fragment_state,
                multiview: None,
            }))
    }

    fn create_compute_pipeline(
        &self,
        desc: &PipelineStateDesc,
        compute: &ShaderBlob,
    ) -> wgpu::ComputePipeline {
        let module = self.shader_module(compute);
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: desc.label.as_deref(),
                layout: None,
                module: &module,
                entry_point: &compute.entry_point,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
    }
}

impl GpuBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu Backend"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let limits = self.adapter.limits();
        DeviceCapabilities {
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_buffer_size: limits.max_buffer_size,
            compute_shaders: true,
            ray_tracing: false,
        }
    }

    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        self.instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .map(|adapter| {
                let info = adapter.get_info();
                AdapterInfo {
                    name: info.name,
                    vendor: format!("0x{:04x}", info.vendor),
                    device_type: match info.device_type {
                        wgpu::DeviceType::DiscreteGpu => AdapterType::Discrete,
                        wgpu::DeviceType::IntegratedGpu => AdapterType::Integrated,
                        wgpu::DeviceType::Cpu => AdapterType::Software,
                        _ => AdapterType::Unknown,
                    },
                }
            })
            .collect()
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let buffer = self.device.create_buffer(&convert_buffer_descriptor(descriptor));
        Ok(GpuBuffer::Wgpu(Arc::new(buffer)))
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        let texture = self
            .device
            .create_texture(&convert_texture_descriptor(descriptor));
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture::Wgpu {
            texture: Arc::new(texture),
            view: Arc::new(view),
        })
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        let sampler = self
            .device
            .create_sampler(&convert_sampler_descriptor(descriptor));
        Ok(GpuSampler::Wgpu(Arc::new(sampler)))
    }

    fn create_pipeline(&self, desc: &PipelineStateDesc) -> Result<GpuPipeline, GraphicsError> {
        if let Some(compute) = Self::find_shader(desc, ShaderStage::Compute) {
            return Ok(GpuPipeline::Wgpu(WgpuPipeline::Compute(
                self.create_compute_pipeline(desc, compute),
            )));
        }
        Ok(GpuPipeline::Wgpu(WgpuPipeline::Render(
            self.create_render_pipeline(desc)?,
        )))
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        // A fence tracks the submission it was signaled with; before any
        // submission there is nothing to wait for, so an index-less fence
        // reads as signaled. Unsignaled creation therefore behaves the same
        // until the first submit stores an index.
        let _ = signaled;
        Ok(GpuFence::Wgpu {
            device: Arc::clone(&self.device),
            submission_index: Mutex::new(None),
        })
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        // Submission order on a wgpu queue is implicit.
        Ok(GpuSemaphore::Wgpu)
    }

    fn wait_fence(&self, fence: &GpuFence) {
        if let GpuFence::Wgpu {
            device,
            submission_index,
        } = fence
        {
            let index = submission_index
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            if let Some(index) = index {
                let _ = device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
            }
        }
    }

    fn wait_fence_timeout(&self, fence: &GpuFence, _timeout: std::time::Duration) -> bool {
        // wgpu has no timed wait; waiting for the submission index always
        // completes once the GPU drains the queue.
        self.wait_fence(fence);
        true
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        if let GpuFence::Wgpu {
            device,
            submission_index,
        } = fence
        {
            let guard = submission_index
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if guard.is_none() {
                return true;
            }
            drop(guard);
            return device.poll(wgpu::Maintain::Poll).is_queue_empty();
        }
        true
    }

    fn signal_fence(&self, fence: &GpuFence) {
        if let GpuFence::Wgpu {
            submission_index, ..
        } = fence
        {
            submission_index
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
        }
    }

    fn submit(
        &self,
        commands: &[GpuCommand],
        _wait_semaphores: &[&GpuSemaphore],
        _signal_semaphore: Option<&GpuSemaphore>,
        signal_fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        let command_buffer = encoder::encode_commands(&self.device, commands)?;
        let index = self.queue.submit(Some(command_buffer));

        if let Some(GpuFence::Wgpu {
            submission_index, ..
        }) = signal_fence
        {
            *submission_index
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(index);
        }
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        match buffer {
            GpuBuffer::Wgpu(buffer) => {
                if offset + data.len() as u64 > buffer.size() {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "write of {} bytes at offset {offset} exceeds buffer size {}",
                        data.len(),
                        buffer.size()
                    )));
                }
                self.queue.write_buffer(buffer, offset, data);
                Ok(())
            }
            _ => Err(GraphicsError::InvalidParameter(
                "buffer was not created by the wgpu backend".to_string(),
            )),
        }
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let GpuBuffer::Wgpu(buffer) = buffer else {
            return vec![0; size as usize];
        };
        if !buffer.usage().contains(wgpu::BufferUsages::MAP_READ) {
            log::warn!("read_buffer on a buffer without MAP_READ usage");
            return vec![0; size as usize];
        }

        let slice = buffer.slice(offset..offset + size);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {
                let data = slice.get_mapped_range().to_vec();
                buffer.unmap();
                data
            }
            _ => {
                log::warn!("buffer mapping failed during read_buffer");
                vec![0; size as usize]
            }
        }
    }
}

//! Native Vulkan backend implementation using ash.
//!
//! Headless device setup over Vulkan 1.3: dynamic rendering replaces render
//! pass objects, memory comes from `gpu-allocator`, and descriptor sets are
//! allocated per submission from transient pools retired behind a fence.

mod commands;
mod conversion;

use std::ffi::CStr;
use std::ffi::CString;
use std::io::Cursor;

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;

use crate::device::DeviceCapabilities;
use crate::error::GraphicsError;
use crate::instance::{AdapterInfo, AdapterType, InstanceParameters};
use crate::pipeline_state::{PipelineStateDesc, ShaderBlob, ShaderStage};
use crate::types::{BufferDescriptor, FilterMode, SamplerDescriptor, TextureDescriptor};

use super::{GpuBackend, GpuBuffer, GpuFence, GpuPipeline, GpuSampler, GpuSemaphore, GpuTexture};
use crate::commands::GpuCommand;
use crate::binding::{RootParameterKind, RootSignature};
use commands::{push_constant_stages, CommandTranslator};
use conversion::{
    binding_shift, convert_blend_state, convert_buffer_usage, convert_memory_location,
    convert_sampler_descriptor, convert_texture_format, convert_texture_usage, convert_topology,
    convert_vertex_layout, descriptor_type,
};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Cap applied to bindless descriptor table ranges.
const BINDLESS_RANGE_CAP: u32 = 1024;

/// Work submitted to the queue whose transient objects are still in use.
struct InFlightSubmission {
    command_buffer: vk::CommandBuffer,
    descriptor_pool: vk::DescriptorPool,
    transient_views: Vec<vk::ImageView>,
    fence: vk::Fence,
}

/// GPU backend over native Vulkan.
pub struct VulkanBackend {
    #[allow(dead_code)]
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    device: ash::Device,
    queue: Mutex<vk::Queue>,
    #[allow(dead_code)]
    queue_family: u32,
    /// Taken out in `drop` so the allocator is destroyed before the device.
    allocator: Mutex<Option<Allocator>>,
    command_pool: Mutex<vk::CommandPool>,
    in_flight: Mutex<Vec<InFlightSubmission>>,
    /// Immutable samplers baked into descriptor set layouts.
    static_samplers: Mutex<Vec<vk::Sampler>>,
}

impl VulkanBackend {
    /// Create the backend from instance parameters.
    pub fn with_params(params: &InstanceParameters) -> Result<Self, GraphicsError> {
        let entry = unsafe {
            ash::Entry::load().map_err(|e| {
                GraphicsError::InitializationFailed(format!("Vulkan loader not found: {e}"))
            })?
        };

        let application_name =
            CString::new(params.application_name.as_str()).map_err(|_| {
                GraphicsError::InvalidParameter(
                    "application name contains a nul byte".to_string(),
                )
            })?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .api_version(vk::API_VERSION_1_3);

        let mut layers: Vec<*const std::ffi::c_char> = Vec::new();
        if params.validation && Self::validation_layer_available(&entry) {
            log::info!("Vulkan validation layer enabled");
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers);
        let instance = unsafe {
            entry.create_instance(&instance_info, None).map_err(|e| {
                GraphicsError::InitializationFailed(format!(
                    "Vulkan instance creation failed: {e}"
                ))
            })?
        };

        let (physical_device, queue_family) = Self::pick_physical_device(&instance)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Vulkan adapter: {}",
            properties
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string())
        );

        let queue_priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities);
        let mut vulkan13_features =
            vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .push_next(&mut vulkan13_features);
        let device = unsafe {
            instance
                .create_device(physical_device, &device_info, None)
                .map_err(|e| {
                    GraphicsError::InitializationFailed(format!(
                        "Vulkan device creation failed: {e}"
                    ))
                })?
        };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("Vulkan allocator setup failed: {e}"))
        })?;

        let command_pool = unsafe {
            device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::default()
                        .queue_family_index(queue_family)
                        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                    None,
                )
                .map_err(|e| {
                    GraphicsError::InitializationFailed(format!(
                        "command pool creation failed: {e}"
                    ))
                })?
        };

        Ok(Self {
            entry,
            instance,
            physical_device,
            properties,
            device,
            queue: Mutex::new(queue),
            queue_family,
            allocator: Mutex::new(Some(allocator)),
            command_pool: Mutex::new(command_pool),
            in_flight: Mutex::new(Vec::new()),
            static_samplers: Mutex::new(Vec::new()),
        })
    }

    fn validation_layer_available(entry: &ash::Entry) -> bool {
        let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
            return false;
        };
        layers.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .map(|name| name == VALIDATION_LAYER)
                .unwrap_or(false)
        })
    }

    fn pick_physical_device(
        instance: &ash::Instance,
    ) -> Result<(vk::PhysicalDevice, u32), GraphicsError> {
        let devices = unsafe {
            instance.enumerate_physical_devices().map_err(|e| {
                GraphicsError::InitializationFailed(format!(
                    "physical device enumeration failed: {e}"
                ))
            })?
        };

        let mut best: Option<(vk::PhysicalDevice, u32, bool)> = None;
        for device in devices {
            let families =
                unsafe { instance.get_physical_device_queue_family_properties(device) };
            let Some(family) = families.iter().position(|family| {
                family
                    .queue_flags
                    .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            }) else {
                continue;
            };
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let discrete = properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
            match best {
                Some((_, _, true)) => {}
                _ if discrete => best = Some((device, family as u32, true)),
                None => best = Some((device, family as u32, false)),
                _ => {}
            }
        }

        best.map(|(device, family, _)| (device, family))
            .ok_or_else(|| {
                GraphicsError::InitializationFailed(
                    "no Vulkan device with a graphics queue found".to_string(),
                )
            })
    }

    fn allocate(
        &self,
        desc: &AllocationCreateDesc,
    ) -> Result<Allocation, GraphicsError> {
        let mut guard = self.allocator.lock();
        let allocator = guard.as_mut().ok_or_else(|| {
            GraphicsError::Internal("allocator already torn down".to_string())
        })?;
        allocator.allocate(desc).map_err(|e| match e {
            gpu_allocator::AllocationError::OutOfMemory => GraphicsError::OutOfMemory,
            other => GraphicsError::ResourceCreationFailed(format!("allocation failed: {other}")),
        })
    }

    /// Free transient objects of submissions the GPU has finished.
    fn reclaim_finished(&self) {
        let mut in_flight = self.in_flight.lock();
        let pool = self.command_pool.lock();
        in_flight.retain(|submission| {
            let done = unsafe {
                self.device
                    .get_fence_status(submission.fence)
                    .unwrap_or(false)
            };
            if done {
                unsafe {
                    self.device
                        .free_command_buffers(*pool, &[submission.command_buffer]);
                    self.device
                        .destroy_descriptor_pool(submission.descriptor_pool, None);
                    for view in &submission.transient_views {
                        self.device.destroy_image_view(*view, None);
                    }
                    self.device.destroy_fence(submission.fence, None);
                }
            }
            !done
        });
    }

    fn create_descriptor_pool(&self) -> Result<vk::DescriptorPool, GraphicsError> {
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 256,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 256,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: 512,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 64,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: 64,
            },
        ];
        unsafe {
            self.device
                .create_descriptor_pool(
                    &vk::DescriptorPoolCreateInfo::default()
                        .max_sets(64)
                        .pool_sizes(&sizes),
                    None,
                )
                .map_err(|e| {
                    GraphicsError::Internal(format!("descriptor pool creation failed: {e}"))
                })
        }
    }

    fn create_shader_module(&self, blob: &ShaderBlob) -> Result<vk::ShaderModule, GraphicsError> {
        let words = ash::util::read_spv(&mut Cursor::new(&blob.bytecode)).map_err(|e| {
            GraphicsError::InvalidParameter(format!("shader bytecode is not valid SPIR-V: {e}"))
        })?;
        unsafe {
            self.device
                .create_shader_module(&vk::ShaderModuleCreateInfo::default().code(&words), None)
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "shader module creation failed: {e}"
                    ))
                })
        }
    }

    /// Build one descriptor set layout per register space.
    fn create_set_layouts(
        &self,
        signature: &RootSignature,
    ) -> Result<Vec<vk::DescriptorSetLayout>, GraphicsError> {
        let mut layouts = Vec::with_capacity(signature.descriptor_set_count());
        for space in 0..signature.descriptor_set_count() as u32 {
            // Static samplers are baked into the layout as immutable
            // samplers; the handles must be collected before the bindings
            // that reference them are assembled.
            let mut sampler_storage = Vec::new();
            for parameter in signature.set_layout(space) {
                if let RootParameterKind::StaticSampler {
                    address_mode,
                    filter_mode,
                } = &parameter.kind
                {
                    sampler_storage.push(self.static_sampler(*address_mode, *filter_mode)?);
                }
            }

            let mut bindings = Vec::new();
            let mut sampler_cursor = 0;
            for parameter in signature.set_layout(space) {
                let Some(ty) = descriptor_type(parameter) else {
                    continue;
                };
                let count = match &parameter.kind {
                    RootParameterKind::Table { count, .. } => (*count).min(BINDLESS_RANGE_CAP),
                    _ => 1,
                };
                let mut binding = vk::DescriptorSetLayoutBinding::default()
                    .binding(
                        binding_shift(parameter.allocation.kind)
                            + parameter.allocation.register_index,
                    )
                    .descriptor_type(ty)
                    .descriptor_count(count)
                    .stage_flags(vk::ShaderStageFlags::ALL);

                if matches!(parameter.kind, RootParameterKind::StaticSampler { .. }) {
                    binding = binding.immutable_samplers(std::slice::from_ref(
                        &sampler_storage[sampler_cursor],
                    ));
                    sampler_cursor += 1;
                }
                bindings.push(binding);
            }

            let layout = unsafe {
                self.device
                    .create_descriptor_set_layout(
                        &vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings),
                        None,
                    )
                    .map_err(|e| {
                        GraphicsError::ResourceCreationFailed(format!(
                            "descriptor set layout creation failed: {e}"
                        ))
                    })?
            };
            layouts.push(layout);
        }
        Ok(layouts)
    }

    fn static_sampler(
        &self,
        address_mode: crate::types::AddressMode,
        filter_mode: FilterMode,
    ) -> Result<vk::Sampler, GraphicsError> {
        let descriptor = SamplerDescriptor {
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter_mode,
            min_filter: filter_mode,
            mipmap_filter: filter_mode,
            ..Default::default()
        };
        let sampler = unsafe {
            self.device
                .create_sampler(&convert_sampler_descriptor(&descriptor), None)
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "static sampler creation failed: {e}"
                    ))
                })?
        };
        self.static_samplers.lock().push(sampler);
        Ok(sampler)
    }

    fn create_pipeline_layout(
        &self,
        signature: &RootSignature,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<vk::PipelineLayout, GraphicsError> {
        let push_constant_size = signature
            .parameters()
            .iter()
            .filter_map(|parameter| match parameter.kind {
                RootParameterKind::Constants { dword_count } => Some(dword_count * 4),
                _ => None,
            })
            .max();
        let push_ranges: Vec<vk::PushConstantRange> = push_constant_size
            .map(|size| vk::PushConstantRange {
                stage_flags: push_constant_stages(),
                offset: 0,
                size,
            })
            .into_iter()
            .collect();

        unsafe {
            self.device
                .create_pipeline_layout(
                    &vk::PipelineLayoutCreateInfo::default()
                        .set_layouts(set_layouts)
                        .push_constant_ranges(&push_ranges),
                    None,
                )
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "pipeline layout creation failed: {e}"
                    ))
                })
        }
    }

    fn create_render_pipeline(
        &self,
        desc: &PipelineStateDesc,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline, GraphicsError> {
        let vertex = desc
            .shaders
            .iter()
            .find(|blob| blob.stage == ShaderStage::Vertex)
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(
                    "render pipeline requires a vertex shader".to_string(),
                )
            })?;
        let fragment = desc
            .shaders
            .iter()
            .find(|blob| blob.stage == ShaderStage::Fragment);

        let vertex_module = self.create_shader_module(vertex)?;
        let fragment_module = fragment
            .map(|blob| self.create_shader_module(blob))
            .transpose()
            .inspect_err(|_| unsafe {
                self.device.destroy_shader_module(vertex_module, None);
            })?;

        let vertex_entry = CString::new(vertex.entry_point.as_str()).unwrap_or_default();
        let fragment_entry = fragment
            .map(|blob| CString::new(blob.entry_point.as_str()).unwrap_or_default());
        let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module)
            .name(&vertex_entry)];
        if let (Some(module), Some(entry)) = (fragment_module, &fragment_entry) {
            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(vk::ShaderStageFlags::FRAGMENT)
                    .module(module)
                    .name(entry),
            );
        }

        let (vertex_bindings, vertex_attributes) = convert_vertex_layout(&desc.vertex_layout);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(convert_topology(desc.topology));

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_format.is_some())
            .depth_write_enable(desc.depth_format.is_some())
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
            .color_formats
            .iter()
            .map(|_| convert_blend_state(desc.blend_state))
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = desc
            .color_formats
            .iter()
            .map(|format| convert_texture_format(*format))
            .collect();
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(
                desc.depth_format
                    .map(convert_texture_format)
                    .unwrap_or(vk::Format::UNDEFINED),
            );

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let result = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        };

        unsafe {
            self.device.destroy_shader_module(vertex_module, None);
            if let Some(module) = fragment_module {
                self.device.destroy_shader_module(module, None);
            }
        }

        match result {
            Ok(pipelines) => Ok(pipelines[0]),
            Err((_, e)) => Err(GraphicsError::ResourceCreationFailed(format!(
                "graphics pipeline creation failed: {e}"
            ))),
        }
    }

    fn create_compute_pipeline(
        &self,
        compute: &ShaderBlob,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline, GraphicsError> {
        let module = self.create_shader_module(compute)?;
        let entry_name = CString::new(compute.entry_point.as_str()).unwrap_or_default();
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(&entry_name);
        let info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout);

        let result = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
        };
        unsafe {
            self.device.destroy_shader_module(module, None);
        }
        match result {
            Ok(pipelines) => Ok(pipelines[0]),
            Err((_, e)) => Err(GraphicsError::ResourceCreationFailed(format!(
                "compute pipeline creation failed: {e}"
            ))),
        }
    }
}

impl GpuBackend for VulkanBackend {
    fn name(&self) -> &'static str {
        "Vulkan Backend"
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            max_texture_dimension: self.properties.limits.max_image_dimension2_d,
            max_buffer_size: u64::from(self.properties.limits.max_storage_buffer_range),
            compute_shaders: true,
            ray_tracing: false,
        }
    }

    fn enumerate_adapters(&self) -> Vec<AdapterInfo> {
        let Ok(devices) = (unsafe { self.instance.enumerate_physical_devices() }) else {
            return Vec::new();
        };
        devices
            .into_iter()
            .map(|device| {
                let properties =
                    unsafe { self.instance.get_physical_device_properties(device) };
                AdapterInfo {
                    name: properties
                        .device_name_as_c_str()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|_| "unknown".to_string()),
                    vendor: format!("0x{:04x}", properties.vendor_id),
                    device_type: match properties.device_type {
                        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterType::Discrete,
                        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterType::Integrated,
                        vk::PhysicalDeviceType::CPU => AdapterType::Software,
                        _ => AdapterType::Unknown,
                    },
                }
            })
            .collect()
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError> {
        let info = vk::BufferCreateInfo::default()
            .size(descriptor.size)
            .usage(convert_buffer_usage(descriptor.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            self.device.create_buffer(&info, None).map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("buffer creation failed: {e}"))
            })?
        };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = self.allocate(&AllocationCreateDesc {
            name: descriptor.label.as_deref().unwrap_or("buffer"),
            requirements,
            location: convert_memory_location(descriptor.location),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "buffer memory bind failed: {e}"
                    ))
                })?;
        }

        Ok(GpuBuffer::Vulkan {
            device: self.device.clone(),
            buffer,
            allocation: Mutex::new(Some(allocation)),
            size: descriptor.size,
        })
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<GpuTexture, GraphicsError> {
        let format = convert_texture_format(descriptor.format);
        let extent = vk::Extent3D {
            width: descriptor.size.width,
            height: descriptor.size.height,
            depth: descriptor.size.depth.max(1),
        };
        let info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(descriptor.mip_level_count)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert_texture_usage(descriptor.usage, descriptor.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let image = unsafe {
            self.device.create_image(&info, None).map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("image creation failed: {e}"))
            })?
        };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self.allocate(&AllocationCreateDesc {
            name: descriptor.label.as_deref().unwrap_or("texture"),
            requirements,
            location: gpu_allocator::MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "image memory bind failed: {e}"
                    ))
                })?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: conversion::aspect_mask(descriptor.format),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe {
            self.device.create_image_view(&view_info, None).map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!("image view creation failed: {e}"))
            })?
        };

        Ok(GpuTexture::Vulkan {
            device: self.device.clone(),
            image,
            view,
            allocation: Mutex::new(Some(allocation)),
            format,
            extent,
        })
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<GpuSampler, GraphicsError> {
        let sampler = unsafe {
            self.device
                .create_sampler(&convert_sampler_descriptor(descriptor), None)
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "sampler creation failed: {e}"
                    ))
                })?
        };
        Ok(GpuSampler::Vulkan {
            device: self.device.clone(),
            sampler,
        })
    }

    fn create_pipeline(&self, desc: &PipelineStateDesc) -> Result<GpuPipeline, GraphicsError> {
        let set_layouts = self.create_set_layouts(&desc.root_signature)?;
        let layout = match self.create_pipeline_layout(&desc.root_signature, &set_layouts) {
            Ok(layout) => layout,
            Err(e) => {
                for set_layout in set_layouts {
                    unsafe {
                        self.device.destroy_descriptor_set_layout(set_layout, None);
                    }
                }
                return Err(e);
            }
        };

        let compute = desc
            .shaders
            .iter()
            .find(|blob| blob.stage == ShaderStage::Compute);
        let result = match compute {
            Some(compute) => self
                .create_compute_pipeline(compute, layout)
                .map(|pipeline| (pipeline, vk::PipelineBindPoint::COMPUTE)),
            None => self
                .create_render_pipeline(desc, layout)
                .map(|pipeline| (pipeline, vk::PipelineBindPoint::GRAPHICS)),
        };

        match result {
            Ok((pipeline, bind_point)) => Ok(GpuPipeline::Vulkan {
                device: self.device.clone(),
                pipeline,
                layout,
                set_layouts,
                bind_point,
            }),
            Err(e) => {
                unsafe {
                    self.device.destroy_pipeline_layout(layout, None);
                    for set_layout in set_layouts {
                        self.device.destroy_descriptor_set_layout(set_layout, None);
                    }
                }
                Err(e)
            }
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<GpuFence, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!("fence creation failed: {e}"))
                })?
        };
        Ok(GpuFence::Vulkan {
            device: self.device.clone(),
            fence,
        })
    }

    fn create_semaphore(&self) -> Result<GpuSemaphore, GraphicsError> {
        let semaphore = unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| {
                    GraphicsError::ResourceCreationFailed(format!(
                        "semaphore creation failed: {e}"
                    ))
                })?
        };
        Ok(GpuSemaphore::Vulkan {
            device: self.device.clone(),
            semaphore,
        })
    }

    fn wait_fence(&self, fence: &GpuFence) {
        if let GpuFence::Vulkan { fence, .. } = fence {
            let result =
                unsafe { self.device.wait_for_fences(&[*fence], true, u64::MAX) };
            if let Err(e) = result {
                log::error!("fence wait failed: {e}");
            }
        }
    }

    fn wait_fence_timeout(&self, fence: &GpuFence, timeout: std::time::Duration) -> bool {
        if let GpuFence::Vulkan { fence, .. } = fence {
            let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
            return match unsafe { self.device.wait_for_fences(&[*fence], true, nanos) } {
                Ok(()) => true,
                Err(vk::Result::TIMEOUT) => false,
                Err(e) => {
                    log::error!("fence wait failed: {e}");
                    false
                }
            };
        }
        true
    }

    fn is_fence_signaled(&self, fence: &GpuFence) -> bool {
        if let GpuFence::Vulkan { fence, .. } = fence {
            return unsafe { self.device.get_fence_status(*fence).unwrap_or(false) };
        }
        true
    }

    fn signal_fence(&self, fence: &GpuFence) {
        if let GpuFence::Vulkan { fence, .. } = fence {
            if unsafe { self.device.get_fence_status(*fence).unwrap_or(false) } {
                return;
            }
            // A fence can only be signaled from the GPU side; an empty
            // submission signals it as soon as the queue reaches it.
            let queue = self.queue.lock();
            let result = unsafe { self.device.queue_submit(*queue, &[], *fence) };
            if let Err(e) = result {
                log::error!("fence signal submission failed: {e}");
            }
        }
    }

    fn submit(
        &self,
        commands: &[GpuCommand],
        wait_semaphores: &[&GpuSemaphore],
        signal_semaphore: Option<&GpuSemaphore>,
        signal_fence: Option<&GpuFence>,
    ) -> Result<(), GraphicsError> {
        self.reclaim_finished();

        let command_buffer = {
            let pool = self.command_pool.lock();
            unsafe {
                self.device
                    .allocate_command_buffers(
                        &vk::CommandBufferAllocateInfo::default()
                            .command_pool(*pool)
                            .level(vk::CommandBufferLevel::PRIMARY)
                            .command_buffer_count(1),
                    )
                    .map_err(|e| {
                        GraphicsError::Internal(format!(
                            "command buffer allocation failed: {e}"
                        ))
                    })?[0]
            }
        };
        let descriptor_pool = self.create_descriptor_pool()?;

        unsafe {
            self.device
                .begin_command_buffer(
                    command_buffer,
                    &vk::CommandBufferBeginInfo::default()
                        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
                )
                .map_err(|e| {
                    GraphicsError::Internal(format!("command buffer begin failed: {e}"))
                })?;
        }

        let mut translator = CommandTranslator::new(&self.device, command_buffer, descriptor_pool);
        translator.record(commands)?;
        let transient_views = std::mem::take(&mut translator.transient_views);

        unsafe {
            self.device.end_command_buffer(command_buffer).map_err(|e| {
                GraphicsError::Internal(format!("command buffer end failed: {e}"))
            })?;
        }

        let waits: Vec<vk::Semaphore> = wait_semaphores
            .iter()
            .filter_map(|semaphore| match semaphore {
                GpuSemaphore::Vulkan { semaphore, .. } => Some(*semaphore),
                _ => None,
            })
            .collect();
        let wait_stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; waits.len()];
        let signals: Vec<vk::Semaphore> = signal_semaphore
            .and_then(|semaphore| match semaphore {
                GpuSemaphore::Vulkan { semaphore, .. } => Some(*semaphore),
                _ => None,
            })
            .into_iter()
            .collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(std::slice::from_ref(&command_buffer))
            .signal_semaphores(&signals);
        let user_fence = match signal_fence {
            Some(GpuFence::Vulkan { fence, .. }) => *fence,
            _ => vk::Fence::null(),
        };

        // Transient descriptor sets and views retire behind their own fence,
        // submitted empty right after the work so it signals once the queue
        // drains past it.
        let retire_fence = unsafe {
            self.device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| {
                    GraphicsError::Internal(format!("retire fence creation failed: {e}"))
                })?
        };

        {
            let queue = self.queue.lock();
            unsafe {
                self.device
                    .queue_submit(*queue, &[submit_info], user_fence)
                    .map_err(|e| {
                        GraphicsError::Internal(format!("queue submission failed: {e}"))
                    })?;
                self.device
                    .queue_submit(*queue, &[], retire_fence)
                    .map_err(|e| {
                        GraphicsError::Internal(format!("retire submission failed: {e}"))
                    })?;
            }
        }

        self.in_flight.lock().push(InFlightSubmission {
            command_buffer,
            descriptor_pool,
            transient_views,
            fence: retire_fence,
        });
        Ok(())
    }

    fn write_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        let GpuBuffer::Vulkan {
            allocation, size, ..
        } = buffer
        else {
            return Err(GraphicsError::InvalidParameter(
                "buffer was not created by the Vulkan backend".to_string(),
            ));
        };
        if offset + data.len() as u64 > *size {
            return Err(GraphicsError::InvalidParameter(format!(
                "write of {} bytes at offset {offset} exceeds buffer size {size}",
                data.len()
            )));
        }

        let mut guard = allocation.lock();
        let mapped = guard
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| {
                GraphicsError::InvalidParameter(
                    "buffer is not host-visible".to_string(),
                )
            })?;
        let offset = offset as usize;
        mapped[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, size: u64) -> Vec<u8> {
        let GpuBuffer::Vulkan { allocation, .. } = buffer else {
            return vec![0; size as usize];
        };

        {
            let queue = self.queue.lock();
            if let Err(e) = unsafe { self.device.queue_wait_idle(*queue) } {
                log::error!("queue wait failed before readback: {e}");
            }
        }

        let guard = allocation.lock();
        match guard.as_ref().and_then(|allocation| allocation.mapped_slice()) {
            Some(mapped) => {
                let offset = offset as usize;
                mapped[offset..offset + size as usize].to_vec()
            }
            None => {
                log::warn!("read_buffer on a buffer that is not host-visible");
                vec![0; size as usize]
            }
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        // Everything in flight has completed after the idle wait.
        {
            let mut in_flight = self.in_flight.lock();
            let pool = self.command_pool.lock();
            for submission in in_flight.drain(..) {
                unsafe {
                    self.device
                        .free_command_buffers(*pool, &[submission.command_buffer]);
                    self.device
                        .destroy_descriptor_pool(submission.descriptor_pool, None);
                    for view in submission.transient_views {
                        self.device.destroy_image_view(view, None);
                    }
                    self.device.destroy_fence(submission.fence, None);
                }
            }
        }
        unsafe {
            for sampler in self.static_samplers.lock().drain(..) {
                self.device.destroy_sampler(sampler, None);
            }
            self.device
                .destroy_command_pool(*self.command_pool.lock(), None);
        }
        // The allocator must be dropped before the device it allocates from.
        drop(self.allocator.lock().take());
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

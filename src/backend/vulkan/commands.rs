//! Translation of recorded command lists into Vulkan command buffers.

use ash::vk;

use crate::binding::{DescriptorBinding, DescriptorView};
use crate::commands::GpuCommand;
use crate::error::GraphicsError;
use crate::types::{ClearValue, TextureViewDescriptor};

use super::super::{GpuBuffer, GpuPipeline, GpuSampler, GpuTexture};
use super::conversion::{
    access_mask, aspect_mask, binding_shift, convert_texture_format, image_layout,
    pipeline_stage,
};

/// Stages root constants are visible to.
///
/// The same flags are used for the pipeline layout's push constant range and
/// for `cmd_push_constants`, so they must stay in sync.
pub(crate) fn push_constant_stages() -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::VERTEX
        | vk::ShaderStageFlags::FRAGMENT
        | vk::ShaderStageFlags::COMPUTE
}

fn vk_buffer(buffer: &crate::resources::Buffer) -> Result<vk::Buffer, GraphicsError> {
    match buffer.gpu_handle() {
        GpuBuffer::Vulkan { buffer, .. } => Ok(*buffer),
        _ => Err(GraphicsError::InvalidParameter(
            "buffer was not created by the Vulkan backend".to_string(),
        )),
    }
}

fn vk_image_parts(
    texture: &crate::resources::Texture,
) -> Result<(vk::Image, vk::ImageView), GraphicsError> {
    match texture.gpu_handle() {
        GpuTexture::Vulkan { image, view, .. } => Ok((*image, *view)),
        _ => Err(GraphicsError::InvalidParameter(
            "texture was not created by the Vulkan backend".to_string(),
        )),
    }
}

fn view_register_kind(view: &DescriptorView) -> crate::binding::RegisterKind {
    use crate::binding::RegisterKind;
    match view {
        DescriptorView::ConstantBuffer(_) => RegisterKind::ConstantBuffer,
        DescriptorView::StructuredBuffer(_) | DescriptorView::ShaderResource { .. } => {
            RegisterKind::ShaderResource
        }
        DescriptorView::UnorderedAccess(_)
        | DescriptorView::RenderTarget(_)
        | DescriptorView::DepthStencil(_) => RegisterKind::UnorderedAccess,
        DescriptorView::Sampler(_) => RegisterKind::Sampler,
    }
}

fn clear_color(clear: &ClearValue) -> vk::ClearValue {
    match clear {
        ClearValue::Color { r, g, b, a } => vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [*r, *g, *b, *a],
            },
        },
        _ => vk::ClearValue::default(),
    }
}

fn clear_depth(clear: &ClearValue) -> vk::ClearValue {
    match clear {
        ClearValue::Depth(depth) => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: *depth,
                stencil: 0,
            },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: *depth,
                stencil: *stencil,
            },
        },
        _ => vk::ClearValue::default(),
    }
}

fn load_op(clear: &ClearValue) -> vk::AttachmentLoadOp {
    match clear {
        ClearValue::None => vk::AttachmentLoadOp::LOAD,
        _ => vk::AttachmentLoadOp::CLEAR,
    }
}

/// Pipeline state tracked while recording.
struct BoundPipeline<'a> {
    layout: vk::PipelineLayout,
    set_layouts: &'a [vk::DescriptorSetLayout],
    bind_point: vk::PipelineBindPoint,
}

/// Records one backend-neutral command list into a Vulkan command buffer.
///
/// Transient objects the recording creates (descriptor sets via the pool,
/// single-mip image views) stay alive in `transient_views` until the caller
/// retires them behind the submission's fence.
pub(crate) struct CommandTranslator<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
    descriptor_pool: vk::DescriptorPool,
    pub(crate) transient_views: Vec<vk::ImageView>,
}

impl<'a> CommandTranslator<'a> {
    pub(crate) fn new(
        device: &'a ash::Device,
        command_buffer: vk::CommandBuffer,
        descriptor_pool: vk::DescriptorPool,
    ) -> Self {
        Self {
            device,
            command_buffer,
            descriptor_pool,
            transient_views: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, commands: &[GpuCommand]) -> Result<(), GraphicsError> {
        let mut bound: Option<BoundPipeline> = None;

        for command in commands {
            match command {
                GpuCommand::TransitionTexture { texture, from, to } => {
                    self.texture_barrier(texture, *from, *to)?;
                }
                GpuCommand::TransitionBuffer { buffer, from, to } => {
                    self.buffer_barrier(buffer, *from, *to)?;
                }
                GpuCommand::BeginRenderTargets {
                    colors,
                    depth,
                    viewport,
                    scissor,
                } => {
                    self.begin_rendering(colors, depth.as_ref(), viewport, scissor)?;
                }
                GpuCommand::EndRenderTargets => unsafe {
                    self.device.cmd_end_rendering(self.command_buffer);
                },
                GpuCommand::BindPipeline { pipeline } => match pipeline.gpu_handle() {
                    GpuPipeline::Vulkan {
                        pipeline: vk_pipeline,
                        layout,
                        set_layouts,
                        bind_point,
                        ..
                    } => {
                        unsafe {
                            self.device.cmd_bind_pipeline(
                                self.command_buffer,
                                *bind_point,
                                *vk_pipeline,
                            );
                        }
                        bound = Some(BoundPipeline {
                            layout: *layout,
                            set_layouts,
                            bind_point: *bind_point,
                        });
                    }
                    _ => {
                        return Err(GraphicsError::InvalidParameter(
                            "pipeline was not created by the Vulkan backend".to_string(),
                        ))
                    }
                },
                GpuCommand::BindDescriptors { bindings } => {
                    let bound = bound.as_ref().ok_or_else(|| {
                        GraphicsError::InvalidParameter(
                            "descriptors bound before any pipeline".to_string(),
                        )
                    })?;
                    self.bind_descriptors(bound, bindings)?;
                }
                GpuCommand::SetRootConstants { data, .. } => {
                    let bound = bound.as_ref().ok_or_else(|| {
                        GraphicsError::InvalidParameter(
                            "root constants set before any pipeline".to_string(),
                        )
                    })?;
                    unsafe {
                        self.device.cmd_push_constants(
                            self.command_buffer,
                            bound.layout,
                            push_constant_stages(),
                            0,
                            bytemuck::cast_slice(data),
                        );
                    }
                }
                GpuCommand::BindVertexBuffer {
                    slot,
                    buffer,
                    offset,
                } => unsafe {
                    self.device.cmd_bind_vertex_buffers(
                        self.command_buffer,
                        *slot,
                        &[vk_buffer(buffer)?],
                        &[*offset],
                    );
                },
                GpuCommand::BindIndexBuffer { buffer, offset } => unsafe {
                    self.device.cmd_bind_index_buffer(
                        self.command_buffer,
                        vk_buffer(buffer)?,
                        *offset,
                        vk::IndexType::UINT32,
                    );
                },
                GpuCommand::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => unsafe {
                    self.device.cmd_draw(
                        self.command_buffer,
                        *vertex_count,
                        *instance_count,
                        *first_vertex,
                        *first_instance,
                    );
                },
                GpuCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    base_vertex,
                    first_instance,
                } => unsafe {
                    self.device.cmd_draw_indexed(
                        self.command_buffer,
                        *index_count,
                        *instance_count,
                        *first_index,
                        *base_vertex,
                        *first_instance,
                    );
                },
                GpuCommand::Dispatch { x, y, z } => unsafe {
                    self.device.cmd_dispatch(self.command_buffer, *x, *y, *z);
                },
                GpuCommand::CopyBufferToBuffer {
                    src,
                    src_offset,
                    dst,
                    dst_offset,
                    size,
                } => unsafe {
                    self.device.cmd_copy_buffer(
                        self.command_buffer,
                        vk_buffer(src)?,
                        vk_buffer(dst)?,
                        &[vk::BufferCopy {
                            src_offset: *src_offset,
                            dst_offset: *dst_offset,
                            size: *size,
                        }],
                    );
                },
                GpuCommand::CopyBufferToTexture {
                    src,
                    src_offset,
                    bytes_per_row,
                    dst,
                    mip_level,
                    origin,
                    extent,
                } => {
                    let (image, _) = vk_image_parts(dst)?;
                    let format = dst.format();
                    let region = vk::BufferImageCopy {
                        buffer_offset: *src_offset,
                        buffer_row_length: bytes_per_row / format.block_size(),
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: aspect_mask(format),
                            mip_level: *mip_level,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D {
                            x: origin[0] as i32,
                            y: origin[1] as i32,
                            z: 0,
                        },
                        image_extent: vk::Extent3D {
                            width: extent[0],
                            height: extent[1],
                            depth: 1,
                        },
                    };
                    unsafe {
                        self.device.cmd_copy_buffer_to_image(
                            self.command_buffer,
                            vk_buffer(src)?,
                            image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[region],
                        );
                    }
                }
                GpuCommand::CopyTextureToBuffer {
                    src,
                    mip_level,
                    origin,
                    extent,
                    dst,
                    dst_offset,
                    bytes_per_row,
                } => {
                    let (image, _) = vk_image_parts(src)?;
                    let format = src.format();
                    let region = vk::BufferImageCopy {
                        buffer_offset: *dst_offset,
                        buffer_row_length: bytes_per_row / format.block_size(),
                        buffer_image_height: 0,
                        image_subresource: vk::ImageSubresourceLayers {
                            aspect_mask: aspect_mask(format),
                            mip_level: *mip_level,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: vk::Offset3D {
                            x: origin[0] as i32,
                            y: origin[1] as i32,
                            z: 0,
                        },
                        image_extent: vk::Extent3D {
                            width: extent[0],
                            height: extent[1],
                            depth: 1,
                        },
                    };
                    unsafe {
                        self.device.cmd_copy_image_to_buffer(
                            self.command_buffer,
                            image,
                            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                            vk_buffer(dst)?,
                            &[region],
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn texture_barrier(
        &self,
        texture: &crate::resources::Texture,
        from: crate::state::ResourceState,
        to: crate::state::ResourceState,
    ) -> Result<(), GraphicsError> {
        let (image, _) = vk_image_parts(texture)?;
        let barrier = vk::ImageMemoryBarrier::default()
            .src_access_mask(access_mask(from))
            .dst_access_mask(access_mask(to))
            .old_layout(image_layout(from, true))
            .new_layout(image_layout(to, false))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(texture.format()),
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            });
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                pipeline_stage(from),
                pipeline_stage(to),
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    }

    fn buffer_barrier(
        &self,
        buffer: &crate::resources::Buffer,
        from: crate::state::ResourceState,
        to: crate::state::ResourceState,
    ) -> Result<(), GraphicsError> {
        let barrier = vk::BufferMemoryBarrier::default()
            .src_access_mask(access_mask(from))
            .dst_access_mask(access_mask(to))
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(vk_buffer(buffer)?)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                pipeline_stage(from),
                pipeline_stage(to),
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
        }
        Ok(())
    }

    fn begin_rendering(
        &self,
        colors: &[crate::commands::ColorAttachment],
        depth: Option<&crate::commands::DepthAttachment>,
        viewport: &crate::types::Viewport,
        scissor: &crate::types::ScissorRect,
    ) -> Result<(), GraphicsError> {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = colors
            .iter()
            .map(|attachment| -> Result<_, GraphicsError> {
                let (_, view) = vk_image_parts(&attachment.texture)?;
                Ok(vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(load_op(&attachment.clear))
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clear_color(&attachment.clear)))
            })
            .collect::<Result<_, _>>()?;

        let depth_attachment = depth
            .map(|attachment| -> Result<_, GraphicsError> {
                let (_, view) = vk_image_parts(&attachment.texture)?;
                Ok(vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .load_op(load_op(&attachment.clear))
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clear_depth(&attachment.clear)))
            })
            .transpose()?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D {
                x: scissor.x,
                y: scissor.y,
            },
            extent: vk::Extent2D {
                width: scissor.width,
                height: scissor.height,
            },
        };

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth_attachment) = &depth_attachment {
            rendering_info = rendering_info.depth_attachment(depth_attachment);
        }

        unsafe {
            self.device
                .cmd_begin_rendering(self.command_buffer, &rendering_info);
            self.device.cmd_set_viewport(
                self.command_buffer,
                0,
                &[vk::Viewport {
                    x: viewport.x,
                    y: viewport.y,
                    width: viewport.width,
                    height: viewport.height,
                    min_depth: viewport.min_depth,
                    max_depth: viewport.max_depth,
                }],
            );
            self.device
                .cmd_set_scissor(self.command_buffer, 0, &[render_area]);
        }
        Ok(())
    }

    /// Create a transient image view over a subresource range.
    fn subresource_view(
        &mut self,
        texture: &crate::resources::Texture,
        view_desc: &TextureViewDescriptor,
    ) -> Result<vk::ImageView, GraphicsError> {
        let (image, whole_view) = vk_image_parts(texture)?;
        if *view_desc == TextureViewDescriptor::whole() {
            return Ok(whole_view);
        }

        let format = view_desc.format.unwrap_or_else(|| texture.format());
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(convert_texture_format(format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect_mask(format),
                base_mip_level: view_desc.base_mip_level,
                level_count: view_desc
                    .mip_level_count
                    .unwrap_or(vk::REMAINING_MIP_LEVELS),
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = unsafe {
            self.device.create_image_view(&info, None).map_err(|e| {
                GraphicsError::ResourceCreationFailed(format!(
                    "transient image view creation failed: {e}"
                ))
            })?
        };
        self.transient_views.push(view);
        Ok(view)
    }

    fn bind_descriptors(
        &mut self,
        bound: &BoundPipeline,
        bindings: &[DescriptorBinding],
    ) -> Result<(), GraphicsError> {
        use std::collections::HashMap;

        let mut by_space: HashMap<u32, Vec<&DescriptorBinding>> = HashMap::new();
        for binding in bindings {
            by_space.entry(binding.space).or_default().push(binding);
        }

        for (space, bindings) in by_space {
            let layout =
                *bound
                    .set_layouts
                    .get(space as usize)
                    .ok_or_else(|| {
                        GraphicsError::InvalidParameter(format!(
                            "descriptor space {space} not declared by the bound pipeline"
                        ))
                    })?;

            let set = unsafe {
                self.device
                    .allocate_descriptor_sets(
                        &vk::DescriptorSetAllocateInfo::default()
                            .descriptor_pool(self.descriptor_pool)
                            .set_layouts(std::slice::from_ref(&layout)),
                    )
                    .map_err(|e| {
                        GraphicsError::Internal(format!("descriptor set allocation failed: {e}"))
                    })?[0]
            };

            for binding in bindings {
                self.write_descriptor(set, binding)?;
            }

            unsafe {
                self.device.cmd_bind_descriptor_sets(
                    self.command_buffer,
                    bound.bind_point,
                    bound.layout,
                    space,
                    &[set],
                    &[],
                );
            }
        }
        Ok(())
    }

    fn write_descriptor(
        &mut self,
        set: vk::DescriptorSet,
        binding: &DescriptorBinding,
    ) -> Result<(), GraphicsError> {
        let number = binding_shift(view_register_kind(&binding.view)) + binding.register;

        match &binding.view {
            DescriptorView::ConstantBuffer(buffer) => {
                let info = vk::DescriptorBufferInfo {
                    buffer: vk_buffer(buffer)?,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                };
                self.update(set, number, vk::DescriptorType::UNIFORM_BUFFER, |write| {
                    write.buffer_info(std::slice::from_ref(&info))
                });
            }
            DescriptorView::StructuredBuffer(buffer) => {
                let info = vk::DescriptorBufferInfo {
                    buffer: vk_buffer(buffer)?,
                    offset: 0,
                    range: vk::WHOLE_SIZE,
                };
                self.update(set, number, vk::DescriptorType::STORAGE_BUFFER, |write| {
                    write.buffer_info(std::slice::from_ref(&info))
                });
            }
            DescriptorView::ShaderResource { texture, view } => {
                let image_view = self.subresource_view(texture, view)?;
                let info = vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                };
                self.update(set, number, vk::DescriptorType::SAMPLED_IMAGE, |write| {
                    write.image_info(std::slice::from_ref(&info))
                });
            }
            DescriptorView::UnorderedAccess(texture)
            | DescriptorView::RenderTarget(texture)
            | DescriptorView::DepthStencil(texture) => {
                let (_, image_view) = vk_image_parts(texture)?;
                let info = vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view,
                    image_layout: vk::ImageLayout::GENERAL,
                };
                self.update(set, number, vk::DescriptorType::STORAGE_IMAGE, |write| {
                    write.image_info(std::slice::from_ref(&info))
                });
            }
            DescriptorView::Sampler(sampler) => {
                let vk_sampler = match sampler.gpu_handle() {
                    GpuSampler::Vulkan { sampler, .. } => *sampler,
                    _ => {
                        return Err(GraphicsError::InvalidParameter(
                            "sampler was not created by the Vulkan backend".to_string(),
                        ))
                    }
                };
                let info = vk::DescriptorImageInfo {
                    sampler: vk_sampler,
                    image_view: vk::ImageView::null(),
                    image_layout: vk::ImageLayout::UNDEFINED,
                };
                self.update(set, number, vk::DescriptorType::SAMPLER, |write| {
                    write.image_info(std::slice::from_ref(&info))
                });
            }
        }
        Ok(())
    }

    fn update<'b>(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        fill: impl FnOnce(vk::WriteDescriptorSet<'b>) -> vk::WriteDescriptorSet<'b>,
    ) {
        let write = fill(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .dst_array_element(0)
                .descriptor_type(descriptor_type),
        );
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }
}

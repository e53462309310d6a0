//! Translation of recorded command lists into wgpu command buffers.
//!
//! Recorded transitions are dropped here: wgpu tracks resource states
//! internally. Bind groups are created up front in a pre-pass, because a
//! `wgpu::RenderPass` borrows everything it binds for the scope's lifetime.

use std::collections::HashMap;

use crate::binding::{DescriptorBinding, DescriptorView, RegisterKind};
use crate::commands::GpuCommand;
use crate::error::GraphicsError;
use crate::types::ClearValue;

use super::super::{GpuBuffer, GpuPipeline, GpuSampler, GpuTexture};
use super::conversion::{binding_shift, convert_texture_format};
use super::WgpuPipeline;

fn wgpu_buffer<'a>(buffer: &'a crate::resources::Buffer) -> Result<&'a wgpu::Buffer, GraphicsError> {
    match buffer.gpu_handle() {
        GpuBuffer::Wgpu(buffer) => Ok(buffer),
        _ => Err(GraphicsError::InvalidParameter(
            "buffer was not created by the wgpu backend".to_string(),
        )),
    }
}

fn wgpu_texture_parts(
    texture: &crate::resources::Texture,
) -> Result<(&wgpu::Texture, &wgpu::TextureView), GraphicsError> {
    match texture.gpu_handle() {
        GpuTexture::Wgpu { texture, view } => Ok((texture, view)),
        _ => Err(GraphicsError::InvalidParameter(
            "texture was not created by the wgpu backend".to_string(),
        )),
    }
}

fn wgpu_render_pipeline(pipeline: &GpuPipeline) -> Result<&wgpu::RenderPipeline, GraphicsError> {
    match pipeline {
        GpuPipeline::Wgpu(WgpuPipeline::Render(pipeline)) => Ok(pipeline),
        _ => Err(GraphicsError::InvalidParameter(
            "expected a wgpu render pipeline".to_string(),
        )),
    }
}

fn view_register_kind(view: &DescriptorView) -> RegisterKind {
    match view {
        DescriptorView::ConstantBuffer(_) => RegisterKind::ConstantBuffer,
        // Structured buffers bind to t registers like texture SRVs.
        DescriptorView::StructuredBuffer(_) | DescriptorView::ShaderResource { .. } => {
            RegisterKind::ShaderResource
        }
        DescriptorView::UnorderedAccess(_)
        | DescriptorView::RenderTarget(_)
        | DescriptorView::DepthStencil(_) => RegisterKind::UnorderedAccess,
        DescriptorView::Sampler(_) => RegisterKind::Sampler,
    }
}

/// Bind groups created ahead of encoding, keyed by command index.
type BindGroupTable = HashMap<usize, Vec<(u32, wgpu::BindGroup)>>;

/// Create every bind group the command list will need.
///
/// Pipelines use wgpu's derived layouts, so each `BindDescriptors` command
/// resolves its group layouts from the pipeline bound at that point.
fn create_bind_groups(
    device: &wgpu::Device,
    commands: &[GpuCommand],
) -> Result<BindGroupTable, GraphicsError> {
    let mut table = BindGroupTable::new();
    let mut current_pipeline: Option<&GpuPipeline> = None;

    for (index, command) in commands.iter().enumerate() {
        match command {
            GpuCommand::BindPipeline { pipeline } => {
                current_pipeline = Some(pipeline.gpu_handle());
            }
            GpuCommand::BindDescriptors { bindings } => {
                let pipeline = current_pipeline.ok_or_else(|| {
                    GraphicsError::InvalidParameter(
                        "descriptors bound before any pipeline".to_string(),
                    )
                })?;
                table.insert(index, create_groups_for(device, pipeline, bindings)?);
            }
            _ => {}
        }
    }
    Ok(table)
}

fn create_groups_for(
    device: &wgpu::Device,
    pipeline: &GpuPipeline,
    bindings: &[DescriptorBinding],
) -> Result<Vec<(u32, wgpu::BindGroup)>, GraphicsError> {
    let mut by_space: HashMap<u32, Vec<&DescriptorBinding>> = HashMap::new();
    for binding in bindings {
        by_space.entry(binding.space).or_default().push(binding);
    }

    let mut groups = Vec::new();
    for (space, bindings) in by_space {
        // Texture views have to outlive the entries that reference them.
        let mut views = Vec::new();
        for binding in &bindings {
            if let DescriptorView::ShaderResource { texture, view } = &binding.view {
                let (texture, _) = wgpu_texture_parts(texture)?;
                views.push(texture.create_view(&wgpu::TextureViewDescriptor {
                    label: view.label.as_deref(),
                    format: view.format.map(convert_texture_format),
                    dimension: None,
                    aspect: wgpu::TextureAspect::All,
                    base_mip_level: view.base_mip_level,
                    mip_level_count: view.mip_level_count,
                    base_array_layer: 0,
                    array_layer_count: None,
                }));
            }
        }

        let mut entries = Vec::new();
        let mut view_cursor = 0;
        for binding in &bindings {
            let number = binding_shift(view_register_kind(&binding.view)) + binding.register;
            let resource = match &binding.view {
                DescriptorView::ConstantBuffer(buffer)
                | DescriptorView::StructuredBuffer(buffer) => {
                    wgpu_buffer(buffer)?.as_entire_binding()
                }
                DescriptorView::ShaderResource { .. } => {
                    let view = &views[view_cursor];
                    view_cursor += 1;
                    wgpu::BindingResource::TextureView(view)
                }
                DescriptorView::UnorderedAccess(texture)
                | DescriptorView::RenderTarget(texture)
                | DescriptorView::DepthStencil(texture) => {
                    let (_, view) = wgpu_texture_parts(texture)?;
                    wgpu::BindingResource::TextureView(view)
                }
                DescriptorView::Sampler(sampler) => match sampler.gpu_handle() {
                    GpuSampler::Wgpu(sampler) => wgpu::BindingResource::Sampler(sampler),
                    _ => {
                        return Err(GraphicsError::InvalidParameter(
                            "sampler was not created by the wgpu backend".to_string(),
                        ))
                    }
                },
            };
            entries.push(wgpu::BindGroupEntry {
                binding: number,
                resource,
            });
        }

        let layout = match pipeline {
            GpuPipeline::Wgpu(WgpuPipeline::Render(p)) => p.get_bind_group_layout(space),
            GpuPipeline::Wgpu(WgpuPipeline::Compute(p)) => p.get_bind_group_layout(space),
            _ => {
                return Err(GraphicsError::InvalidParameter(
                    "pipeline was not created by the wgpu backend".to_string(),
                ))
            }
        };
        groups.push((
            space,
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &layout,
                entries: &entries,
            }),
        ));
    }
    Ok(groups)
}

fn color_clear(clear: &ClearValue) -> wgpu::LoadOp<wgpu::Color> {
    match clear {
        ClearValue::Color { r, g, b, a } => wgpu::LoadOp::Clear(wgpu::Color {
            r: f64::from(*r),
            g: f64::from(*g),
            b: f64::from(*b),
            a: f64::from(*a),
        }),
        _ => wgpu::LoadOp::Load,
    }
}

fn depth_clear(clear: &ClearValue) -> wgpu::LoadOp<f32> {
    match clear {
        ClearValue::Depth(depth) | ClearValue::DepthStencil { depth, .. } => {
            wgpu::LoadOp::Clear(*depth)
        }
        _ => wgpu::LoadOp::Load,
    }
}

/// Encode a recorded command list into one wgpu command buffer.
pub(crate) fn encode_commands(
    device: &wgpu::Device,
    commands: &[GpuCommand],
) -> Result<wgpu::CommandBuffer, GraphicsError> {
    let bind_groups = create_bind_groups(device, commands)?;
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("frame commands"),
    });

    let mut index = 0;
    let mut compute_pipeline: Option<&wgpu::ComputePipeline> = None;
    let mut compute_groups: Option<&Vec<(u32, wgpu::BindGroup)>> = None;

    while index < commands.len() {
        match &commands[index] {
            GpuCommand::TransitionTexture { .. } | GpuCommand::TransitionBuffer { .. } => {}
            GpuCommand::BeginRenderTargets {
                colors,
                depth,
                viewport,
                scissor,
            } => {
                let scope_end = commands[index..]
                    .iter()
                    .position(|c| matches!(c, GpuCommand::EndRenderTargets))
                    .map(|offset| index + offset)
                    .ok_or_else(|| {
                        GraphicsError::InvalidParameter(
                            "render target scope never closed".to_string(),
                        )
                    })?;

                let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = colors
                    .iter()
                    .map(|attachment| {
                        let (_, view) = wgpu_texture_parts(&attachment.texture)?;
                        Ok(Some(wgpu::RenderPassColorAttachment {
                            view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: color_clear(&attachment.clear),
                                store: wgpu::StoreOp::Store,
                            },
                        }))
                    })
                    .collect::<Result<_, GraphicsError>>()?;

                let depth_attachment = depth
                    .as_ref()
                    .map(|attachment| -> Result<_, GraphicsError> {
                        let (_, view) = wgpu_texture_parts(&attachment.texture)?;
                        Ok(wgpu::RenderPassDepthStencilAttachment {
                            view,
                            depth_ops: Some(wgpu::Operations {
                                load: depth_clear(&attachment.clear),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: None,
                        })
                    })
                    .transpose()?;

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: None,
                    color_attachments: &color_attachments,
                    depth_stencil_attachment: depth_attachment,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_viewport(
                    viewport.x,
                    viewport.y,
                    viewport.width,
                    viewport.height,
                    viewport.min_depth,
                    viewport.max_depth,
                );
                pass.set_scissor_rect(
                    scissor.x.max(0) as u32,
                    scissor.y.max(0) as u32,
                    scissor.width,
                    scissor.height,
                );

                for (inner_index, command) in commands[index + 1..scope_end]
                    .iter()
                    .enumerate()
                    .map(|(offset, c)| (index + 1 + offset, c))
                {
                    encode_draw_command(&mut pass, command, inner_index, &bind_groups)?;
                }
                drop(pass);
                index = scope_end;
            }
            GpuCommand::EndRenderTargets => {
                return Err(GraphicsError::InvalidParameter(
                    "render target scope closed without being open".to_string(),
                ));
            }
            GpuCommand::BindPipeline { pipeline } => {
                if let GpuPipeline::Wgpu(WgpuPipeline::Compute(p)) = pipeline.gpu_handle() {
                    compute_pipeline = Some(p);
                }
            }
            GpuCommand::BindDescriptors { .. } => {
                compute_groups = bind_groups.get(&index);
            }
            GpuCommand::Dispatch { x, y, z } => {
                let pipeline = compute_pipeline.ok_or_else(|| {
                    GraphicsError::InvalidParameter(
                        "dispatch without a compute pipeline".to_string(),
                    )
                })?;
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: None,
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                if let Some(groups) = compute_groups {
                    for (space, group) in groups {
                        pass.set_bind_group(*space, group, &[]);
                    }
                }
                pass.dispatch_workgroups(*x, *y, *z);
            }
            GpuCommand::CopyBufferToBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                encoder.copy_buffer_to_buffer(
                    wgpu_buffer(src)?,
                    *src_offset,
                    wgpu_buffer(dst)?,
                    *dst_offset,
                    *size,
                );
            }
            GpuCommand::CopyBufferToTexture {
                src,
                src_offset,
                bytes_per_row,
                dst,
                mip_level,
                origin,
                extent,
            } => {
                let (texture, _) = wgpu_texture_parts(dst)?;
                encoder.copy_buffer_to_texture(
                    wgpu::ImageCopyBuffer {
                        buffer: wgpu_buffer(src)?,
                        layout: wgpu::ImageDataLayout {
                            offset: *src_offset,
                            bytes_per_row: Some(*bytes_per_row),
                            rows_per_image: None,
                        },
                    },
                    wgpu::ImageCopyTexture {
                        texture,
                        mip_level: *mip_level,
                        origin: wgpu::Origin3d {
                            x: origin[0],
                            y: origin[1],
                            z: 0,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width: extent[0],
                        height: extent[1],
                        depth_or_array_layers: 1,
                    },
                );
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
                let (texture, _) = wgpu_texture_parts(src)?;
                encoder.copy_texture_to_buffer(
                    wgpu::ImageCopyTexture {
                        texture,
                        mip_level: *mip_level,
                        origin: wgpu::Origin3d {
                            x: origin[0],
                            y: origin[1],
                            z: 0,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::ImageCopyBuffer {
                        buffer: wgpu_buffer(dst)?,
                        layout: wgpu::ImageDataLayout {
                            offset: *dst_offset,
                            bytes_per_row: Some(*bytes_per_row),
                            rows_per_image: None,
                        },
                    },
                    wgpu::Extent3d {
                        width: extent[0],
                        height: extent[1],
                        depth_or_array_layers: 1,
                    },
                );
            }
            other => {
                log::warn!("command outside a render target scope ignored: {other:?}");
            }
        }
        index += 1;
    }

    Ok(encoder.finish())
}

fn encode_draw_command<'a>(
    pass: &mut wgpu::RenderPass<'a>,
    command: &'a GpuCommand,
    command_index: usize,
    bind_groups: &'a BindGroupTable,
) -> Result<(), GraphicsError> {
    match command {
        GpuCommand::TransitionTexture { .. } | GpuCommand::TransitionBuffer { .. } => {}
        GpuCommand::BindPipeline { pipeline } => {
            pass.set_pipeline(wgpu_render_pipeline(pipeline.gpu_handle())?);
        }
        GpuCommand::BindDescriptors { .. } => {
            if let Some(groups) = bind_groups.get(&command_index) {
                for (space, group) in groups {
                    pass.set_bind_group(*space, group, &[]);
                }
            }
        }
        GpuCommand::SetRootConstants { data, .. } => {
            pass.set_push_constants(
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                0,
                bytemuck::cast_slice(data),
            );
        }
        GpuCommand::BindVertexBuffer {
            slot,
            buffer,
            offset,
        } => {
            pass.set_vertex_buffer(*slot, wgpu_buffer(buffer)?.slice(*offset..));
        }
        GpuCommand::BindIndexBuffer { buffer, offset } => {
            pass.set_index_buffer(
                wgpu_buffer(buffer)?.slice(*offset..),
                wgpu::IndexFormat::Uint32,
            );
        }
        GpuCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        } => {
            pass.draw(
                *first_vertex..*first_vertex + *vertex_count,
                *first_instance..*first_instance + *instance_count,
            );
        }
        GpuCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        } => {
            pass.draw_indexed(
                *first_index..*first_index + *index_count,
                *base_vertex,
                *first_instance..*first_instance + *instance_count,
            );
        }
        other => {
            return Err(GraphicsError::InvalidParameter(format!(
                "command not allowed inside a render target scope: {other:?}"
            )));
        }
    }
    Ok(())
}

//! GPU command recording.
//!
//! Passes record work through [`CommandRecorder`] into a backend-neutral
//! [`GpuCommand`] list. The recorder owns a [`BarrierBatch`] so resource
//! transitions requested while recording are deduplicated and folded before
//! they reach the command stream. At submit time the backend translates the
//! list into native command buffers.

use std::sync::Arc;

use crate::binding::DescriptorBinding;
use crate::pipeline_state::PipelineState;
use crate::resources::{Buffer, Texture};
use crate::state::{BarrierBatch, ResourceState};
use crate::types::{ClearValue, ScissorRect, Viewport};

/// A color render target binding.
#[derive(Debug, Clone)]
pub struct ColorAttachment {
    /// Texture to render into.
    pub texture: Arc<Texture>,
    /// Clear behavior at the start of the render target scope.
    pub clear: ClearValue,
}

impl ColorAttachment {
    /// Attach a texture, preserving its previous contents.
    pub fn load(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            clear: ClearValue::None,
        }
    }

    /// Attach a texture, clearing it to a color first.
    pub fn clear(texture: Arc<Texture>, r: f32, g: f32, b: f32, a: f32) -> Self {
        Self {
            texture,
            clear: ClearValue::color(r, g, b, a),
        }
    }
}

/// A depth render target binding.
#[derive(Debug, Clone)]
pub struct DepthAttachment {
    /// Depth texture to render into.
    pub texture: Arc<Texture>,
    /// Clear behavior at the start of the render target scope.
    pub clear: ClearValue,
}

impl DepthAttachment {
    /// Attach a depth texture, clearing it to a depth value first.
    pub fn clear(texture: Arc<Texture>, depth: f32) -> Self {
        Self {
            texture,
            clear: ClearValue::depth(depth),
        }
    }

    /// Attach a depth texture, preserving its previous contents.
    pub fn load(texture: Arc<Texture>) -> Self {
        Self {
            texture,
            clear: ClearValue::None,
        }
    }
}

/// A single backend-neutral GPU command.
///
/// Commands carry strong references to the resources they touch, so a
/// recorded list keeps everything it needs alive until submission.
#[derive(Debug)]
pub enum GpuCommand {
    /// Transition a texture between resource states.
    TransitionTexture {
        texture: Arc<Texture>,
        from: ResourceState,
        to: ResourceState,
    },
    /// Transition a buffer between resource states.
    TransitionBuffer {
        buffer: Arc<Buffer>,
        from: ResourceState,
        to: ResourceState,
    },
    /// Open a render target scope.
    BeginRenderTargets {
        colors: Vec<ColorAttachment>,
        depth: Option<DepthAttachment>,
        viewport: Viewport,
        scissor: ScissorRect,
    },
    /// Close the current render target scope.
    EndRenderTargets,
    /// Bind a pipeline state object.
    BindPipeline { pipeline: Arc<PipelineState> },
    /// Bind shader-visible descriptors for the current pipeline.
    BindDescriptors { bindings: Vec<DescriptorBinding> },
    /// Set root constants for the current pipeline.
    SetRootConstants {
        register: u32,
        space: u32,
        data: Vec<u32>,
    },
    /// Bind a vertex buffer to an input slot.
    BindVertexBuffer {
        slot: u32,
        buffer: Arc<Buffer>,
        offset: u64,
    },
    /// Bind a 32-bit index buffer.
    BindIndexBuffer { buffer: Arc<Buffer>, offset: u64 },
    /// Non-indexed draw.
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    /// Indexed draw.
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    /// Compute dispatch.
    Dispatch { x: u32, y: u32, z: u32 },
    /// Copy a byte range between buffers.
    CopyBufferToBuffer {
        src: Arc<Buffer>,
        src_offset: u64,
        dst: Arc<Buffer>,
        dst_offset: u64,
        size: u64,
    },
    /// Copy tightly rowed pixel data from a buffer into a texture region.
    CopyBufferToTexture {
        src: Arc<Buffer>,
        src_offset: u64,
        /// Byte stride between rows in the source buffer.
        bytes_per_row: u32,
        dst: Arc<Texture>,
        mip_level: u32,
        origin: [u32; 2],
        extent: [u32; 2],
    },
    /// Copy a texture region into a buffer.
    CopyTextureToBuffer {
        src: Arc<Texture>,
        mip_level: u32,
        origin: [u32; 2],
        extent: [u32; 2],
        dst: Arc<Buffer>,
        dst_offset: u64,
        /// Byte stride between rows in the destination buffer.
        bytes_per_row: u32,
    },
}

/// Records GPU commands for one submission.
///
/// The recorder enforces render target scoping (draws must happen between
/// [`begin_render_targets`](Self::begin_render_targets) and
/// [`end_render_targets`](Self::end_render_targets)) and routes all state
/// transitions through its barrier batch.
///
/// # Thread Safety
///
/// `CommandRecorder` is **not** thread-safe; one recorder records one
/// frame's commands on the render thread.
#[derive(Debug, Default)]
pub struct CommandRecorder {
    commands: Vec<GpuCommand>,
    barriers: BarrierBatch,
    render_targets_open: bool,
}

impl CommandRecorder {
    /// Create a new empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a texture transition; folded into the pending barrier batch.
    pub fn transition_texture(&mut self, texture: &Arc<Texture>, to: ResourceState) {
        self.barriers.request_texture(texture, to);
    }

    /// Request a buffer transition; folded into the pending barrier batch.
    pub fn transition_buffer(&mut self, buffer: &Arc<Buffer>, to: ResourceState) {
        self.barriers.request_buffer(buffer, to);
    }

    /// Emit all pending barriers into the command stream.
    ///
    /// Called automatically before render target scopes, copies and
    /// dispatches; explicit calls are only needed when transitions must
    /// land before a custom sync point.
    pub fn flush_barriers(&mut self) {
        self.barriers.drain_into(&mut self.commands);
    }

    /// Open a render target scope.
    ///
    /// Color attachments are transitioned to [`ResourceState::RenderTarget`]
    /// and the depth attachment to [`ResourceState::DepthWrite`] before the
    /// scope begins.
    ///
    /// # Panics
    ///
    /// Panics if a render target scope is already open.
    pub fn begin_render_targets(
        &mut self,
        colors: Vec<ColorAttachment>,
        depth: Option<DepthAttachment>,
        viewport: Viewport,
        scissor: ScissorRect,
    ) {
        assert!(
            !self.render_targets_open,
            "begin_render_targets called with a render target scope already open"
        );

        for color in &colors {
            self.barriers
                .request_texture(&color.texture, ResourceState::RenderTarget);
        }
        if let Some(depth) = &depth {
            self.barriers
                .request_texture(&depth.texture, ResourceState::DepthWrite);
        }
        self.flush_barriers();

        self.commands.push(GpuCommand::BeginRenderTargets {
            colors,
            depth,
            viewport,
            scissor,
        });
        self.render_targets_open = true;
    }

    /// Close the current render target scope.
    ///
    /// # Panics
    ///
    /// Panics if no render target scope is open.
    pub fn end_render_targets(&mut self) {
        assert!(
            self.render_targets_open,
            "end_render_targets called without an open render target scope"
        );
        self.commands.push(GpuCommand::EndRenderTargets);
        self.render_targets_open = false;
    }

    /// Bind a pipeline state object.
    pub fn bind_pipeline(&mut self, pipeline: &Arc<PipelineState>) {
        self.commands.push(GpuCommand::BindPipeline {
            pipeline: Arc::clone(pipeline),
        });
    }

    /// Bind shader-visible descriptors for the current pipeline.
    pub fn bind_descriptors(&mut self, bindings: Vec<DescriptorBinding>) {
        self.commands.push(GpuCommand::BindDescriptors { bindings });
    }

    /// Set root constants for the current pipeline.
    pub fn set_root_constants(&mut self, register: u32, space: u32, data: &[u32]) {
        self.commands.push(GpuCommand::SetRootConstants {
            register,
            space,
            data: data.to_vec(),
        });
    }

    /// Bind a vertex buffer, transitioning it for vertex input.
    pub fn bind_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer>, offset: u64) {
        self.barriers
            .request_buffer(buffer, ResourceState::VertexAndConstantBuffer);
        self.commands.push(GpuCommand::BindVertexBuffer {
            slot,
            buffer: Arc::clone(buffer),
            offset,
        });
    }

    /// Bind a 32-bit index buffer, transitioning it for index input.
    pub fn bind_index_buffer(&mut self, buffer: &Arc<Buffer>, offset: u64) {
        self.barriers.request_buffer(buffer, ResourceState::IndexBuffer);
        self.commands.push(GpuCommand::BindIndexBuffer {
            buffer: Arc::clone(buffer),
            offset,
        });
    }

    /// Record a non-indexed draw.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if no render target scope is open.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        debug_assert!(self.render_targets_open, "draw outside a render target scope");
        self.commands.push(GpuCommand::Draw {
            vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        });
    }

    /// Record an indexed draw.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if no render target scope is open.
    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        debug_assert!(
            self.render_targets_open,
            "draw_indexed outside a render target scope"
        );
        self.commands.push(GpuCommand::DrawIndexed {
            index_count,
            instance_count,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        });
    }

    /// Record a compute dispatch.
    ///
    /// # Panics
    ///
    /// Panics if a render target scope is open.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        assert!(
            !self.render_targets_open,
            "dispatch inside a render target scope"
        );
        self.flush_barriers();
        self.commands.push(GpuCommand::Dispatch { x, y, z });
    }

    /// Copy a byte range between buffers.
    ///
    /// Both buffers are transitioned to their copy states first.
    pub fn copy_buffer_to_buffer(
        &mut self,
        src: &Arc<Buffer>,
        src_offset: u64,
        dst: &Arc<Buffer>,
        dst_offset: u64,
        size: u64,
    ) {
        assert!(
            !self.render_targets_open,
            "copy inside a render target scope"
        );
        self.barriers.request_buffer(src, ResourceState::CopySource);
        self.barriers.request_buffer(dst, ResourceState::CopyDest);
        self.flush_barriers();
        self.commands.push(GpuCommand::CopyBufferToBuffer {
            src: Arc::clone(src),
            src_offset,
            dst: Arc::clone(dst),
            dst_offset,
            size,
        });
    }

    /// Copy pixel rows from a buffer into a texture region.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_buffer_to_texture(
        &mut self,
        src: &Arc<Buffer>,
        src_offset: u64,
        bytes_per_row: u32,
        dst: &Arc<Texture>,
        mip_level: u32,
        origin: [u32; 2],
        extent: [u32; 2],
    ) {
        assert!(
            !self.render_targets_open,
            "copy inside a render target scope"
        );
        self.barriers.request_buffer(src, ResourceState::CopySource);
        self.barriers.request_texture(dst, ResourceState::CopyDest);
        self.flush_barriers();
        self.commands.push(GpuCommand::CopyBufferToTexture {
            src: Arc::clone(src),
            src_offset,
            bytes_per_row,
            dst: Arc::clone(dst),
            mip_level,
            origin,
            extent,
        });
    }

    /// Copy a texture region into a buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_texture_to_buffer(
        &mut self,
        src: &Arc<Texture>,
        mip_level: u32,
        origin: [u32; 2],
        extent: [u32; 2],
        dst: &Arc<Buffer>,
        dst_offset: u64,
        bytes_per_row: u32,
    ) {
        assert!(
            !self.render_targets_open,
            "copy inside a render target scope"
        );
        self.barriers.request_texture(src, ResourceState::CopySource);
        self.barriers.request_buffer(dst, ResourceState::CopyDest);
        self.flush_barriers();
        self.commands.push(GpuCommand::CopyTextureToBuffer {
            src: Arc::clone(src),
            mip_level,
            origin,
            extent,
            dst: Arc::clone(dst),
            dst_offset,
            bytes_per_row,
        });
    }

    /// Recorded commands so far.
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.barriers.is_empty()
    }

    /// Finish recording, returning the command list and resetting the
    /// recorder for reuse.
    ///
    /// # Panics
    ///
    /// Panics if a render target scope is still open.
    pub fn finish(&mut self) -> Vec<GpuCommand> {
        assert!(
            !self.render_targets_open,
            "finish called with an open render target scope"
        );
        self.flush_barriers();
        std::mem::take(&mut self.commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GraphicsDevice;
    use crate::instance::GraphicsInstance;
    use crate::types::{TextureDescriptor, TextureFormat};

    fn create_test_device() -> Arc<GraphicsDevice> {
        let instance = GraphicsInstance::new().unwrap();
        instance.create_device().unwrap()
    }

    fn render_target(device: &Arc<GraphicsDevice>) -> Arc<Texture> {
        device
            .create_texture(&TextureDescriptor::render_target(
                128,
                128,
                TextureFormat::Rgba8Unorm,
            ))
            .unwrap()
    }

    #[test]
    fn test_render_target_scope_emits_barrier_first() {
        let device = create_test_device();
        let target = render_target(&device);

        let mut recorder = CommandRecorder::new();
        recorder.begin_render_targets(
            vec![ColorAttachment::clear(Arc::clone(&target), 0.0, 0.0, 0.0, 1.0)],
            None,
            Viewport::from_dimensions(128, 128),
            ScissorRect::from_dimensions(128, 128),
        );
        recorder.draw(3, 1);
        recorder.end_render_targets();

        let commands = recorder.finish();
        assert!(matches!(
            commands[0],
            GpuCommand::TransitionTexture {
                to: ResourceState::RenderTarget,
                ..
            }
        ));
        assert!(matches!(commands[1], GpuCommand::BeginRenderTargets { .. }));
        assert!(matches!(commands[2], GpuCommand::Draw { .. }));
        assert!(matches!(commands[3], GpuCommand::EndRenderTargets));
    }

    #[test]
    fn test_redundant_transition_not_emitted() {
        let device = create_test_device();
        let target = render_target(&device);

        let mut recorder = CommandRecorder::new();
        recorder.transition_texture(&target, ResourceState::RenderTarget);
        recorder.flush_barriers();
        let first = recorder.finish();
        assert_eq!(first.len(), 1);

        // Texture is already in RenderTarget state; a second request is a no-op.
        recorder.transition_texture(&target, ResourceState::RenderTarget);
        recorder.flush_barriers();
        assert!(recorder.finish().is_empty());
    }

    #[test]
    #[should_panic(expected = "render target scope already open")]
    fn test_nested_render_targets_panics() {
        let device = create_test_device();
        let target = render_target(&device);

        let mut recorder = CommandRecorder::new();
        recorder.begin_render_targets(
            vec![ColorAttachment::load(Arc::clone(&target))],
            None,
            Viewport::from_dimensions(128, 128),
            ScissorRect::from_dimensions(128, 128),
        );
        recorder.begin_render_targets(
            vec![ColorAttachment::load(target)],
            None,
            Viewport::from_dimensions(128, 128),
            ScissorRect::from_dimensions(128, 128),
        );
    }

    #[test]
    #[should_panic(expected = "open render target scope")]
    fn test_finish_with_open_scope_panics() {
        let device = create_test_device();
        let target = render_target(&device);

        let mut recorder = CommandRecorder::new();
        recorder.begin_render_targets(
            vec![ColorAttachment::load(target)],
            None,
            Viewport::from_dimensions(128, 128),
            ScissorRect::from_dimensions(128, 128),
        );
        let _ = recorder.finish();
    }
}

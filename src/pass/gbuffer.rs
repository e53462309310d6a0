//! G-buffer mesh pass.
//!
//! Rasterizes registered scene primitives into albedo, normal and depth
//! targets, exported for the deferred lighting pass. Frame constants (the
//! camera's view-projection) go through a persistent upload buffer; each
//! primitive's transform is pushed as root constants.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use crate::binding::{DescriptorHeap, DescriptorView, RootSignature, RootSignatureAllocation, RootSignatureBuilder};
use crate::commands::{ColorAttachment, DepthAttachment};
use crate::context::RenderContext;
use crate::error::GraphicsError;
use crate::mesh::VertexLayout;
use crate::pipeline_state::{PipelineState, PipelineStateDesc, ShaderBlob};
use crate::resources::Buffer;
use crate::scene::{Camera, Primitive, SceneObject, SceneObjectId};
use crate::state::ResourceState;
use crate::types::{
    BufferDescriptor, BufferUsage, ScissorRect, TextureDescriptor, TextureFormat, TextureUsage,
    Viewport,
};

use super::{PassBehavior, PassKind, PassResourceDeclaration, ResourceTableId};

/// Per-frame shader constants.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FrameConstants {
    view_projection: [[f32; 4]; 4],
}

/// GPU objects created by `init_pass`.
struct GBufferGpu {
    root_signature: Arc<RootSignature>,
    heap: DescriptorHeap,
    pipeline: Arc<PipelineState>,
    frame_constants: Arc<Buffer>,
}

/// The deferred G-buffer pass.
///
/// Exports [`ResourceTableId::BasePassAlbedo`],
/// [`ResourceTableId::BasePassNormal`] and [`ResourceTableId::Depth`].
pub struct GBufferPass {
    width: u32,
    height: u32,
    vertex_shader: ShaderBlob,
    fragment_shader: ShaderBlob,

    builder: Option<RootSignatureBuilder>,
    frame_constants_slot: Option<RootSignatureAllocation>,
    object_transform_slot: Option<RootSignatureAllocation>,
    gpu: Option<GBufferGpu>,

    camera: Camera,
    primitives: HashMap<SceneObjectId, Primitive>,
}

impl GBufferPass {
    /// Target format of the albedo export.
    pub const ALBEDO_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
    /// Target format of the normal export.
    pub const NORMAL_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
    /// Target format of the depth export.
    pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

    /// Create a G-buffer pass rendering at the given resolution.
    pub fn new(
        width: u32,
        height: u32,
        vertex_shader: ShaderBlob,
        fragment_shader: ShaderBlob,
    ) -> Self {
        Self {
            width,
            height,
            vertex_shader,
            fragment_shader,
            builder: None,
            frame_constants_slot: None,
            object_transform_slot: None,
            gpu: None,
            camera: Camera::default(),
            primitives: HashMap::new(),
        }
    }

    /// Number of registered primitives.
    pub fn primitive_count(&self) -> usize {
        self.primitives.len()
    }

    /// The pass's root signature, once initialized.
    pub fn root_signature(&self) -> Option<&Arc<RootSignature>> {
        self.gpu.as_ref().map(|gpu| &gpu.root_signature)
    }

    fn gpu(&self) -> &GBufferGpu {
        self.gpu.as_ref().expect("g_buffer pass not initialized")
    }
}

impl PassBehavior for GBufferPass {
    fn name(&self) -> &str {
        "g_buffer"
    }

    fn kind(&self) -> PassKind {
        PassKind::Graphics
    }

    fn declare_resources(&self) -> PassResourceDeclaration {
        PassResourceDeclaration::new()
            .export(
                ResourceTableId::BasePassAlbedo,
                TextureDescriptor::render_target(self.width, self.height, Self::ALBEDO_FORMAT),
            )
            .export(
                ResourceTableId::BasePassNormal,
                TextureDescriptor::render_target(self.width, self.height, Self::NORMAL_FORMAT),
            )
            .export(
                ResourceTableId::Depth,
                TextureDescriptor::new_2d(
                    self.width,
                    self.height,
                    Self::DEPTH_FORMAT,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ),
            )
    }

    fn init_render_interface(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let mut builder = RootSignatureBuilder::new("g_buffer");
        self.frame_constants_slot = Some(builder.add_cbv_root_parameter("FRAME_CONSTANTS", 0));
        self.object_transform_slot =
            Some(builder.add_constant_root_parameter("OBJECT_TRANSFORM", 16, 0));
        self.builder = Some(builder);
        Ok(())
    }

    fn init_pass(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let builder = self
            .builder
            .take()
            .expect("init_render_interface must run before init_pass");
        let root_signature = Arc::new(builder.build());

        let mut heap = DescriptorHeap::new("g_buffer", PassKind::Graphics);

        let frame_constants = ctx.memory.allocate_buffer(
            &BufferDescriptor::upload(
                mem::size_of::<FrameConstants>() as u64,
                BufferUsage::UNIFORM,
            )
            .with_label("g_buffer_frame_constants"),
        )?;
        heap.allocate(DescriptorView::ConstantBuffer(Arc::clone(&frame_constants)))?;

        let pipeline = ctx.device.create_pipeline_state(
            &PipelineStateDesc::new(Arc::clone(&root_signature))
                .with_shader(self.vertex_shader.clone())
                .with_shader(self.fragment_shader.clone())
                .with_vertex_layout(VertexLayout::position_normal_uv())
                .with_color_format(Self::ALBEDO_FORMAT)
                .with_color_format(Self::NORMAL_FORMAT)
                .with_depth_format(Self::DEPTH_FORMAT)
                .with_label("g_buffer"),
        )?;

        self.gpu = Some(GBufferGpu {
            root_signature,
            heap,
            pipeline,
            frame_constants,
        });
        Ok(())
    }

    fn pre_render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let index = ctx.back_buffer_index();
        let albedo = ctx.resources.texture(ResourceTableId::BasePassAlbedo, index)?;
        let normal = ctx.resources.texture(ResourceTableId::BasePassNormal, index)?;
        let depth = ctx.resources.texture(ResourceTableId::Depth, index)?;

        let gpu = self.gpu();

        // Transition geometry buffers up front so every barrier lands before
        // the render target scope opens.
        ctx.recorder
            .transition_buffer(&gpu.frame_constants, ResourceState::VertexAndConstantBuffer);
        for primitive in self.primitives.values() {
            for buffer in primitive.mesh.vertex_buffers() {
                ctx.recorder
                    .transition_buffer(buffer, ResourceState::VertexAndConstantBuffer);
            }
            if let Some(indices) = primitive.mesh.index_buffer() {
                ctx.recorder.transition_buffer(indices, ResourceState::IndexBuffer);
            }
        }

        ctx.recorder.begin_render_targets(
            vec![
                ColorAttachment::clear(albedo, 0.0, 0.0, 0.0, 1.0),
                ColorAttachment::clear(normal, 0.0, 0.0, 0.0, 0.0),
            ],
            Some(DepthAttachment::clear(depth, 1.0)),
            Viewport::from_dimensions(self.width, self.height),
            ScissorRect::from_dimensions(self.width, self.height),
        );

        ctx.recorder.bind_pipeline(&gpu.pipeline);
        if let Some(slot) = self.frame_constants_slot {
            ctx.recorder.bind_descriptors(vec![crate::binding::DescriptorBinding {
                register: slot.register_index,
                space: slot.space,
                view: DescriptorView::ConstantBuffer(Arc::clone(&gpu.frame_constants)),
            }]);
        }
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let slot = self
            .object_transform_slot
            .expect("g_buffer pass not initialized");

        for primitive in self.primitives.values() {
            let transform = primitive.transform.to_cols_array();
            ctx.recorder.set_root_constants(
                slot.register_index,
                slot.space,
                bytemuck::cast_slice(&transform),
            );

            for (buffer_slot, buffer) in primitive.mesh.vertex_buffers().iter().enumerate() {
                ctx.recorder.bind_vertex_buffer(buffer_slot as u32, buffer, 0);
            }
            match primitive.mesh.index_buffer() {
                Some(indices) => {
                    ctx.recorder.bind_index_buffer(indices, 0);
                    ctx.recorder.draw_indexed(primitive.mesh.index_count(), 1);
                }
                None => ctx.recorder.draw(primitive.mesh.vertex_count(), 1),
            }
        }

        log::trace!("g_buffer: {} primitives drawn", self.primitives.len());
        Ok(())
    }

    fn post_render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        ctx.recorder.end_render_targets();

        // Downstream passes sample the targets.
        let index = ctx.back_buffer_index();
        for id in [
            ResourceTableId::BasePassAlbedo,
            ResourceTableId::BasePassNormal,
            ResourceTableId::Depth,
        ] {
            let texture = ctx.resources.texture(id, index)?;
            ctx.recorder
                .transition_texture(&texture, ResourceState::ShaderResource);
        }
        Ok(())
    }

    fn try_process_scene_object(
        &mut self,
        _ctx: &mut RenderContext,
        id: SceneObjectId,
        object: &SceneObject,
    ) -> bool {
        match object {
            SceneObject::Primitive(primitive) => {
                self.primitives.insert(id, primitive.clone());
                true
            }
            SceneObject::Camera(camera) => {
                self.camera = *camera;
                true
            }
            _ => false,
        }
    }

    fn finish_process_scene_object(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let constants = FrameConstants {
            view_projection: self.camera.view_projection().to_cols_array_2d(),
        };
        let gpu = self.gpu();
        ctx.memory
            .upload_buffer_data(&gpu.frame_constants, 0, bytemuck::bytes_of(&constants))
    }

    fn destroy(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        if let Some(gpu) = self.gpu.take() {
            ctx.memory.release_buffer(&gpu.frame_constants);
        }
        self.primitives.clear();
        Ok(())
    }

    fn descriptor_heap(&self) -> Option<&DescriptorHeap> {
        self.gpu.as_ref().map(|gpu| &gpu.heap)
    }
}

impl std::fmt::Debug for GBufferPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GBufferPass")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("primitives", &self.primitives.len())
            .field("initialized", &self.gpu.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;
    use crate::mesh::{Mesh, PrimitiveTopology};
    use crate::pass::RenderPass;

    #[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Vertex {
        position: [f32; 3],
        normal: [f32; 3],
        uv: [f32; 2],
    }

    fn create_test_context() -> RenderContext {
        let instance = GraphicsInstance::new().unwrap();
        RenderContext::new(instance.create_device().unwrap())
    }

    fn test_pass() -> GBufferPass {
        GBufferPass::new(
            128,
            128,
            ShaderBlob::vertex(b"vs".to_vec(), "main"),
            ShaderBlob::fragment(b"fs".to_vec(), "main"),
        )
    }

    fn triangle(ctx: &mut RenderContext) -> Arc<Mesh> {
        let vertices = [
            Vertex { position: [0.0, 0.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 0.0] },
            Vertex { position: [1.0, 0.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [1.0, 0.0] },
            Vertex { position: [0.0, 1.0, 0.0], normal: [0.0, 0.0, 1.0], uv: [0.0, 1.0] },
        ];
        Arc::new(
            Mesh::from_vertices(
                &mut ctx.memory,
                VertexLayout::position_normal_uv(),
                PrimitiveTopology::TriangleList,
                &vertices,
                Some(&[0u32, 1, 2]),
                Some("triangle"),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_exports_gbuffer_targets() {
        let declaration = test_pass().declare_resources();
        let ids: Vec<_> = declaration.exports.iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            vec![
                ResourceTableId::BasePassAlbedo,
                ResourceTableId::BasePassNormal,
                ResourceTableId::Depth,
            ]
        );
        assert!(declaration.imports.is_empty());
    }

    #[test]
    fn test_frame_records_draws() {
        let mut ctx = create_test_context();
        let mut pass = RenderPass::new(test_pass());
        pass.init_resource_table(&mut ctx).unwrap();
        pass.init_render_interface(&mut ctx).unwrap();
        pass.init_pass(&mut ctx).unwrap();

        let mesh = triangle(&mut ctx);
        let mut scene = crate::scene::SceneView::new();
        let id = scene.add(SceneObject::Primitive(Primitive::new(mesh)));
        let object = scene.object(id).unwrap().clone();
        pass.try_process_scene_object(&mut ctx, id, &object);
        pass.finish_process_scene_object(&mut ctx).unwrap();

        pass.pre_render(&mut ctx).unwrap();
        pass.render(&mut ctx).unwrap();
        pass.post_render(&mut ctx).unwrap();

        let commands = ctx.recorder.finish();
        let draws = commands
            .iter()
            .filter(|c| matches!(c, crate::commands::GpuCommand::DrawIndexed { .. }))
            .count();
        assert_eq!(draws, 1);
    }

    #[test]
    fn test_exported_targets_end_as_shader_resources() {
        let mut ctx = create_test_context();
        let mut pass = RenderPass::new(test_pass());
        pass.init_resource_table(&mut ctx).unwrap();
        pass.init_render_interface(&mut ctx).unwrap();
        pass.init_pass(&mut ctx).unwrap();

        pass.pre_render(&mut ctx).unwrap();
        pass.render(&mut ctx).unwrap();
        pass.post_render(&mut ctx).unwrap();
        let _ = ctx.recorder.finish();

        let albedo = ctx
            .resources
            .texture(ResourceTableId::BasePassAlbedo, ctx.back_buffer_index())
            .unwrap();
        assert_eq!(albedo.current_state(), ResourceState::ShaderResource);
    }
}

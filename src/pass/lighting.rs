//! Deferred lighting pass.
//!
//! Imports the G-buffer targets, accumulates scene lights over a fullscreen
//! triangle and exports the lit result. Lights are collected from scene
//! updates into a structured buffer; the light count rides in root constants.
//!
//! The descriptor heap is repopulated every frame: its SRVs must point at the
//! G-buffer instances of the back buffer being rendered.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use crate::binding::{
    DescriptorBinding, DescriptorHeap, DescriptorView, RootSignature, RootSignatureAllocation,
    RootSignatureBuilder,
};
use crate::commands::ColorAttachment;
use crate::context::RenderContext;
use crate::error::GraphicsError;
use crate::mesh::{Mesh, PrimitiveTopology, VertexLayout};
use crate::pipeline_state::{BlendState, PipelineState, PipelineStateDesc, ShaderBlob};
use crate::resources::Buffer;
use crate::scene::{SceneObject, SceneObjectId};
use crate::state::ResourceState;
use crate::types::{
    AddressMode, BufferDescriptor, BufferUsage, FilterMode, ScissorRect, TextureDescriptor,
    TextureFormat, Viewport,
};

use super::{PassBehavior, PassKind, PassResourceDeclaration, ResourceTableId};

/// Maximum lights per frame; extra lights are dropped with a warning.
pub const MAX_LIGHTS: usize = 64;

/// A light in the shader-visible list.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuLight {
    /// xyz = position, w = radius.
    position_radius: [f32; 4],
    /// xyz = linear color, w = intensity.
    color_intensity: [f32; 4],
    /// xyz = direction, w = 0 for point lights, 1 for directional.
    direction_kind: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct FullscreenVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

struct LightingBindings {
    albedo: RootSignatureAllocation,
    normal: RootSignatureAllocation,
    depth: RootSignatureAllocation,
    lights: RootSignatureAllocation,
    light_count: RootSignatureAllocation,
}

struct LightingGpu {
    root_signature: Arc<RootSignature>,
    heap: DescriptorHeap,
    pipeline: Arc<PipelineState>,
    lights_buffer: Arc<Buffer>,
    fullscreen: Mesh,
}

/// Fullscreen deferred lighting over the G-buffer.
///
/// Imports [`ResourceTableId::BasePassAlbedo`],
/// [`ResourceTableId::BasePassNormal`] and [`ResourceTableId::Depth`];
/// exports [`ResourceTableId::LightingPassOutput`].
pub struct DeferredLightingPass {
    width: u32,
    height: u32,
    vertex_shader: ShaderBlob,
    fragment_shader: ShaderBlob,

    builder: Option<RootSignatureBuilder>,
    bindings: Option<LightingBindings>,
    gpu: Option<LightingGpu>,

    lights: HashMap<SceneObjectId, GpuLight>,
}

impl DeferredLightingPass {
    /// Target format of the lighting accumulation export.
    pub const OUTPUT_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

    /// Create a lighting pass rendering at the given resolution.
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
            bindings: None,
            gpu: None,
            lights: HashMap::new(),
        }
    }

    /// Number of collected lights.
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// The pass's root signature, once initialized.
    pub fn root_signature(&self) -> Option<&Arc<RootSignature>> {
        self.gpu.as_ref().map(|gpu| &gpu.root_signature)
    }

    fn gpu(&self) -> &LightingGpu {
        self.gpu.as_ref().expect("deferred_lighting pass not initialized")
    }

    fn bindings(&self) -> &LightingBindings {
        self.bindings
            .as_ref()
            .expect("deferred_lighting pass not initialized")
    }
}

impl PassBehavior for DeferredLightingPass {
    fn name(&self) -> &str {
        "deferred_lighting"
    }

    fn kind(&self) -> PassKind {
        PassKind::Graphics
    }

    fn declare_resources(&self) -> PassResourceDeclaration {
        PassResourceDeclaration::new()
            .import(ResourceTableId::BasePassAlbedo)
            .import(ResourceTableId::BasePassNormal)
            .import(ResourceTableId::Depth)
            .export(
                ResourceTableId::LightingPassOutput,
                TextureDescriptor::render_target(self.width, self.height, Self::OUTPUT_FORMAT),
            )
    }

    fn init_render_interface(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let mut builder = RootSignatureBuilder::new("deferred_lighting");
        let albedo = builder.add_srv_root_parameter("ALBEDO_TEXTURE", 0);
        let normal = builder.add_srv_root_parameter("NORMAL_TEXTURE", 0);
        let depth = builder.add_srv_root_parameter("DEPTH_TEXTURE", 0);
        let lights = builder.add_srv_root_parameter("LIGHT_LIST", 0);
        builder.add_static_sampler(
            "POINT_SAMPLER",
            AddressMode::ClampToEdge,
            FilterMode::Nearest,
            0,
        );
        let light_count = builder.add_constant_root_parameter("LIGHT_COUNT", 1, 0);

        self.bindings = Some(LightingBindings {
            albedo,
            normal,
            depth,
            lights,
            light_count,
        });
        self.builder = Some(builder);
        Ok(())
    }

    fn init_pass(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let builder = self
            .builder
            .take()
            .expect("init_render_interface must run before init_pass");
        let root_signature = Arc::new(builder.build());

        let heap = DescriptorHeap::new("deferred_lighting", PassKind::Graphics);

        let lights_buffer = ctx.memory.allocate_buffer(
            &BufferDescriptor::upload(
                (MAX_LIGHTS * mem::size_of::<GpuLight>()) as u64,
                BufferUsage::STORAGE,
            )
            .with_label("deferred_lighting_lights"),
        )?;

        // Oversized triangle covering the screen; UVs run past 1 off-screen.
        let vertices = [
            FullscreenVertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0] },
            FullscreenVertex { position: [3.0, -1.0, 0.0], uv: [2.0, 1.0] },
            FullscreenVertex { position: [-1.0, 3.0, 0.0], uv: [0.0, -1.0] },
        ];
        let fullscreen = Mesh::from_vertices(
            &mut ctx.memory,
            VertexLayout::position_uv(),
            PrimitiveTopology::TriangleList,
            &vertices,
            None,
            Some("fullscreen_triangle"),
        )?;

        let pipeline = ctx.device.create_pipeline_state(
            &PipelineStateDesc::new(Arc::clone(&root_signature))
                .with_shader(self.vertex_shader.clone())
                .with_shader(self.fragment_shader.clone())
                .with_vertex_layout(VertexLayout::position_uv())
                .with_blend_state(BlendState::additive())
                .with_color_format(Self::OUTPUT_FORMAT)
                .with_label("deferred_lighting"),
        )?;

        self.gpu = Some(LightingGpu {
            root_signature,
            heap,
            pipeline,
            lights_buffer,
            fullscreen,
        });
        Ok(())
    }

    fn pre_render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let index = ctx.back_buffer_index();
        let albedo = ctx.resources.texture(ResourceTableId::BasePassAlbedo, index)?;
        let normal = ctx.resources.texture(ResourceTableId::BasePassNormal, index)?;
        let depth = ctx.resources.texture(ResourceTableId::Depth, index)?;
        let output = ctx
            .resources
            .texture(ResourceTableId::LightingPassOutput, index)?;

        // Usually no-ops; the G-buffer pass leaves its targets readable.
        ctx.recorder.transition_texture(&albedo, ResourceState::ShaderResource);
        ctx.recorder.transition_texture(&normal, ResourceState::ShaderResource);
        ctx.recorder.transition_texture(&depth, ResourceState::ShaderResource);

        let light_count = self.lights.len().min(MAX_LIGHTS) as u32;
        let bindings = self
            .bindings
            .as_ref()
            .expect("deferred_lighting pass not initialized");
        let gpu = self
            .gpu
            .as_mut()
            .expect("deferred_lighting pass not initialized");

        ctx.recorder
            .transition_buffer(&gpu.lights_buffer, ResourceState::ShaderResource);
        for buffer in gpu.fullscreen.vertex_buffers() {
            ctx.recorder
                .transition_buffer(buffer, ResourceState::VertexAndConstantBuffer);
        }

        // The heap views last frame's back buffer; repopulate for this one.
        gpu.heap.clear();
        gpu.heap.allocate(DescriptorView::srv(Arc::clone(&albedo)))?;
        gpu.heap.allocate(DescriptorView::srv(Arc::clone(&normal)))?;
        gpu.heap.allocate(DescriptorView::srv(Arc::clone(&depth)))?;
        gpu.heap
            .allocate(DescriptorView::StructuredBuffer(Arc::clone(&gpu.lights_buffer)))?;

        ctx.recorder.begin_render_targets(
            vec![ColorAttachment::clear(output, 0.0, 0.0, 0.0, 1.0)],
            None,
            Viewport::from_dimensions(self.width, self.height),
            ScissorRect::from_dimensions(self.width, self.height),
        );

        ctx.recorder.bind_pipeline(&gpu.pipeline);
        ctx.recorder.bind_descriptors(vec![
            DescriptorBinding {
                register: bindings.albedo.register_index,
                space: bindings.albedo.space,
                view: DescriptorView::srv(albedo),
            },
            DescriptorBinding {
                register: bindings.normal.register_index,
                space: bindings.normal.space,
                view: DescriptorView::srv(normal),
            },
            DescriptorBinding {
                register: bindings.depth.register_index,
                space: bindings.depth.space,
                view: DescriptorView::srv(depth),
            },
            DescriptorBinding {
                register: bindings.lights.register_index,
                space: bindings.lights.space,
                view: DescriptorView::StructuredBuffer(Arc::clone(&gpu.lights_buffer)),
            },
        ]);
        ctx.recorder.set_root_constants(
            bindings.light_count.register_index,
            bindings.light_count.space,
            &[light_count],
        );
        Ok(())
    }

    fn render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let gpu = self.gpu();
        for (slot, buffer) in gpu.fullscreen.vertex_buffers().iter().enumerate() {
            ctx.recorder.bind_vertex_buffer(slot as u32, buffer, 0);
        }
        ctx.recorder.draw(gpu.fullscreen.vertex_count(), 1);
        Ok(())
    }

    fn post_render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        ctx.recorder.end_render_targets();

        let output = ctx
            .resources
            .texture(ResourceTableId::LightingPassOutput, ctx.back_buffer_index())?;
        ctx.recorder
            .transition_texture(&output, ResourceState::ShaderResource);
        Ok(())
    }

    fn try_process_scene_object(
        &mut self,
        _ctx: &mut RenderContext,
        id: SceneObjectId,
        object: &SceneObject,
    ) -> bool {
        match object {
            SceneObject::PointLight(light) => {
                self.lights.insert(
                    id,
                    GpuLight {
                        position_radius: [
                            light.position.x,
                            light.position.y,
                            light.position.z,
                            light.radius,
                        ],
                        color_intensity: [
                            light.color.x,
                            light.color.y,
                            light.color.z,
                            light.intensity,
                        ],
                        direction_kind: [0.0, 0.0, 0.0, 0.0],
                    },
                );
                true
            }
            SceneObject::DirectionalLight(light) => {
                self.lights.insert(
                    id,
                    GpuLight {
                        position_radius: [0.0, 0.0, 0.0, 0.0],
                        color_intensity: [
                            light.color.x,
                            light.color.y,
                            light.color.z,
                            light.intensity,
                        ],
                        direction_kind: [
                            light.direction.x,
                            light.direction.y,
                            light.direction.z,
                            1.0,
                        ],
                    },
                );
                true
            }
            _ => false,
        }
    }

    fn finish_process_scene_object(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        if self.lights.len() > MAX_LIGHTS {
            log::warn!(
                "deferred_lighting: {} lights exceed the {MAX_LIGHTS} limit, extras dropped",
                self.lights.len()
            );
        }

        let list: Vec<GpuLight> = self.lights.values().take(MAX_LIGHTS).copied().collect();
        if list.is_empty() {
            return Ok(());
        }
        let gpu = self.gpu();
        ctx.memory
            .upload_buffer_data(&gpu.lights_buffer, 0, bytemuck::cast_slice(&list))
    }

    fn destroy(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        if let Some(gpu) = self.gpu.take() {
            ctx.memory.release_buffer(&gpu.lights_buffer);
            for buffer in gpu.fullscreen.vertex_buffers() {
                ctx.memory.release_buffer(buffer);
            }
        }
        self.lights.clear();
        Ok(())
    }

    fn descriptor_heap(&self) -> Option<&DescriptorHeap> {
        self.gpu.as_ref().map(|gpu| &gpu.heap)
    }
}

impl std::fmt::Debug for DeferredLightingPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredLightingPass")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("lights", &self.lights.len())
            .field("initialized", &self.gpu.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;
    use crate::scene::PointLight;

    fn create_test_context() -> RenderContext {
        let instance = GraphicsInstance::new().unwrap();
        RenderContext::new(instance.create_device().unwrap())
    }

    fn test_pass() -> DeferredLightingPass {
        DeferredLightingPass::new(
            128,
            128,
            ShaderBlob::vertex(b"vs".to_vec(), "main"),
            ShaderBlob::fragment(b"fs".to_vec(), "main"),
        )
    }

    #[test]
    fn test_declares_gbuffer_imports() {
        let declaration = test_pass().declare_resources();
        assert_eq!(
            declaration.imports,
            vec![
                ResourceTableId::BasePassAlbedo,
                ResourceTableId::BasePassNormal,
                ResourceTableId::Depth,
            ]
        );
        assert_eq!(declaration.exports.len(), 1);
        assert_eq!(
            declaration.exports[0].0,
            ResourceTableId::LightingPassOutput
        );
    }

    #[test]
    fn test_init_fails_without_gbuffer_exports() {
        let mut ctx = create_test_context();
        let mut pass = crate::pass::RenderPass::new(test_pass());
        // Nothing exported the G-buffer targets.
        let result = pass.init_resource_table(&mut ctx);
        assert!(matches!(result, Err(GraphicsError::ResourceContract(_))));
    }

    #[test]
    fn test_light_collection() {
        let mut ctx = create_test_context();
        let mut pass = test_pass();

        let mut scene = crate::scene::SceneView::new();
        let a = scene.add(SceneObject::PointLight(PointLight::default()));
        let b = scene.add(SceneObject::PointLight(PointLight {
            intensity: 2.0,
            ..PointLight::default()
        }));

        for (id, object) in [(a, scene.object(a)), (b, scene.object(b))] {
            assert!(pass.try_process_scene_object(&mut ctx, id, object.unwrap()));
        }
        assert_eq!(pass.light_count(), 2);

        // Re-processing the same id replaces, not duplicates.
        let object = scene.object(a).unwrap().clone();
        pass.try_process_scene_object(&mut ctx, a, &object);
        assert_eq!(pass.light_count(), 2);
    }

    #[test]
    fn test_rejects_non_light_objects() {
        let mut ctx = create_test_context();
        let mut pass = test_pass();
        let mut scene = crate::scene::SceneView::new();
        let id = scene.add(SceneObject::Camera(crate::scene::Camera::default()));
        let object = scene.object(id).unwrap().clone();
        assert!(!pass.try_process_scene_object(&mut ctx, id, &object));
    }
}

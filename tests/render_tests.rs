//! Integration tests for the frame loop, resource contracts and the
//! deferred pass chain.
//!
//! CPU-visible behavior (copy round-trips, fence pacing, descriptor heap
//! contents) is asserted on the dummy backend; tests that touch the raw
//! backend API are parameterized over every compiled-in backend and skip
//! the rest.

mod common;

use std::sync::Arc;

use rstest::rstest;

use common::{
    dummy_context, dummy_context_with, stub_gbuffer_pass, stub_lighting_pass, Backend,
};
use vermilion_graphics::binding::DescriptorView;
use vermilion_graphics::error::GraphicsError;
use vermilion_graphics::mesh::{Mesh, PrimitiveTopology, VertexLayout};
use vermilion_graphics::pass::{RenderPass, RenderPassManager, ResourceTableId};
use vermilion_graphics::pipeline::FramePipeline;
use vermilion_graphics::scene::{Camera, PointLight, Primitive, SceneObject, SceneView};
use vermilion_graphics::state::ResourceState;
use vermilion_graphics::types::{BufferDescriptor, BufferUsage};

#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct Vertex {
    position: [f32; 3],
    normal: [f32; 3],
    uv: [f32; 2],
}

fn triangle(ctx: &mut vermilion_graphics::RenderContext) -> Arc<Mesh> {
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

// ---------------------------------------------------------------------------
// Backend resource paths
// ---------------------------------------------------------------------------

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_fence_create_and_wait(#[case] backend: Backend) {
    let Some(device) = common::test_device(backend) else {
        return;
    };
    let fence = device.create_fence(true).unwrap();
    assert!(fence.is_signaled());
    fence.wait();
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
#[case::webgpu(Backend::WebGpu)]
fn test_buffer_write_survives_frame(#[case] backend: Backend) {
    let Some(device) = common::test_device(backend) else {
        return;
    };
    let mut ctx = vermilion_graphics::RenderContext::new(device);

    let src = ctx
        .memory
        .allocate_buffer(
            &BufferDescriptor::upload(64, BufferUsage::COPY_SRC).with_label("copy_src"),
        )
        .unwrap();
    ctx.memory
        .upload_buffer_data(&src, 0, &[0xA5u8; 64])
        .unwrap();

    ctx.begin_frame();
    ctx.end_frame().unwrap();

    // The upload is host-side; the frame boundary must not disturb it.
    let bytes = ctx.device.backend().read_buffer(src.gpu_handle(), 0, 64);
    if backend == Backend::Dummy {
        assert_eq!(bytes, vec![0xA5u8; 64]);
    } else {
        assert_eq!(bytes.len(), 64);
    }
}

#[test]
fn test_copy_roundtrip_through_frame() {
    let mut ctx = dummy_context();

    let src = ctx
        .memory
        .allocate_buffer(
            &BufferDescriptor::upload(32, BufferUsage::COPY_SRC).with_label("staging"),
        )
        .unwrap();
    let dst = ctx
        .memory
        .allocate_buffer(
            &BufferDescriptor::readback(32).with_label("readback"),
        )
        .unwrap();

    let payload: Vec<u8> = (0..32).collect();
    ctx.memory.upload_buffer_data(&src, 0, &payload).unwrap();

    ctx.begin_frame();
    ctx.recorder.transition_buffer(&src, ResourceState::CopySource);
    ctx.recorder.transition_buffer(&dst, ResourceState::CopyDest);
    ctx.recorder.copy_buffer_to_buffer(&src, 0, &dst, 0, 32);
    ctx.end_frame().unwrap();

    let bytes = ctx.device.backend().read_buffer(dst.gpu_handle(), 0, 32);
    assert_eq!(bytes, payload);
}

// ---------------------------------------------------------------------------
// Resource contracts
// ---------------------------------------------------------------------------

#[test]
fn test_lighting_without_gbuffer_fails_validation() {
    let mut ctx = dummy_context();
    let mut manager = RenderPassManager::new();
    manager.add_render_pass(RenderPass::new(stub_lighting_pass(64, 64)));

    let err = manager.init_all_passes(&mut ctx).unwrap_err();
    assert!(matches!(err, GraphicsError::ResourceContract(_)));
    assert!(err.to_string().contains("deferred_lighting"));
}

#[test]
fn test_passes_in_wrong_order_fail_validation() {
    let mut ctx = dummy_context();
    let mut manager = RenderPassManager::new();
    manager.add_render_pass(RenderPass::new(stub_lighting_pass(64, 64)));
    manager.add_render_pass(RenderPass::new(stub_gbuffer_pass(64, 64)));

    let err = manager.init_all_passes(&mut ctx).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("deferred_lighting"));
    assert!(message.contains("g_buffer"));
}

// ---------------------------------------------------------------------------
// Temp upload pacing
// ---------------------------------------------------------------------------

#[test]
fn test_temp_buffer_not_reused_while_frames_in_flight() {
    let mut ctx = dummy_context();
    let first = ctx.memory.allocate_temp_upload_buffer(128).unwrap();

    for _ in 0..2 {
        ctx.begin_frame();
        ctx.end_frame().unwrap();
    }

    // Two frames in, a submission could still reference the buffer.
    let second = ctx.memory.allocate_temp_upload_buffer(128).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));

    ctx.begin_frame();
    ctx.end_frame().unwrap();

    // Third tick frees the first allocation.
    let third = ctx.memory.allocate_temp_upload_buffer(128).unwrap();
    assert!(Arc::ptr_eq(&first, &third));
}

// ---------------------------------------------------------------------------
// Frame pacing
// ---------------------------------------------------------------------------

#[test]
fn test_slot_reuse_blocks_on_unsignaled_fence() {
    let device = common::test_device(Backend::Dummy).unwrap();
    let mut pipeline = FramePipeline::new(2);

    // Fill both slots; the first frame's fence never signals.
    let pending = device.create_fence(false).unwrap();
    pipeline.begin_frame();
    pipeline.end_frame(pending.clone());
    pipeline.begin_frame();
    pipeline.end_frame(device.create_fence(true).unwrap());

    let timeout = std::time::Duration::from_millis(10);
    assert!(!pipeline.begin_frame_timeout(timeout));

    pending.signal();
    assert!(pipeline.begin_frame_timeout(timeout));
    assert_eq!(pipeline.frame_count(), 3);
}

#[test]
fn test_frame_loop_paces_without_stalling() {
    let mut ctx = dummy_context_with(3, 2);
    assert_eq!(ctx.back_buffer_count(), 3);

    // The dummy backend signals at submit, so every slot reuse succeeds.
    for frame in 0..6u64 {
        assert_eq!(ctx.back_buffer_index(), (frame % 3) as usize);
        ctx.begin_frame();
        ctx.end_frame().unwrap();
    }
    assert_eq!(ctx.frame_count(), 6);
    assert_eq!(ctx.frame_pipeline().current_slot(), 0);
    assert!(ctx.frame_pipeline().is_idle());
}

// ---------------------------------------------------------------------------
// Deferred chain end to end
// ---------------------------------------------------------------------------

fn deferred_manager() -> RenderPassManager {
    let mut manager = RenderPassManager::new();
    manager.add_render_pass(RenderPass::new(stub_gbuffer_pass(128, 128)));
    manager.add_render_pass(RenderPass::new(stub_lighting_pass(128, 128)));
    manager
}

fn assert_heap_matches_back_buffer(
    ctx: &vermilion_graphics::RenderContext,
    manager: &RenderPassManager,
    index: usize,
) {
    let heap = manager
        .find("deferred_lighting")
        .and_then(|pass| pass.descriptor_heap())
        .expect("lighting heap");

    let expected = [
        ResourceTableId::BasePassAlbedo,
        ResourceTableId::BasePassNormal,
        ResourceTableId::Depth,
    ];
    for (view, id) in heap.views().iter().zip(expected) {
        let DescriptorView::ShaderResource { texture, .. } = view else {
            panic!("expected an SRV for {id:?}, got {view:?}");
        };
        let exported = ctx.resources.texture(id, index).unwrap();
        assert!(
            Arc::ptr_eq(texture, &exported),
            "{id:?} SRV does not view back buffer {index}"
        );
    }
}

#[test]
fn test_deferred_chain_renders_one_frame() {
    let mut ctx = dummy_context_with(3, 2);
    let mut manager = deferred_manager();
    manager.init_all_passes(&mut ctx).unwrap();

    // The G-buffer exports and the lighting imports all landed.
    for id in [
        ResourceTableId::BasePassAlbedo,
        ResourceTableId::BasePassNormal,
        ResourceTableId::Depth,
        ResourceTableId::LightingPassOutput,
    ] {
        assert!(ctx.resources.contains(id));
    }

    let mesh = triangle(&mut ctx);
    let mut scene = SceneView::new();
    scene.add(SceneObject::Primitive(Primitive::new(mesh)));
    scene.add(SceneObject::Camera(Camera::default()));
    scene.add(SceneObject::PointLight(PointLight::default()));
    manager.update_scene(&mut ctx, &mut scene, 0.016).unwrap();

    ctx.begin_frame();
    manager.render_all_passes(&mut ctx, 0.016).unwrap();
    let index = ctx.back_buffer_index();
    assert_heap_matches_back_buffer(&ctx, &manager, index);
    ctx.end_frame().unwrap();

    manager.exit_all_passes(&mut ctx).unwrap();
}

#[test]
fn test_lighting_heap_follows_back_buffer_rotation() {
    let mut ctx = dummy_context_with(3, 2);
    let mut manager = deferred_manager();
    manager.init_all_passes(&mut ctx).unwrap();

    let mut scene = SceneView::new();
    scene.add(SceneObject::PointLight(PointLight::default()));
    manager.update_scene(&mut ctx, &mut scene, 0.016).unwrap();

    for frame in 0..3 {
        ctx.begin_frame();
        manager.render_all_passes(&mut ctx, 0.016).unwrap();
        let index = ctx.back_buffer_index();
        assert_eq!(index, frame % 3);
        // Repopulated each frame, never stale.
        assert_heap_matches_back_buffer(&ctx, &manager, index);
        ctx.end_frame().unwrap();
    }
}

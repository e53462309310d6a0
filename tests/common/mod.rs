//! Shared fixtures for the integration tests.
//!
//! Tests that only exercise CPU-side machinery run against every backend the
//! build carries; tests that create pipelines from stub bytecode stay on the
//! dummy backend, which accepts any blob.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::sync::Arc;

use vermilion_graphics::context::RenderContext;
use vermilion_graphics::device::GraphicsDevice;
use vermilion_graphics::instance::{BackendPreference, GraphicsInstance, InstanceParameters};
use vermilion_graphics::pass::{DeferredLightingPass, GBufferPass};
use vermilion_graphics::pipeline_state::ShaderBlob;

/// Backends the integration tests can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend, always available, executes nothing.
    Dummy,
    /// Native Vulkan via ash.
    Vulkan,
    /// wgpu over whatever it finds.
    WebGpu,
}

impl Backend {
    /// Check whether this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            Backend::Vulkan => cfg!(feature = "vulkan-backend"),
            Backend::WebGpu => cfg!(feature = "wgpu-backend"),
        }
    }

    fn to_instance_parameters(self) -> InstanceParameters {
        match self {
            Backend::Dummy => InstanceParameters::new().with_backend(BackendPreference::Dummy),
            // Auto picks the best compiled-in native backend.
            Backend::Vulkan | Backend::WebGpu => {
                InstanceParameters::new().with_backend(BackendPreference::Auto)
            }
        }
    }
}

/// Create a device on the given backend, or `None` when it is unavailable.
pub fn test_device(backend: Backend) -> Option<Arc<GraphicsDevice>> {
    let _ = env_logger::builder().is_test(true).try_init();
    if !backend.is_available() {
        eprintln!("backend {backend:?} not available, skipping");
        return None;
    }
    let instance = GraphicsInstance::with_parameters(backend.to_instance_parameters()).ok()?;
    instance.create_device().ok()
}

/// Render context on the dummy backend with default pacing.
pub fn dummy_context() -> RenderContext {
    RenderContext::new(test_device(Backend::Dummy).expect("dummy backend"))
}

/// Render context on the dummy backend with explicit pacing.
#[allow(dead_code)]
pub fn dummy_context_with(back_buffer_count: usize, frames_in_flight: usize) -> RenderContext {
    RenderContext::with_config(
        test_device(Backend::Dummy).expect("dummy backend"),
        back_buffer_count,
        frames_in_flight,
    )
}

/// Stub vertex shader blob; only the dummy backend accepts it.
pub fn stub_vertex_shader() -> ShaderBlob {
    ShaderBlob::vertex(b"vs_stub".to_vec(), "main")
}

/// Stub fragment shader blob; only the dummy backend accepts it.
pub fn stub_fragment_shader() -> ShaderBlob {
    ShaderBlob::fragment(b"fs_stub".to_vec(), "main")
}

/// G-buffer pass with stub shaders.
#[allow(dead_code)]
pub fn stub_gbuffer_pass(width: u32, height: u32) -> GBufferPass {
    GBufferPass::new(width, height, stub_vertex_shader(), stub_fragment_shader())
}

/// Deferred lighting pass with stub shaders.
#[allow(dead_code)]
pub fn stub_lighting_pass(width: u32, height: u32) -> DeferredLightingPass {
    DeferredLightingPass::new(width, height, stub_vertex_shader(), stub_fragment_shader())
}

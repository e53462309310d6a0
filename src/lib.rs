//! # Vermilion Graphics
//!
//! Rendering engine core built around an explicit render-pass pipeline.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderContext`] - Per-frame device, memory, resource-table and
//!   command-recording state with frames-in-flight pacing
//! - [`pass`] - Render passes with declared resource contracts, driven by
//!   [`RenderPassManager`]
//! - [`binding`] - Root signatures and descriptor heaps with a generated
//!   shader register contract
//! - [`vt`] - Feedback-driven virtual texture streaming
//! - Multiple backend support: Vulkan, wgpu, and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use vermilion_graphics::{GraphicsInstance, RenderContext, RenderPassManager};
//!
//! let instance = GraphicsInstance::new()?;
//! let mut ctx = RenderContext::new(instance.create_device()?);
//! let mut manager = RenderPassManager::new();
//! // Add passes, init, then per frame:
//! ctx.begin_frame();
//! manager.render_all_passes(&mut ctx, delta_time)?;
//! ctx.end_frame()?;
//! ```

pub mod backend;
pub mod binding;
pub mod commands;
pub mod context;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
pub mod mesh;
pub mod pass;
pub mod pipeline;
pub mod pipeline_state;
pub mod resources;
pub mod scene;
pub mod scheduler;
pub mod state;
pub mod swapchain;
pub mod types;
pub mod vt;

// Re-export main types for convenience
pub use backend::dummy::DummyBackend;
pub use backend::GpuBackend;
pub use binding::{DescriptorHeap, RootSignature, RootSignatureBuilder};
pub use commands::CommandRecorder;
pub use context::RenderContext;
pub use device::GraphicsDevice;
pub use error::GraphicsError;
pub use instance::GraphicsInstance;
pub use memory::MemoryManager;
pub use pass::{
    DeferredLightingPass, GBufferPass, PassBehavior, RenderPass, RenderPassManager,
    ResourceTable, ResourceTableId,
};
pub use scene::{SceneObject, SceneObjectId, SceneView};
pub use types::{
    BufferDescriptor, BufferUsage, ClearValue, Extent3d, SamplerDescriptor, TextureDescriptor,
    TextureFormat, TextureUsage,
};
pub use vt::{VirtualTextureConfig, VirtualTextureSystem};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Vermilion Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = backend::dummy::DummyBackend::new();
        assert_eq!(backend.name(), "Dummy Backend");
    }
}

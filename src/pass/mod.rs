//! Render passes and their execution lifecycle.
//!
//! A [`RenderPass`] wraps a [`PassBehavior`] in a lifecycle state machine:
//!
//! ```text
//! Uninitialized → Initialized → {PreRender → Render → PostRender}* → Destroyed
//! ```
//!
//! Out-of-order transitions are programming errors and panic. Passes declare
//! the shared textures they produce and consume up front
//! ([`PassResourceDeclaration`]); the [`RenderPassManager`] validates the
//! declarations against its schedule before anything is created.

mod gbuffer;
mod lighting;
mod manager;
mod resource_table;

pub use gbuffer::GBufferPass;
pub use lighting::DeferredLightingPass;
pub use manager::RenderPassManager;
pub use resource_table::{ResourceTable, ResourceTableId};

use crate::binding::DescriptorHeap;
use crate::context::RenderContext;
use crate::error::GraphicsError;
use crate::scene::{SceneObject, SceneObjectId};
use crate::types::TextureDescriptor;

/// The queue class a pass records for.
///
/// Fixes the pass's descriptor heap capacity and which recorder operations
/// it may use (render target scopes for graphics, dispatches for compute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Rasterization pass with render target scopes.
    Graphics,
    /// Compute dispatch pass.
    Compute,
    /// Ray tracing pass binding whole-scene resource sets.
    RayTracing,
}

/// Lifecycle state of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PassState {
    /// Created, no GPU objects yet.
    #[default]
    Uninitialized,
    /// Init complete, ready for frames.
    Initialized,
    /// Frame setup recorded.
    PreRender,
    /// Draws/dispatches recorded.
    Render,
    /// Frame teardown recorded, ready for the next frame.
    PostRender,
    /// Torn down, terminal.
    Destroyed,
}

/// The shared textures a pass produces and consumes.
///
/// Declared before init so the manager can check that every import has an
/// earlier exporter without creating anything.
#[derive(Debug, Clone, Default)]
pub struct PassResourceDeclaration {
    /// Textures the pass creates and registers, one set per back buffer.
    pub exports: Vec<(ResourceTableId, TextureDescriptor)>,
    /// Textures the pass reads from earlier passes.
    pub imports: Vec<ResourceTableId>,
}

impl PassResourceDeclaration {
    /// Create an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an exported texture.
    pub fn export(mut self, id: ResourceTableId, descriptor: TextureDescriptor) -> Self {
        self.exports.push((id, descriptor));
        self
    }

    /// Declare an imported texture.
    pub fn import(mut self, id: ResourceTableId) -> Self {
        self.imports.push(id);
        self
    }
}

/// The semantics of a render pass.
///
/// Implementations own their GPU objects (pipeline state, root signature,
/// descriptor heap); [`RenderPass`] owns the lifecycle. Every method receives
/// the [`RenderContext`] and records through its recorder.
pub trait PassBehavior {
    /// Pass name, used in logs and schedule validation errors.
    fn name(&self) -> &str;

    /// The queue class this pass records for.
    fn kind(&self) -> PassKind;

    /// The shared textures this pass exports and imports.
    fn declare_resources(&self) -> PassResourceDeclaration {
        PassResourceDeclaration::default()
    }

    /// Declare constant/structured buffer bindings on the pass's root
    /// signature builder.
    fn init_render_interface(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Create GPU objects: descriptor heap, root signature, pipeline state,
    /// one-time uploads.
    fn init_pass(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError>;

    /// Record frame setup: transitions, render target scope, per-frame
    /// constants.
    fn pre_render(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Record the pass's draws or dispatches.
    fn render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError>;

    /// Record frame teardown: close scopes, transition outputs for readers.
    fn post_render(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Release GPU objects.
    fn destroy(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// Offer a changed scene object to the pass. Returns `true` if the pass
    /// consumed it (cached per-object GPU data under its id).
    fn try_process_scene_object(
        &mut self,
        _ctx: &mut RenderContext,
        _id: SceneObjectId,
        _object: &SceneObject,
    ) -> bool {
        false
    }

    /// Flush cached scene data to the GPU, once per scene update.
    fn finish_process_scene_object(
        &mut self,
        _ctx: &mut RenderContext,
    ) -> Result<(), GraphicsError> {
        Ok(())
    }

    /// The pass's descriptor heap, for inspection and debugging.
    fn descriptor_heap(&self) -> Option<&DescriptorHeap> {
        None
    }
}

/// A pass behavior wrapped in the lifecycle state machine.
pub struct RenderPass {
    behavior: Box<dyn PassBehavior>,
    declaration: PassResourceDeclaration,
    state: PassState,
}

impl RenderPass {
    /// Wrap a behavior into a pass.
    pub fn new(behavior: impl PassBehavior + 'static) -> Self {
        let behavior = Box::new(behavior);
        let declaration = behavior.declare_resources();
        Self {
            behavior,
            declaration,
            state: PassState::Uninitialized,
        }
    }

    /// The pass name.
    pub fn name(&self) -> &str {
        self.behavior.name()
    }

    /// The queue class the pass records for.
    pub fn kind(&self) -> PassKind {
        self.behavior.kind()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PassState {
        self.state
    }

    /// The pass's resource declaration.
    pub fn declaration(&self) -> &PassResourceDeclaration {
        &self.declaration
    }

    /// The pass's descriptor heap, if it was created.
    pub fn descriptor_heap(&self) -> Option<&DescriptorHeap> {
        self.behavior.descriptor_heap()
    }

    /// Register the pass's exports and resolve its imports in the resource
    /// table.
    ///
    /// # Errors
    ///
    /// Returns an error if an export id is already taken or an import was
    /// never exported.
    ///
    /// # Panics
    ///
    /// Panics if the pass is already initialized.
    pub fn init_resource_table(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        assert_eq!(
            self.state,
            PassState::Uninitialized,
            "pass '{}': init_resource_table in state {:?}",
            self.name(),
            self.state
        );

        for (id, descriptor) in &self.declaration.exports {
            ctx.resources.add_export_texture(*id, descriptor)?;
        }
        for id in &self.declaration.imports {
            ctx.resources.import_texture(*id)?;
        }
        Ok(())
    }

    /// Declare the pass's shader binding interface.
    ///
    /// # Panics
    ///
    /// Panics if the pass is already initialized.
    pub fn init_render_interface(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        assert_eq!(
            self.state,
            PassState::Uninitialized,
            "pass '{}': init_render_interface in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.init_render_interface(ctx)
    }

    /// Create the pass's GPU objects and move to `Initialized`.
    ///
    /// # Panics
    ///
    /// Panics if the pass is already initialized.
    pub fn init_pass(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        assert_eq!(
            self.state,
            PassState::Uninitialized,
            "pass '{}': init_pass in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.init_pass(ctx)?;
        self.state = PassState::Initialized;
        log::info!("pass '{}' initialized", self.name());
        Ok(())
    }

    /// Record frame setup.
    ///
    /// # Panics
    ///
    /// Panics unless the pass is `Initialized` or finished its previous
    /// frame (`PostRender`).
    pub fn pre_render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        assert!(
            matches!(self.state, PassState::Initialized | PassState::PostRender),
            "pass '{}': pre_render in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.pre_render(ctx)?;
        self.state = PassState::PreRender;
        Ok(())
    }

    /// Record the pass's draws or dispatches.
    ///
    /// # Panics
    ///
    /// Panics unless `pre_render` ran this frame.
    pub fn render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        assert_eq!(
            self.state,
            PassState::PreRender,
            "pass '{}': render in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.render(ctx)?;
        self.state = PassState::Render;
        Ok(())
    }

    /// Record frame teardown.
    ///
    /// # Panics
    ///
    /// Panics unless `render` ran this frame.
    pub fn post_render(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        assert_eq!(
            self.state,
            PassState::Render,
            "pass '{}': post_render in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.post_render(ctx)?;
        self.state = PassState::PostRender;
        Ok(())
    }

    /// Offer a changed scene object to the pass.
    ///
    /// # Panics
    ///
    /// Panics if the pass is uninitialized or destroyed.
    pub fn try_process_scene_object(
        &mut self,
        ctx: &mut RenderContext,
        id: SceneObjectId,
        object: &SceneObject,
    ) -> bool {
        assert!(
            !matches!(self.state, PassState::Uninitialized | PassState::Destroyed),
            "pass '{}': scene update in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.try_process_scene_object(ctx, id, object)
    }

    /// Flush cached scene data to the GPU.
    pub fn finish_process_scene_object(
        &mut self,
        ctx: &mut RenderContext,
    ) -> Result<(), GraphicsError> {
        assert!(
            !matches!(self.state, PassState::Uninitialized | PassState::Destroyed),
            "pass '{}': scene update in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.finish_process_scene_object(ctx)
    }

    /// Tear the pass down. Terminal.
    ///
    /// # Panics
    ///
    /// Panics unless the pass is `Initialized` or between frames
    /// (`PostRender`).
    pub fn destroy(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        assert!(
            matches!(self.state, PassState::Initialized | PassState::PostRender),
            "pass '{}': destroy in state {:?}",
            self.name(),
            self.state
        );
        self.behavior.destroy(ctx)?;
        self.state = PassState::Destroyed;
        log::info!("pass '{}' destroyed", self.name());
        Ok(())
    }
}

impl std::fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("name", &self.behavior.name())
            .field("kind", &self.behavior.kind())
            .field("state", &self.state)
            .finish()
    }
}

//! Render pass scheduling and execution.
//!
//! The [`RenderPassManager`] holds passes in execution order: list order is
//! the schedule. Before any pass is initialized, the declared import/export
//! graph is validated so that every import's exporter precedes the importer —
//! an out-of-order or missing exporter is an error naming both passes, caught
//! before a single GPU object exists.

use std::collections::HashMap;

use crate::context::RenderContext;
use crate::error::GraphicsError;
use crate::scene::SceneView;

use super::{RenderPass, ResourceTableId};

/// Owns the pass list and drives every pass through its lifecycle.
#[derive(Debug, Default)]
pub struct RenderPassManager {
    passes: Vec<RenderPass>,
}

impl RenderPassManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass to the schedule.
    pub fn add_render_pass(&mut self, pass: RenderPass) {
        log::info!("schedule[{}]: '{}'", self.passes.len(), pass.name());
        self.passes.push(pass);
    }

    /// Number of scheduled passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if no passes are scheduled.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// The scheduled passes, in execution order.
    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    /// Look up a pass by name.
    pub fn find(&self, name: &str) -> Option<&RenderPass> {
        self.passes.iter().find(|pass| pass.name() == name)
    }

    /// Check that every declared import has an exporter earlier in the list.
    ///
    /// # Errors
    ///
    /// Returns an error naming the importing pass and, when one exists, the
    /// out-of-order exporting pass.
    pub fn validate_schedule(&self) -> Result<(), GraphicsError> {
        let mut exporters: HashMap<ResourceTableId, (usize, &str)> = HashMap::new();
        for (position, pass) in self.passes.iter().enumerate() {
            for (id, _) in &pass.declaration().exports {
                if let Some((_, earlier)) = exporters.insert(*id, (position, pass.name())) {
                    return Err(GraphicsError::ResourceContract(format!(
                        "{id:?} exported by both '{earlier}' and '{}'",
                        pass.name()
                    )));
                }
            }
        }

        for (position, pass) in self.passes.iter().enumerate() {
            for id in &pass.declaration().imports {
                match exporters.get(id) {
                    None => {
                        return Err(GraphicsError::ResourceContract(format!(
                            "pass '{}' imports {id:?}, which no pass exports",
                            pass.name()
                        )));
                    }
                    Some((exporter_position, exporter)) if *exporter_position >= position => {
                        return Err(GraphicsError::ResourceContract(format!(
                            "pass '{}' imports {id:?} before its exporter '{exporter}' runs",
                            pass.name()
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Initialize every pass, in list order.
    ///
    /// Validates the schedule first, then runs each pass's resource table,
    /// render interface and pass init steps.
    pub fn init_all_passes(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        self.validate_schedule()?;

        // List order is the schedule, so every exporter's resource table is
        // registered before its importers look it up.
        for pass in &mut self.passes {
            pass.init_resource_table(ctx)?;
            pass.init_render_interface(ctx)?;
            pass.init_pass(ctx)?;
        }

        log::info!("initialized {} passes", self.passes.len());
        Ok(())
    }

    /// Forward changed scene objects to every pass, then flush.
    ///
    /// Each dirty object is offered to every pass's visitor; afterwards each
    /// pass flushes its cached scene data once and the dirty flags clear.
    pub fn update_scene(
        &mut self,
        ctx: &mut RenderContext,
        scene: &mut SceneView,
        delta_time: f32,
    ) -> Result<(), GraphicsError> {
        ctx.set_delta_time(delta_time);

        for (id, object) in scene.dirty_entries() {
            for pass in &mut self.passes {
                pass.try_process_scene_object(ctx, id, object);
            }
        }
        for pass in &mut self.passes {
            pass.finish_process_scene_object(ctx)?;
        }
        scene.clear_dirty();
        Ok(())
    }

    /// Record one frame: every pass's pre-render, render and post-render, in
    /// list order.
    pub fn render_all_passes(
        &mut self,
        ctx: &mut RenderContext,
        delta_time: f32,
    ) -> Result<(), GraphicsError> {
        ctx.set_delta_time(delta_time);

        for pass in &mut self.passes {
            pass.pre_render(ctx)?;
            pass.render(ctx)?;
            pass.post_render(ctx)?;
        }
        Ok(())
    }

    /// Destroy every pass, in reverse list order.
    pub fn exit_all_passes(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        for pass in self.passes.iter_mut().rev() {
            pass.destroy(ctx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;
    use crate::pass::{PassBehavior, PassKind, PassResourceDeclaration, PassState};
    use crate::types::{TextureDescriptor, TextureFormat};

    struct StubPass {
        name: &'static str,
        declaration: PassResourceDeclaration,
        init_order: std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    impl PassBehavior for StubPass {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> PassKind {
            PassKind::Graphics
        }

        fn declare_resources(&self) -> PassResourceDeclaration {
            self.declaration.clone()
        }

        fn init_pass(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
            self.init_order.lock().unwrap().push(self.name);
            Ok(())
        }

        fn render(&mut self, _ctx: &mut RenderContext) -> Result<(), GraphicsError> {
            Ok(())
        }
    }

    fn create_test_context() -> RenderContext {
        let instance = GraphicsInstance::new().unwrap();
        RenderContext::new(instance.create_device().unwrap())
    }

    fn stub(
        name: &'static str,
        declaration: PassResourceDeclaration,
        order: &std::sync::Arc<std::sync::Mutex<Vec<&'static str>>>,
    ) -> RenderPass {
        RenderPass::new(StubPass {
            name,
            declaration,
            init_order: std::sync::Arc::clone(order),
        })
    }

    fn target() -> TextureDescriptor {
        TextureDescriptor::render_target(64, 64, TextureFormat::Rgba8Unorm)
    }

    #[test]
    fn test_valid_schedule_inits_in_order() {
        let mut ctx = create_test_context();
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut manager = RenderPassManager::new();
        manager.add_render_pass(stub(
            "producer",
            PassResourceDeclaration::new().export(ResourceTableId::Depth, target()),
            &order,
        ));
        manager.add_render_pass(stub(
            "consumer",
            PassResourceDeclaration::new().import(ResourceTableId::Depth),
            &order,
        ));

        manager.init_all_passes(&mut ctx).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["producer", "consumer"]);
        assert!(manager
            .passes()
            .iter()
            .all(|p| p.state() == PassState::Initialized));
    }

    #[test]
    fn test_import_without_exporter_names_importer() {
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = RenderPassManager::new();
        manager.add_render_pass(stub(
            "orphan",
            PassResourceDeclaration::new().import(ResourceTableId::ShadowPassOutput),
            &order,
        ));

        let err = manager.validate_schedule().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("orphan"));
        assert!(message.contains("ShadowPassOutput"));
        assert!(message.contains("no pass exports"));
    }

    #[test]
    fn test_import_before_exporter_names_both_passes() {
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = RenderPassManager::new();
        manager.add_render_pass(stub(
            "early_consumer",
            PassResourceDeclaration::new().import(ResourceTableId::Depth),
            &order,
        ));
        manager.add_render_pass(stub(
            "late_producer",
            PassResourceDeclaration::new().export(ResourceTableId::Depth, target()),
            &order,
        ));

        let err = manager.validate_schedule().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("early_consumer"));
        assert!(message.contains("late_producer"));
    }

    #[test]
    fn test_duplicate_export_names_both_passes() {
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = RenderPassManager::new();
        manager.add_render_pass(stub(
            "first",
            PassResourceDeclaration::new().export(ResourceTableId::Depth, target()),
            &order,
        ));
        manager.add_render_pass(stub(
            "second",
            PassResourceDeclaration::new().export(ResourceTableId::Depth, target()),
            &order,
        ));

        let err = manager.validate_schedule().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("first"));
        assert!(message.contains("second"));
    }

    #[test]
    fn test_exit_runs_in_reverse() {
        let mut ctx = create_test_context();
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut manager = RenderPassManager::new();
        manager.add_render_pass(stub("a", PassResourceDeclaration::new(), &order));
        manager.add_render_pass(stub("b", PassResourceDeclaration::new(), &order));
        manager.init_all_passes(&mut ctx).unwrap();

        manager.exit_all_passes(&mut ctx).unwrap();
        assert!(manager
            .passes()
            .iter()
            .all(|p| p.state() == PassState::Destroyed));
    }

    #[test]
    fn test_find_pass() {
        let order = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut manager = RenderPassManager::new();
        manager.add_render_pass(stub("a", PassResourceDeclaration::new(), &order));
        assert!(manager.find("a").is_some());
        assert!(manager.find("missing").is_none());
    }
}

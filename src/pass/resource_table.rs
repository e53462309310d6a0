//! Shared textures passed between render passes.
//!
//! Passes never hand textures to each other directly. A producer exports a
//! texture under a well-known [`ResourceTableId`]; consumers import the same
//! id. Export happens exactly once and must precede every import — importing
//! an id nobody exported is a deterministic error, never a lazy creation.
//!
//! Each export creates one texture per back buffer, so a pass reading frame
//! N's output never races the pass writing frame N+1's.

use std::collections::HashMap;
use std::sync::Arc;

use crate::device::GraphicsDevice;
use crate::error::GraphicsError;
use crate::resources::Texture;
use crate::types::TextureDescriptor;

/// Well-known identities of textures shared between passes.
///
/// A closed set: pass composition is fixed at build time, so an open string
/// registry would only trade compile errors for runtime typos. Virtual
/// texture ids carry the logical texture index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceTableId {
    /// G-buffer albedo target.
    BasePassAlbedo,
    /// G-buffer normal target.
    BasePassNormal,
    /// Scene depth target.
    Depth,
    /// Shadow map output.
    ShadowPassOutput,
    /// Deferred lighting accumulation target.
    LightingPassOutput,
    /// Ray traced scene output.
    RayTracingSceneOutput,
    /// Screen-space UV offset target.
    ScreenUvOffset,
    /// ReSTIR sample reservoir output.
    RestirSampleOutput,
    /// Virtual texture feedback target for a logical texture.
    VtFeedback(u16),
    /// Virtual texture physical atlas for a logical texture.
    VtPhysical(u16),
    /// Virtual texture page table (indirection) for a logical texture.
    VtPageTable(u16),
}

/// Registry of shared textures, one instance per back buffer.
pub struct ResourceTable {
    device: Arc<GraphicsDevice>,
    back_buffer_count: usize,
    entries: HashMap<ResourceTableId, Vec<Arc<Texture>>>,
}

impl ResourceTable {
    /// Create an empty table.
    pub fn new(device: Arc<GraphicsDevice>, back_buffer_count: usize) -> Self {
        assert!(back_buffer_count > 0, "back_buffer_count must be at least 1");
        Self {
            device,
            back_buffer_count,
            entries: HashMap::new(),
        }
    }

    /// Number of per-id texture instances.
    pub fn back_buffer_count(&self) -> usize {
        self.back_buffer_count
    }

    /// Export a texture: create one instance per back buffer and register
    /// them under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is already exported or creation fails.
    pub fn add_export_texture(
        &mut self,
        id: ResourceTableId,
        descriptor: &TextureDescriptor,
    ) -> Result<(), GraphicsError> {
        if self.entries.contains_key(&id) {
            return Err(GraphicsError::ResourceContract(format!(
                "{id:?} exported twice"
            )));
        }

        let base_label = descriptor
            .label
            .clone()
            .unwrap_or_else(|| format!("{id:?}"));
        let mut textures = Vec::with_capacity(self.back_buffer_count);
        for index in 0..self.back_buffer_count {
            let descriptor = descriptor
                .clone()
                .with_label(format!("{base_label}_{index}"));
            textures.push(self.device.create_texture(&descriptor)?);
        }

        log::trace!(
            "ResourceTable: exported {id:?} ({}x{} {:?}, {} instances)",
            descriptor.size.width,
            descriptor.size.height,
            descriptor.format,
            self.back_buffer_count
        );

        self.entries.insert(id, textures);
        Ok(())
    }

    /// Import a texture set exported by an earlier pass.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` was never exported.
    pub fn import_texture(&self, id: ResourceTableId) -> Result<&[Arc<Texture>], GraphicsError> {
        self.entries
            .get(&id)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                GraphicsError::ResourceContract(format!("{id:?} imported before export"))
            })
    }

    /// The texture instance for one back buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` was never exported.
    ///
    /// # Panics
    ///
    /// Panics if `back_buffer_index` is out of range.
    pub fn texture(
        &self,
        id: ResourceTableId,
        back_buffer_index: usize,
    ) -> Result<Arc<Texture>, GraphicsError> {
        assert!(
            back_buffer_index < self.back_buffer_count,
            "back buffer index {back_buffer_index} out of range ({} back buffers)",
            self.back_buffer_count
        );
        Ok(Arc::clone(&self.import_texture(id)?[back_buffer_index]))
    }

    /// Check whether an id is exported.
    pub fn contains(&self, id: ResourceTableId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of exported ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is exported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every registered texture.
    ///
    /// The caller must have fence-waited GPU work referencing them first.
    pub fn clear(&mut self) {
        log::info!("ResourceTable: releasing {} entries", self.entries.len());
        self.entries.clear();
    }
}

impl std::fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTable")
            .field("entries", &self.entries.len())
            .field("back_buffer_count", &self.back_buffer_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::GraphicsInstance;
    use crate::types::TextureFormat;

    fn create_test_table() -> ResourceTable {
        let instance = GraphicsInstance::new().unwrap();
        ResourceTable::new(instance.create_device().unwrap(), 3)
    }

    fn target_descriptor() -> TextureDescriptor {
        TextureDescriptor::render_target(256, 256, TextureFormat::Rgba8Unorm)
    }

    #[test]
    fn test_export_then_import() {
        let mut table = create_test_table();
        table
            .add_export_texture(ResourceTableId::BasePassAlbedo, &target_descriptor())
            .unwrap();

        let textures = table.import_texture(ResourceTableId::BasePassAlbedo).unwrap();
        assert_eq!(textures.len(), 3);

        // Instances are distinct textures.
        assert!(!Arc::ptr_eq(&textures[0], &textures[1]));
        assert_eq!(
            textures[1].label(),
            Some("BasePassAlbedo_1")
        );
    }

    #[test]
    fn test_import_before_export_is_error() {
        let table = create_test_table();
        let result = table.import_texture(ResourceTableId::Depth);
        assert!(matches!(result, Err(GraphicsError::ResourceContract(_))));
    }

    #[test]
    fn test_double_export_is_error() {
        let mut table = create_test_table();
        table
            .add_export_texture(ResourceTableId::Depth, &target_descriptor())
            .unwrap();
        let result = table.add_export_texture(ResourceTableId::Depth, &target_descriptor());
        assert_eq!(
            result,
            Err(GraphicsError::ResourceContract(
                "Depth exported twice".to_string()
            ))
        );
    }

    #[test]
    fn test_texture_by_back_buffer_index() {
        let mut table = create_test_table();
        table
            .add_export_texture(ResourceTableId::BasePassNormal, &target_descriptor())
            .unwrap();

        let a = table.texture(ResourceTableId::BasePassNormal, 0).unwrap();
        let b = table.texture(ResourceTableId::BasePassNormal, 2).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_back_buffer_panics() {
        let mut table = create_test_table();
        table
            .add_export_texture(ResourceTableId::Depth, &target_descriptor())
            .unwrap();
        let _ = table.texture(ResourceTableId::Depth, 3);
    }

    #[test]
    fn test_vt_ids_are_distinct_per_texture() {
        let mut table = create_test_table();
        table
            .add_export_texture(ResourceTableId::VtPhysical(0), &target_descriptor())
            .unwrap();
        table
            .add_export_texture(ResourceTableId::VtPhysical(1), &target_descriptor())
            .unwrap();
        assert!(table.contains(ResourceTableId::VtPhysical(0)));
        assert!(table.contains(ResourceTableId::VtPhysical(1)));
        assert!(!table.contains(ResourceTableId::VtPhysical(2)));
    }
}

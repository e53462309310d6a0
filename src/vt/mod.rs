//! Virtual texture streaming.
//!
//! Logical textures far larger than GPU memory are split into fixed-size
//! pages. A feedback-driven [`VirtualTextureSystem`] streams requested pages
//! from a page store on a background thread, packs resident pages into one
//! physical atlas under a strict LRU policy, and keeps a per-texture
//! indirection texture pointing every page at its finest resident ancestor.
//!
//! The atlas is published under [`ResourceTableId::VtPhysical`] and each
//! registered texture's indirection data under
//! [`ResourceTableId::VtPageTable`], so render passes import them like any
//! other pass output.

pub mod accessor;
pub mod page;
pub mod page_table;
pub mod physical;
pub mod streamer;

pub use accessor::{write_page_file, FilePageAccessor, InMemoryPageAccessor, PageAccessor};
pub use page::{PageKey, PageRequest, PAGE_SIZE};
pub use page_table::PageTable;
pub use physical::{AtlasSlot, PhysicalTexture};
pub use streamer::{LoadedPage, PageStreamer};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::context::RenderContext;
use crate::error::GraphicsError;
use crate::pass::ResourceTableId;
use crate::resources::Texture;
use crate::state::ResourceState;
use crate::types::{TextureDescriptor, TextureFormat, TextureUsage};

/// Virtual texture tuning knobs.
#[derive(Debug, Clone)]
pub struct VirtualTextureConfig {
    /// Page edge length in texels, without borders.
    pub page_size: u32,
    /// Physical atlas edge length in texels.
    pub texture_size: u32,
    /// Border texels around each page for filtering.
    pub border: u32,
    /// Upper bound on page requests enqueued and loads ingested per tick.
    pub page_process_count_per_frame: usize,
}

impl Default for VirtualTextureConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            texture_size: 2048,
            border: 1,
            page_process_count_per_frame: 16,
        }
    }
}

/// Feedback-driven page streaming over one shared physical atlas.
#[derive(Debug)]
pub struct VirtualTextureSystem {
    config: VirtualTextureConfig,
    physical: PhysicalTexture,
    streamer: PageStreamer,
    tables: HashMap<u16, PageTable>,
}

impl VirtualTextureSystem {
    /// Create the system over a page accessor.
    ///
    /// # Panics
    ///
    /// Panics if the accessor's page byte size does not match the configured
    /// bordered page size.
    pub fn new(config: VirtualTextureConfig, accessor: Box<dyn PageAccessor>) -> Self {
        let physical = PhysicalTexture::new(config.texture_size, config.page_size, config.border);
        assert_eq!(
            accessor.page_byte_size(),
            physical.page_byte_size(),
            "accessor page size does not match {} bytes per bordered page",
            physical.page_byte_size()
        );
        log::info!(
            "virtual texture atlas: {} slots of {} texels",
            physical.capacity(),
            physical.padded_page_size()
        );
        Self {
            config,
            physical,
            streamer: PageStreamer::new(accessor),
            tables: HashMap::new(),
        }
    }

    /// Export the physical atlas texture into the resource table.
    ///
    /// # Errors
    ///
    /// Returns an error on double init or texture creation failure.
    pub fn init(&mut self, ctx: &mut RenderContext) -> Result<(), GraphicsError> {
        let descriptor = TextureDescriptor::new_2d(
            self.config.texture_size,
            self.config.texture_size,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        )
        .with_label("vt_physical_atlas");
        ctx.resources
            .add_export_texture(ResourceTableId::VtPhysical(0), &descriptor)
    }

    /// Register a logical texture and export its indirection texture.
    ///
    /// `texels_per_side` is the mip-0 edge length of the logical texture.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already registered or texture creation
    /// fails.
    ///
    /// # Panics
    ///
    /// Panics if `texels_per_side` is not a power-of-two multiple of the
    /// page size.
    pub fn register_logical_texture(
        &mut self,
        ctx: &mut RenderContext,
        texture_id: u16,
        texels_per_side: u32,
    ) -> Result<(), GraphicsError> {
        assert!(
            texels_per_side % self.config.page_size == 0,
            "logical texture of {texels_per_side} texels is not page-aligned"
        );
        let pages_per_side = texels_per_side / self.config.page_size;
        if self.tables.contains_key(&texture_id) {
            return Err(GraphicsError::InvalidParameter(format!(
                "logical texture {texture_id} registered twice"
            )));
        }

        let descriptor = TextureDescriptor::new_2d(
            pages_per_side,
            pages_per_side,
            TextureFormat::Rgba8Unorm,
            TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        )
        .with_label(format!("vt_page_table_{texture_id}"));
        ctx.resources
            .add_export_texture(ResourceTableId::VtPageTable(texture_id), &descriptor)?;

        self.tables
            .insert(texture_id, PageTable::new(texture_id, pages_per_side));
        log::info!(
            "registered virtual texture {texture_id}: {pages_per_side}x{pages_per_side} pages"
        );
        Ok(())
    }

    /// The page table of a registered texture.
    pub fn page_table(&self, texture_id: u16) -> Option<&PageTable> {
        self.tables.get(&texture_id)
    }

    /// Number of pages resident in the atlas.
    pub fn resident_count(&self) -> usize {
        self.physical.resident_count()
    }

    /// Number of pages queued or loading.
    pub fn pending_count(&self) -> usize {
        self.streamer.pending_count()
    }

    /// The configuration.
    pub fn config(&self) -> &VirtualTextureConfig {
        &self.config
    }

    /// Run one streaming step and record this frame's uploads.
    ///
    /// Deduplicates `feedback`, touches resident pages, enqueues a bounded
    /// number of misses, ingests a bounded number of finished loads (evicting
    /// by LRU when the atlas is full), resets and re-touches every page table
    /// from residency, then uploads the atlas and each indirection texture
    /// into the current back buffer's instances.
    ///
    /// # Errors
    ///
    /// Returns an error if an upload fails or an exported texture is missing.
    pub fn tick(
        &mut self,
        ctx: &mut RenderContext,
        feedback: &[PageRequest],
    ) -> Result<(), GraphicsError> {
        let mut seen = HashSet::new();
        let mut enqueued = 0;
        for request in feedback {
            let key = request.key();
            if !seen.insert(key) {
                continue;
            }
            if !self.validate_request(key) {
                continue;
            }
            if self.physical.slot_of(key).is_some() {
                self.physical.touch(key);
            } else if enqueued < self.config.page_process_count_per_frame
                && self.streamer.request(key)
            {
                enqueued += 1;
            }
        }

        let mut ingested = 0;
        for _ in 0..self.config.page_process_count_per_frame {
            let Some(loaded) = self.streamer.poll_result() else {
                break;
            };
            // Failed loads were already warned on the worker; the page is
            // retried when feedback requests it again.
            let Some(data) = loaded.data else { continue };
            self.physical.ingest(loaded.key, &data);
            ingested += 1;
        }
        if ingested > 0 {
            log::trace!("ingested {ingested} pages, {} resident", self.physical.resident_count());
        }

        for table in self.tables.values_mut() {
            table.invalidate_all();
        }
        for (key, slot) in self.physical.residents() {
            if let Some(table) = self.tables.get_mut(&key.texture_id()) {
                table.touch(key.mip(), key.x(), key.y(), slot);
            }
        }

        // Uploads target the current back buffer's texture instances, so
        // they run every tick even when residency did not change.
        let index = ctx.back_buffer_index();
        let atlas = ctx
            .resources
            .texture(ResourceTableId::VtPhysical(0), index)?;
        upload_pixels(
            ctx,
            &atlas,
            self.physical.pixels(),
            self.config.texture_size,
            self.config.texture_size,
        )?;
        for (&texture_id, table) in &self.tables {
            let side = table.pages_per_side();
            let data = table.indirection_data();
            let indirection = ctx
                .resources
                .texture(ResourceTableId::VtPageTable(texture_id), index)?;
            upload_pixels(ctx, &indirection, &data, side, side)?;
        }
        Ok(())
    }

    fn validate_request(&self, key: PageKey) -> bool {
        let Some(table) = self.tables.get(&key.texture_id()) else {
            log::warn!("feedback for unregistered texture {}", key.texture_id());
            return false;
        };
        if u32::from(key.mip()) >= table.mip_count() {
            log::warn!("feedback mip out of range: {key}");
            return false;
        }
        let side = table.pages_per_side() >> key.mip();
        if key.x() >= side || key.y() >= side {
            log::warn!("feedback page out of range: {key}");
            return false;
        }
        true
    }
}

/// Stage pixels through the temp pool and record the copy into mip 0.
fn upload_pixels(
    ctx: &mut RenderContext,
    texture: &Arc<Texture>,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<(), GraphicsError> {
    let staging = ctx.memory.allocate_temp_upload_buffer(data.len() as u64)?;
    ctx.memory.upload_buffer_data(&staging, 0, data)?;
    ctx.recorder
        .copy_buffer_to_texture(&staging, 0, width * 4, texture, 0, [0, 0], [width, height]);
    ctx.recorder
        .transition_texture(texture, ResourceState::ShaderResource);
    Ok(())
}

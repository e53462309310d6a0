//! Physical page atlas.
//!
//! One large texture holds every resident page, bordered, in a fixed grid of
//! slots. Residency is strict LRU: every touch moves a page to the back of
//! the recency queue and the victim is always the front. A CPU copy of the
//! atlas pixels is kept so page uploads can be staged without reading the
//! GPU texture back.

use std::collections::{HashMap, VecDeque};

use super::page::PageKey;

/// Grid coordinates of a page slot inside the physical atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasSlot {
    /// Slot column.
    pub x: u16,
    /// Slot row.
    pub y: u16,
}

/// CPU-side model of the physical page atlas.
#[derive(Debug)]
pub struct PhysicalTexture {
    page_size: u32,
    border: u32,
    slots_per_side: u32,
    residents: HashMap<PageKey, AtlasSlot>,
    recency: VecDeque<PageKey>,
    free_slots: Vec<AtlasSlot>,
    pixels: Vec<u8>,
}

impl PhysicalTexture {
    /// Create an empty atlas.
    ///
    /// `texture_size` is the atlas edge in texels; each slot spans
    /// `page_size + 2 * border` texels.
    ///
    /// # Panics
    ///
    /// Panics if the atlas cannot hold at least one slot, or if it holds
    /// more than 256 slots per side (slot coordinates must fit the RGBA8
    /// indirection texel).
    pub fn new(texture_size: u32, page_size: u32, border: u32) -> Self {
        let padded = page_size + 2 * border;
        let slots_per_side = texture_size / padded;
        assert!(
            slots_per_side > 0,
            "atlas of {texture_size} texels cannot hold a {padded}-texel page slot"
        );
        assert!(
            slots_per_side <= 256,
            "atlas of {slots_per_side} slots per side overflows the RGBA8 indirection texel"
        );

        let mut free_slots = Vec::with_capacity((slots_per_side * slots_per_side) as usize);
        // Reverse so slots hand out in row-major order from Vec::pop.
        for y in (0..slots_per_side).rev() {
            for x in (0..slots_per_side).rev() {
                free_slots.push(AtlasSlot {
                    x: x as u16,
                    y: y as u16,
                });
            }
        }

        Self {
            page_size,
            border,
            slots_per_side,
            residents: HashMap::new(),
            recency: VecDeque::new(),
            free_slots,
            pixels: vec![0; (texture_size * texture_size * 4) as usize],
        }
    }

    /// Total number of page slots.
    pub fn capacity(&self) -> usize {
        (self.slots_per_side * self.slots_per_side) as usize
    }

    /// Number of resident pages.
    pub fn resident_count(&self) -> usize {
        self.residents.len()
    }

    /// Slot edge length in texels, borders included.
    pub fn padded_page_size(&self) -> u32 {
        self.page_size + 2 * self.border
    }

    /// Byte size of one page's pixel data, borders included.
    pub fn page_byte_size(&self) -> usize {
        let padded = self.padded_page_size();
        (padded * padded * 4) as usize
    }

    /// The slot of a resident page.
    pub fn slot_of(&self, key: PageKey) -> Option<AtlasSlot> {
        self.residents.get(&key).copied()
    }

    /// Texel origin of a slot in the atlas, border included.
    pub fn slot_origin(&self, slot: AtlasSlot) -> (u32, u32) {
        let padded = self.padded_page_size();
        (u32::from(slot.x) * padded, u32::from(slot.y) * padded)
    }

    /// The CPU copy of the atlas pixels.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mark a resident page as most recently used. No-op if not resident.
    pub fn touch(&mut self, key: PageKey) {
        if !self.residents.contains_key(&key) {
            return;
        }
        if let Some(position) = self.recency.iter().position(|&k| k == key) {
            self.recency.remove(position);
        }
        self.recency.push_back(key);
    }

    /// Place page pixels into the atlas, evicting the least recently used
    /// page when full.
    ///
    /// Returns the evicted page, if any, so the caller can invalidate its
    /// page table entry. Ingesting an already-resident page overwrites its
    /// pixels in place and counts as a touch.
    ///
    /// # Panics
    ///
    /// Panics if `data` is not [`Self::page_byte_size`] bytes.
    pub fn ingest(&mut self, key: PageKey, data: &[u8]) -> Option<PageKey> {
        assert_eq!(
            data.len(),
            self.page_byte_size(),
            "page data must be {} bytes",
            self.page_byte_size()
        );

        if let Some(slot) = self.residents.get(&key).copied() {
            self.write_slot(slot, data);
            self.touch(key);
            return None;
        }

        let (slot, evicted) = match self.free_slots.pop() {
            Some(slot) => (slot, None),
            None => {
                let victim = self
                    .recency
                    .pop_front()
                    .expect("full atlas with empty recency queue");
                let slot = self
                    .residents
                    .remove(&victim)
                    .expect("recency queue entry without a resident slot");
                log::debug!("evicting {victim} for {key}");
                (slot, Some(victim))
            }
        };

        self.write_slot(slot, data);
        self.residents.insert(key, slot);
        self.recency.push_back(key);
        evicted
    }

    /// All resident pages and their slots, in no particular order.
    pub fn residents(&self) -> impl Iterator<Item = (PageKey, AtlasSlot)> + '_ {
        self.residents.iter().map(|(&key, &slot)| (key, slot))
    }

    /// Drop a page from residency without replacing it.
    pub fn remove(&mut self, key: PageKey) -> Option<AtlasSlot> {
        let slot = self.residents.remove(&key)?;
        if let Some(position) = self.recency.iter().position(|&k| k == key) {
            self.recency.remove(position);
        }
        self.free_slots.push(slot);
        Some(slot)
    }

    fn write_slot(&mut self, slot: AtlasSlot, data: &[u8]) {
        let padded = self.padded_page_size();
        let atlas_row_bytes = (self.slots_per_side * padded * 4) as usize;
        let page_row_bytes = (padded * 4) as usize;
        let (origin_x, origin_y) = self.slot_origin(slot);

        for row in 0..padded as usize {
            let src = &data[row * page_row_bytes..(row + 1) * page_row_bytes];
            let dst_offset =
                (origin_y as usize + row) * atlas_row_bytes + origin_x as usize * 4;
            self.pixels[dst_offset..dst_offset + page_row_bytes].copy_from_slice(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2x2 slots of 4-texel pages with no border.
    fn small_atlas() -> PhysicalTexture {
        PhysicalTexture::new(8, 4, 0)
    }

    fn page(data: u8, atlas: &PhysicalTexture) -> Vec<u8> {
        vec![data; atlas.page_byte_size()]
    }

    fn key(n: u32) -> PageKey {
        PageKey::new(0, 0, n, 0)
    }

    #[test]
    fn test_capacity_accounts_for_borders() {
        // 8 texels / (4 + 2*1) = 1 slot per side.
        let atlas = PhysicalTexture::new(8, 4, 1);
        assert_eq!(atlas.capacity(), 1);
        assert_eq!(atlas.padded_page_size(), 6);
        assert_eq!(atlas.page_byte_size(), 6 * 6 * 4);
    }

    #[test]
    fn test_largest_addressable_atlas_is_accepted() {
        // 256 slots per side: slot coordinates 0..=255 still fit a byte.
        let atlas = PhysicalTexture::new(256, 1, 0);
        assert_eq!(atlas.capacity(), 256 * 256);
    }

    #[test]
    #[should_panic(expected = "overflows the RGBA8 indirection texel")]
    fn test_atlas_beyond_indirection_range_panics() {
        // 512 slots per side cannot be encoded in a byte.
        let _ = PhysicalTexture::new(32768, 64, 0);
    }

    #[test]
    fn test_fills_free_slots_before_evicting() {
        let mut atlas = small_atlas();
        for n in 0..4 {
            let data = page(n as u8, &atlas);
            assert_eq!(atlas.ingest(key(n), &data), None);
        }
        assert_eq!(atlas.resident_count(), 4);
    }

    #[test]
    fn test_full_atlas_evicts_least_recently_used() {
        let mut atlas = small_atlas();
        let data = page(0, &atlas);
        for n in 0..4 {
            atlas.ingest(key(n), &data);
        }

        // Oldest page is key(0).
        assert_eq!(atlas.ingest(key(4), &data), Some(key(0)));
        assert_eq!(atlas.slot_of(key(0)), None);
        assert!(atlas.slot_of(key(4)).is_some());
        assert_eq!(atlas.resident_count(), 4);
    }

    #[test]
    fn test_touch_reorders_eviction() {
        let mut atlas = small_atlas();
        let data = page(0, &atlas);
        for n in 0..4 {
            atlas.ingest(key(n), &data);
        }

        // key(0) becomes most recent, so key(1) is the next victim.
        atlas.touch(key(0));
        assert_eq!(atlas.ingest(key(4), &data), Some(key(1)));
        assert!(atlas.slot_of(key(0)).is_some());
    }

    #[test]
    fn test_reingest_resident_page_does_not_evict() {
        let mut atlas = small_atlas();
        let data = page(0, &atlas);
        for n in 0..4 {
            atlas.ingest(key(n), &data);
        }

        let slot_before = atlas.slot_of(key(2)).unwrap();
        assert_eq!(atlas.ingest(key(2), &page(9, &atlas)), None);
        assert_eq!(atlas.slot_of(key(2)), Some(slot_before));
        assert_eq!(atlas.resident_count(), 4);

        // Re-ingest counted as a touch, so key(0) is still the oldest.
        assert_eq!(atlas.ingest(key(4), &data), Some(key(0)));
    }

    #[test]
    fn test_pixels_land_at_slot_origin() {
        let mut atlas = small_atlas();
        atlas.ingest(key(0), &page(1, &atlas));
        atlas.ingest(key(1), &page(2, &atlas));

        let slot = atlas.slot_of(key(1)).unwrap();
        let (x, y) = atlas.slot_origin(slot);
        let atlas_row_bytes = 8 * 4;
        let offset = y as usize * atlas_row_bytes + x as usize * 4;
        assert_eq!(atlas.pixels()[offset], 2);
    }

    #[test]
    fn test_remove_frees_slot() {
        let mut atlas = small_atlas();
        let data = page(0, &atlas);
        for n in 0..4 {
            atlas.ingest(key(n), &data);
        }

        assert!(atlas.remove(key(1)).is_some());
        assert_eq!(atlas.resident_count(), 3);
        // The freed slot is reused without evicting.
        assert_eq!(atlas.ingest(key(5), &data), None);
    }
}

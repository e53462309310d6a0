//! Per-texture page residency table.
//!
//! One table per logical texture, one level per mip, each level a grid of
//! page entries pointing at a physical atlas slot. The table also bakes the
//! indirection texture: an RGBA8 grid at mip-0 page resolution where every
//! texel names the finest resident ancestor of its page, so samplers always
//! find a fallback as long as any coarser mip of the page is resident.

use super::page::PageKey;
use super::physical::AtlasSlot;

/// Quad-tree residency table of one logical texture.
#[derive(Debug)]
pub struct PageTable {
    texture_id: u16,
    pages_per_side: u32,
    levels: Vec<Vec<Option<AtlasSlot>>>,
}

impl PageTable {
    /// Create an empty table for a texture of `pages_per_side` mip-0 pages.
    ///
    /// # Panics
    ///
    /// Panics if `pages_per_side` is not a power of two.
    pub fn new(texture_id: u16, pages_per_side: u32) -> Self {
        assert!(
            pages_per_side.is_power_of_two(),
            "pages_per_side {pages_per_side} must be a power of two"
        );
        let mip_count = pages_per_side.trailing_zeros() + 1;
        let levels = (0..mip_count)
            .map(|mip| {
                let side = (pages_per_side >> mip) as usize;
                vec![None; side * side]
            })
            .collect();
        Self {
            texture_id,
            pages_per_side,
            levels,
        }
    }

    /// The logical texture id this table belongs to.
    pub fn texture_id(&self) -> u16 {
        self.texture_id
    }

    /// Mip-0 page grid edge length.
    pub fn pages_per_side(&self) -> u32 {
        self.pages_per_side
    }

    /// Number of mip levels, down to the 1x1 page.
    pub fn mip_count(&self) -> u32 {
        self.levels.len() as u32
    }

    fn index(&self, mip: u8, x: u32, y: u32) -> (usize, usize) {
        let mip = mip as usize;
        assert!(
            mip < self.levels.len(),
            "mip {mip} out of range for {} levels",
            self.levels.len()
        );
        let side = self.pages_per_side >> mip;
        assert!(
            x < side && y < side,
            "page ({x}, {y}) out of range for {side}x{side} mip {mip}"
        );
        (mip, (y * side + x) as usize)
    }

    /// The atlas slot of a page, if resident.
    pub fn slot_at(&self, mip: u8, x: u32, y: u32) -> Option<AtlasSlot> {
        let (mip, index) = self.index(mip, x, y);
        self.levels[mip][index]
    }

    /// Record a page as resident in `slot`.
    ///
    /// Idempotent: re-recording the same slot changes nothing. Returns
    /// whether the entry changed.
    pub fn touch(&mut self, mip: u8, x: u32, y: u32, slot: AtlasSlot) -> bool {
        let (mip, index) = self.index(mip, x, y);
        let entry = &mut self.levels[mip][index];
        if *entry == Some(slot) {
            return false;
        }
        *entry = Some(slot);
        true
    }

    /// Record a page as resident, addressed by key.
    pub fn touch_key(&mut self, key: PageKey, slot: AtlasSlot) -> bool {
        debug_assert_eq!(key.texture_id(), self.texture_id);
        self.touch(key.mip(), key.x(), key.y(), slot)
    }

    /// Drop a page's residency entry. Returns whether one was set.
    pub fn invalidate(&mut self, mip: u8, x: u32, y: u32) -> bool {
        let (mip, index) = self.index(mip, x, y);
        self.levels[mip][index].take().is_some()
    }

    /// Drop a page's residency entry, addressed by key.
    pub fn invalidate_key(&mut self, key: PageKey) -> bool {
        debug_assert_eq!(key.texture_id(), self.texture_id);
        self.invalidate(key.mip(), key.x(), key.y())
    }

    /// Drop every residency entry.
    ///
    /// Each frame the table is reset and re-touched from current physical
    /// residency before the indirection data is rebuilt.
    pub fn invalidate_all(&mut self) {
        for level in &mut self.levels {
            level.fill(None);
        }
    }

    /// Number of resident entries across all mips.
    pub fn resident_count(&self) -> usize {
        self.levels
            .iter()
            .map(|level| level.iter().filter(|entry| entry.is_some()).count())
            .sum()
    }

    /// Bake the indirection texture pixels.
    ///
    /// RGBA8 at mip-0 page resolution: for each texel the finest resident
    /// ancestor's (slot x, slot y, mip, 255), or all zero when no mip of
    /// the page is resident.
    pub fn indirection_data(&self) -> Vec<u8> {
        let side = self.pages_per_side as usize;
        let mut data = vec![0u8; side * side * 4];
        for y in 0..self.pages_per_side {
            for x in 0..self.pages_per_side {
                let offset = ((y as usize) * side + x as usize) * 4;
                for mip in 0..self.levels.len() {
                    let level_side = self.pages_per_side >> mip;
                    let index = ((y >> mip) * level_side + (x >> mip)) as usize;
                    if let Some(slot) = self.levels[mip][index] {
                        data[offset] = slot.x as u8;
                        data[offset + 1] = slot.y as u8;
                        data[offset + 2] = mip as u8;
                        data[offset + 3] = 255;
                        break;
                    }
                }
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(x: u16, y: u16) -> AtlasSlot {
        AtlasSlot { x, y }
    }

    fn texel(data: &[u8], side: u32, x: u32, y: u32) -> [u8; 4] {
        let offset = ((y * side + x) * 4) as usize;
        data[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn test_level_count_down_to_one_page() {
        let table = PageTable::new(0, 8);
        assert_eq!(table.mip_count(), 4);
        assert_eq!(table.slot_at(3, 0, 0), None);
    }

    #[test]
    fn test_touch_is_idempotent() {
        let mut table = PageTable::new(0, 4);
        assert!(table.touch(0, 1, 2, slot(3, 0)));
        assert!(!table.touch(0, 1, 2, slot(3, 0)));
        assert_eq!(table.resident_count(), 1);
        assert_eq!(table.slot_at(0, 1, 2), Some(slot(3, 0)));

        // Moving the page to another slot is a change.
        assert!(table.touch(0, 1, 2, slot(0, 1)));
        assert_eq!(table.resident_count(), 1);
    }

    #[test]
    fn test_invalidate() {
        let mut table = PageTable::new(0, 4);
        let key = PageKey::new(0, 1, 0, 1);
        table.touch_key(key, slot(2, 2));
        assert!(table.invalidate_key(key));
        assert!(!table.invalidate_key(key));
        assert_eq!(table.resident_count(), 0);
    }

    #[test]
    fn test_invalidate_all_resets_every_level() {
        let mut table = PageTable::new(0, 4);
        table.touch(0, 0, 0, slot(0, 0));
        table.touch(2, 0, 0, slot(1, 0));
        table.invalidate_all();
        assert_eq!(table.resident_count(), 0);
    }

    #[test]
    fn test_indirection_prefers_finest_resident_mip() {
        let mut table = PageTable::new(0, 4);
        // Whole texture covered at the coarsest mip.
        table.touch(2, 0, 0, slot(0, 0));
        // One quadrant covered finer.
        table.touch(1, 1, 1, slot(1, 0));
        // One page covered at full resolution.
        table.touch(0, 3, 3, slot(2, 0));

        let data = table.indirection_data();
        assert_eq!(texel(&data, 4, 0, 0), [0, 0, 2, 255]);
        assert_eq!(texel(&data, 4, 2, 2), [1, 0, 1, 255]);
        assert_eq!(texel(&data, 4, 3, 3), [2, 0, 0, 255]);
    }

    #[test]
    fn test_indirection_marks_missing_pages_invalid() {
        let mut table = PageTable::new(0, 2);
        table.touch(0, 0, 0, slot(0, 0));

        let data = table.indirection_data();
        assert_eq!(texel(&data, 2, 0, 0), [0, 0, 0, 255]);
        assert_eq!(texel(&data, 2, 1, 1), [0, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_page_panics() {
        let table = PageTable::new(0, 4);
        let _ = table.slot_at(1, 2, 0);
    }
}

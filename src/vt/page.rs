//! Virtual texture page identity.
//!
//! A page is addressed by (logical texture, mip, x, y), packed into one
//! 64-bit key so pages hash, compare and serialize as a single integer. The
//! decimal rendering of the key is also the page's file name in a page store.

use std::fmt;

/// Edge length of a page in texels, without borders.
pub const PAGE_SIZE: u32 = 64;

/// Packed identity of a virtual texture page.
///
/// Layout, high to low: `texture_id:16 | mip:8 | x:20 | y:20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageKey(u64);

impl PageKey {
    const COORD_BITS: u32 = 20;
    const COORD_MASK: u64 = (1 << Self::COORD_BITS) - 1;
    const MIP_MASK: u64 = 0xFF;

    /// Pack a page identity.
    ///
    /// # Panics
    ///
    /// Panics if a coordinate exceeds its 20-bit field.
    pub fn new(texture_id: u16, mip: u8, x: u32, y: u32) -> Self {
        assert!(
            u64::from(x) <= Self::COORD_MASK && u64::from(y) <= Self::COORD_MASK,
            "page coordinate ({x}, {y}) exceeds the 20-bit field"
        );
        Self(
            (u64::from(texture_id) << 48)
                | (u64::from(mip) << 40)
                | (u64::from(x) << Self::COORD_BITS)
                | u64::from(y),
        )
    }

    /// Rebuild a key from its raw packed value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw packed value.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// The logical texture id.
    pub fn texture_id(self) -> u16 {
        (self.0 >> 48) as u16
    }

    /// The mip level.
    pub fn mip(self) -> u8 {
        ((self.0 >> 40) & Self::MIP_MASK) as u8
    }

    /// The page x coordinate within its mip level.
    pub fn x(self) -> u32 {
        ((self.0 >> Self::COORD_BITS) & Self::COORD_MASK) as u32
    }

    /// The page y coordinate within its mip level.
    pub fn y(self) -> u32 {
        (self.0 & Self::COORD_MASK) as u32
    }

    /// The page's file name in a page store: the decimal key.
    pub fn file_name(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page(tex={}, mip={}, {}x{})",
            self.texture_id(),
            self.mip(),
            self.x(),
            self.y()
        )
    }
}

/// A page wanted by the renderer, produced by feedback analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    /// Logical texture id.
    pub texture_id: u16,
    /// Mip level.
    pub mip: u8,
    /// Page x coordinate within the mip level.
    pub x: u32,
    /// Page y coordinate within the mip level.
    pub y: u32,
}

impl PageRequest {
    /// Create a page request.
    pub fn new(texture_id: u16, mip: u8, x: u32, y: u32) -> Self {
        Self {
            texture_id,
            mip,
            x,
            y,
        }
    }

    /// The packed page key.
    pub fn key(self) -> PageKey {
        PageKey::new(self.texture_id, self.mip, self.x, self.y)
    }
}

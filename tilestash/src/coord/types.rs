//! Coordinate type definitions

use std::fmt;

/// Lowest zoom level addressable in an archive.
pub const MIN_ZOOM: u8 = 0;
/// Highest zoom level addressable in an archive.
///
/// Keeps `1 << zoom` within `u32` for the row flip.
pub const MAX_ZOOM: u8 = 31;

/// Tile coordinates in the XYZ (slippy map) scheme.
///
/// Row 0 is at the north edge, column 0 at the west edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TileCoord {
    /// Zoom level
    pub zoom: u8,
    /// X coordinate (east-west), 0 at west
    pub x: u32,
    /// Y coordinate (north-south), 0 at north
    pub y: u32,
}

impl TileCoord {
    /// Creates a tile coordinate.
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this zoom level.
    ///
    /// Returns `None` when the zoom level is beyond [`MAX_ZOOM`].
    #[inline]
    pub fn axis_len(&self) -> Option<u64> {
        if self.zoom > MAX_ZOOM {
            return None;
        }
        Some(1u64 << self.zoom)
    }

    /// Returns true if x and y fall inside the grid for this zoom level.
    #[inline]
    pub fn in_bounds(&self) -> bool {
        self.axis_len()
            .is_some_and(|n| u64::from(self.x) < n && u64::from(self.y) < n)
    }

    /// Row index in the TMS scheme used by MBTiles (row 0 at the south edge).
    ///
    /// Returns `None` for coordinates outside the grid.
    #[inline]
    pub fn tms_row(&self) -> Option<u32> {
        if !self.in_bounds() {
            return None;
        }
        let n = self.axis_len()?;
        u32::try_from(n - 1 - u64::from(self.y)).ok()
    }

    /// Builds an XYZ coordinate from a TMS row as stored in MBTiles.
    pub fn from_tms(zoom: u8, x: u32, tms_row: u32) -> Option<Self> {
        let flipped = Self::new(zoom, x, tms_row);
        let y = flipped.tms_row()?;
        Some(Self::new(zoom, x, y))
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

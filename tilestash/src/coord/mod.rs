//! Tile coordinate handling for the read path.
//!
//! Tile requests arrive as three path segments plus an extension
//! (`/{z}/{x}/{y}.{ext}`). Segments that are not integers are coerced to 0
//! instead of rejecting the request. Integers outside the grid (negative, or
//! too large for the zoom level) stay outside it, so the tile is not found.

mod types;

pub use types::{TileCoord, MAX_ZOOM, MIN_ZOOM};

/// Value of a segment: `None` when it is not an integer, `Some(None)` when it
/// is an integer that does not fit a `u32`.
fn integer_segment(segment: &str) -> Option<Option<u32>> {
    let segment = segment.trim();
    let (negative, digits) = match segment.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, segment.strip_prefix('+').unwrap_or(segment)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative && digits.bytes().any(|b| b != b'0') {
        return Some(None);
    }
    Some(digits.parse::<u32>().ok())
}

/// Parses one coordinate segment.
///
/// Non-integers coerce to 0; negative or oversized integers map to
/// `u32::MAX`, which lies outside the grid at every zoom level.
#[inline]
pub fn coerce_segment(segment: &str) -> u32 {
    match integer_segment(segment) {
        None => 0,
        Some(value) => value.unwrap_or(u32::MAX),
    }
}

/// Parses a zoom segment.
///
/// Non-integers coerce to 0; integers outside `u8` map to `u8::MAX`, above
/// [`MAX_ZOOM`].
#[inline]
pub fn coerce_zoom(segment: &str) -> u8 {
    match integer_segment(segment) {
        None => 0,
        Some(value) => value.and_then(|v| u8::try_from(v).ok()).unwrap_or(u8::MAX),
    }
}

/// Splits the last tile path segment (`"20.png"`) into the row and extension.
///
/// A segment without an extension yields an empty extension.
pub fn split_tile_filename(segment: &str) -> (&str, &str) {
    match segment.split_once('.') {
        Some((y, ext)) => (y, ext),
        None => (segment, ""),
    }
}

/// Builds a [`TileCoord`] from raw request segments.
///
/// # Example
///
/// ```
/// use tilestash::coord::{tile_from_segments, TileCoord};
///
/// assert_eq!(tile_from_segments("5", "10", "20.png"), TileCoord::new(5, 10, 20));
/// assert_eq!(tile_from_segments("abc", "0", "x.png"), TileCoord::new(0, 0, 0));
/// assert!(!tile_from_segments("2", "-1", "0.png").in_bounds());
/// ```
pub fn tile_from_segments(z: &str, x: &str, y_with_ext: &str) -> TileCoord {
    let (y, _ext) = split_tile_filename(y_with_ext);
    TileCoord::new(coerce_zoom(z), coerce_segment(x), coerce_segment(y))
}

#[cfg(test)]
mod tests;

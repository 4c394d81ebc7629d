//! Tests for tile coordinate parsing

use super::*;

#[test]
fn test_numeric_segments_parse() {
    let tile = tile_from_segments("5", "10", "20.png");
    assert_eq!(tile, TileCoord::new(5, 10, 20));
}

#[test]
fn test_non_numeric_segments_coerce_to_zero() {
    let tile = tile_from_segments("z", "abc", "y.png");
    assert_eq!(tile, TileCoord::new(0, 0, 0));
}

#[test]
fn test_negative_segments_fall_outside_grid() {
    assert_eq!(coerce_segment("-3"), u32::MAX);
    assert_eq!(coerce_zoom("-1"), u8::MAX);
    assert_eq!(tile_from_segments("-1", "0", "0.png").tms_row(), None);
    assert_eq!(tile_from_segments("3", "-1", "0.png").tms_row(), None);
}

#[test]
fn test_negative_zero_is_zero() {
    assert_eq!(coerce_segment("-0"), 0);
}

#[test]
fn test_oversized_segments_fall_outside_grid() {
    assert_eq!(coerce_zoom("300"), u8::MAX);
    assert_eq!(coerce_segment("99999999999"), u32::MAX);
    assert_eq!(tile_from_segments("300", "0", "0.png").tms_row(), None);
}

#[test]
fn test_explicit_plus_sign_and_non_integers() {
    assert_eq!(coerce_segment("+4"), 4);
    assert_eq!(coerce_segment("1.5"), 0);
    assert_eq!(coerce_segment("-"), 0);
    assert_eq!(coerce_segment("+-1"), 0);
}

#[test]
fn test_split_tile_filename() {
    assert_eq!(split_tile_filename("20.png"), ("20", "png"));
    assert_eq!(split_tile_filename("20.vector.pbf"), ("20", "vector.pbf"));
    assert_eq!(split_tile_filename("20"), ("20", ""));
}

#[test]
fn test_tms_row_flips_y() {
    // At zoom 1 there are two rows: XYZ row 0 is TMS row 1
    assert_eq!(TileCoord::new(1, 0, 0).tms_row(), Some(1));
    assert_eq!(TileCoord::new(1, 0, 1).tms_row(), Some(0));
    assert_eq!(TileCoord::new(0, 0, 0).tms_row(), Some(0));
}

#[test]
fn test_tms_row_out_of_bounds() {
    assert_eq!(TileCoord::new(2, 0, 4).tms_row(), None);
    assert_eq!(TileCoord::new(2, 4, 0).tms_row(), None);
    assert_eq!(TileCoord::new(40, 0, 0).tms_row(), None);
}

#[test]
fn test_from_tms_round_trip() {
    let tile = TileCoord::new(5, 10, 20);
    let tms = tile.tms_row().unwrap();
    assert_eq!(TileCoord::from_tms(5, 10, tms), Some(tile));
}

#[test]
fn test_max_zoom_axis_fits() {
    let tile = TileCoord::new(MAX_ZOOM, u32::MAX, 0);
    assert_eq!(tile.axis_len(), Some(1u64 << 31));
    assert!(!tile.in_bounds());
}

#[test]
fn test_display() {
    assert_eq!(TileCoord::new(3, 4, 5).to_string(), "3/4/5");
}

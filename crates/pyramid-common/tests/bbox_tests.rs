//! Tests for BoundingBox, Envelope and GridGeometry interplay.

use pyramid_common::bbox::BboxParseError;
use pyramid_common::{
    AffineTransform, AxisRange, BoundingBox, Crs, CrsCode, Envelope, ExtraAxis, GridGeometry,
};

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn test_parse_scientific_notation() {
    let bbox = BoundingBox::parse("1e-6,2e-6,1e6,2e6").unwrap();
    assert!((bbox.min_x - 1e-6).abs() < 1e-10);
    assert!((bbox.max_y - 2e6).abs() < 0.001);
}

#[test]
fn test_parse_web_mercator_extent() {
    let bbox =
        BoundingBox::parse("-20037508.34,-20037508.34,20037508.34,20037508.34").unwrap();
    assert!((bbox.width() - 40075016.68).abs() < 0.01);
}

#[test]
fn test_parse_errors() {
    assert!(matches!(
        BoundingBox::parse("1,2,3,4,5"),
        Err(BboxParseError::InvalidFormat(_))
    ));
    assert!(matches!(
        BoundingBox::parse(""),
        Err(BboxParseError::InvalidFormat(_))
    ));
    assert!(matches!(
        BoundingBox::parse("0,x,1,1"),
        Err(BboxParseError::InvalidNumber(_))
    ));
    assert!(matches!(
        BoundingBox::parse("0,5,1,1"),
        Err(BboxParseError::Inverted(_))
    ));
}

// ============================================================================
// Dimensions
// ============================================================================

#[test]
fn test_zero_area_box_is_empty() {
    let line = BoundingBox::new(0.0, 0.0, 10.0, 0.0);
    assert!(line.is_valid());
    assert!(line.is_empty());
    assert!(!BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_empty());
}

#[test]
fn test_nan_box_is_invalid() {
    let bbox = BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0);
    assert!(!bbox.is_valid());
}

// ============================================================================
// Intersection / containment
// ============================================================================

#[test]
fn test_intersection_with_self() {
    let bbox = BoundingBox::new(-10.0, -10.0, 10.0, 10.0);
    assert_eq!(bbox.intersection(&bbox), Some(bbox));
}

#[test]
fn test_contained_box_intersection() {
    let outer = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
    let inner = BoundingBox::new(25.0, 25.0, 75.0, 75.0);
    assert_eq!(outer.intersection(&inner), Some(inner));
}

#[test]
fn test_contains_point_on_edge() {
    let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    assert!(bbox.contains_point(0.0, 5.0));
    assert!(bbox.contains_point(10.0, 10.0));
    assert!(!bbox.contains_point(10.1, 5.0));
}

// ============================================================================
// Envelopes derived from grid geometries
// ============================================================================

#[test]
fn test_grid_envelope_carries_slice() {
    let crs = Crs::new(CrsCode::Epsg3857).with_axis(ExtraAxis::elevation());
    let geometry = GridGeometry::new(512, 512, AffineTransform::north_up(0.0, 0.0, 10.0), crs)
        .with_slice(vec![AxisRange::point(500.0)]);

    let envelope = geometry.envelope();
    assert_eq!(envelope.bbox, BoundingBox::new(0.0, -5120.0, 5120.0, 0.0));
    assert_eq!(envelope.extra, vec![AxisRange::point(500.0)]);
    assert_eq!(envelope.dimension(), 3);
}

#[test]
fn test_envelope_intersection_keeps_receiver_crs() {
    let crs = Crs::new(CrsCode::Epsg4326);
    let a = Envelope::new(crs.clone(), BoundingBox::new(-180.0, -90.0, 0.0, 90.0));
    let b = Envelope::new(crs, BoundingBox::new(-90.0, -45.0, 90.0, 45.0));

    let result = a.intersection(&b).unwrap();
    assert_eq!(result.bbox, BoundingBox::new(-90.0, -45.0, 0.0, 45.0));
    assert_eq!(result.crs.code, CrsCode::Epsg4326);
}

#[test]
fn test_disjoint_envelopes() {
    let crs = Crs::new(CrsCode::Epsg3857);
    let a = Envelope::new(crs.clone(), BoundingBox::new(0.0, 0.0, 1.0, 1.0));
    let b = Envelope::new(crs, BoundingBox::new(2.0, 2.0, 3.0, 3.0));
    assert!(!a.intersects(&b));
    assert!(a.intersection(&b).is_none());
}

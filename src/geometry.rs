//! Coordinate spaces and rectangle math.
//!
//! Three spaces are involved in every evaluation:
//! - the inference frame, where the detection service reports boxes
//!   (either 0..1 normalized or absolute pixels of the source frame),
//! - the source frame, the resolution of the JPEG actually sent,
//! - the viewport, where the user annotated the goal region.
//!
//! Overlap is decided on axis-aligned bounding rectangles in viewport space,
//! never on the true quadrilateral.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;

/// Coordinates at or below this magnitude are taken as normalized.
///
/// This is a heuristic, not a protocol guarantee: an absolute box hugging the
/// top-left pixel of the frame would be misread as normalized. The wire format
/// carries no explicit convention field.
pub const NORMALIZED_COORD_LIMIT: f64 = 1.5;

/// Viewport pixel coordinate. Not clamped to frame bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle with `x1 <= x2` and `y1 <= y2` when built from points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingRect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from a `[x1, y1, x2, y2]` box as reported on the wire.
    pub fn from_box(b: [f64; 4]) -> Self {
        Self::new(b[0], b[1], b[2], b[3])
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }
}

/// Resolution of the most recent frame sent to the detection service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub w: u32,
    pub h: u32,
}

impl FrameDimensions {
    /// Placeholder used until the first real frame has been observed.
    pub const FALLBACK: FrameDimensions = FrameDimensions { w: 2048, h: 4032 };

    pub fn new(w: u32, h: u32) -> Result<Self, GeometryError> {
        if w == 0 || h == 0 {
            return Err(GeometryError::InvalidInput("frame dimensions must be non-zero"));
        }
        Ok(Self { w, h })
    }
}

/// On-screen area the user looks at and annotates in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Result<Self, GeometryError> {
        if !(width > 0.0 && height > 0.0) {
            return Err(GeometryError::InvalidInput("viewport must be positive"));
        }
        Ok(Self { width, height })
    }
}

/// True unless one rectangle lies strictly left, right, above or below the
/// other. Edge contact counts as overlap.
pub fn rectangles_overlap(a: &BoundingRect, b: &BoundingRect) -> bool {
    let apart = a.x2 < b.x1 || b.x2 < a.x1 || a.y2 < b.y1 || b.y2 < a.y1;
    !apart
}

/// Min/max reduction over a polygon.
pub fn bounding_rect(points: &[Point]) -> Result<BoundingRect, GeometryError> {
    let first = points
        .first()
        .ok_or(GeometryError::InvalidInput("bounding rect of zero points"))?;
    let init = BoundingRect::new(first.x, first.y, first.x, first.y);
    Ok(points.iter().skip(1).fold(init, |r, p| BoundingRect {
        x1: r.x1.min(p.x),
        y1: r.y1.min(p.y),
        x2: r.x2.max(p.x),
        y2: r.y2.max(p.y),
    }))
}

/// Whether a wire box is read as 0..1 normalized.
pub fn is_normalized(b: &[f64; 4]) -> bool {
    b.iter().cloned().fold(f64::NEG_INFINITY, f64::max) <= NORMALIZED_COORD_LIMIT
}

/// Map a wire box from inference space into the destination space.
///
/// Normalized boxes are first expanded to source-frame pixels, then every
/// coordinate is scaled by `dst / src` per axis.
pub fn rescale(b: [f64; 4], src_w: f64, src_h: f64, dst_w: f64, dst_h: f64) -> [f64; 4] {
    let [mut x1, mut y1, mut x2, mut y2] = b;
    if is_normalized(&b) {
        x1 *= src_w;
        y1 *= src_h;
        x2 *= src_w;
        y2 *= src_h;
    }
    let sx = dst_w / src_w;
    let sy = dst_h / src_h;
    [x1 * sx, y1 * sy, x2 * sx, y2 * sy]
}

/// `rescale` from the last sent frame into the viewport.
pub fn to_viewport(b: [f64; 4], frame: FrameDimensions, viewport: Viewport) -> BoundingRect {
    BoundingRect::from_box(rescale(
        b,
        frame.w as f64,
        frame.h as f64,
        viewport.width,
        viewport.height,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]
    }

    #[test]
    fn overlap_is_symmetric() {
        let rects = [
            BoundingRect::new(0.0, 0.0, 10.0, 10.0),
            BoundingRect::new(5.0, 5.0, 15.0, 15.0),
            BoundingRect::new(11.0, 0.0, 20.0, 10.0),
            BoundingRect::new(10.0, 10.0, 12.0, 12.0),
            BoundingRect::new(-5.0, -5.0, -1.0, -1.0),
            BoundingRect::new(2.0, 2.0, 3.0, 3.0),
        ];
        for a in &rects {
            for b in &rects {
                assert_eq!(rectangles_overlap(a, b), rectangles_overlap(b, a));
            }
        }
    }

    #[test]
    fn edge_contact_counts_as_overlap() {
        let a = BoundingRect::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingRect::new(10.0, 0.0, 20.0, 10.0);
        assert!(rectangles_overlap(&a, &b));
        let c = BoundingRect::new(10.5, 0.0, 20.0, 10.0);
        assert!(!rectangles_overlap(&a, &c));
    }

    #[test]
    fn containment_counts_as_overlap() {
        let outer = BoundingRect::new(0.0, 0.0, 100.0, 100.0);
        let inner = BoundingRect::new(40.0, 40.0, 60.0, 60.0);
        assert!(rectangles_overlap(&outer, &inner));
    }

    #[test]
    fn bounding_rect_contains_every_corner() {
        let region = vec![
            Point::new(120.5, 80.0),
            Point::new(300.0, 95.25),
            Point::new(310.0, 260.0),
            Point::new(110.0, 240.0),
        ];
        let rect = bounding_rect(&region).unwrap();
        for p in &region {
            assert!(rect.contains(*p));
        }
        assert_eq!(rect, BoundingRect::new(110.0, 80.0, 310.0, 260.0));
    }

    #[test]
    fn bounding_rect_of_unit_square() {
        let rect = bounding_rect(&square()).unwrap();
        assert_eq!(rect, BoundingRect::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn bounding_rect_rejects_empty_input() {
        assert!(matches!(
            bounding_rect(&[]),
            Err(GeometryError::InvalidInput(_))
        ));
    }

    #[test]
    fn normalized_box_expands_to_source_pixels() {
        let out = rescale([0.1, 0.1, 0.5, 0.5], 100.0, 200.0, 100.0, 200.0);
        let expected = [10.0, 20.0, 50.0, 100.0];
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn absolute_box_scales_to_viewport() {
        let out = rescale([100.0, 200.0, 300.0, 400.0], 1000.0, 2000.0, 500.0, 500.0);
        assert_eq!(out, [50.0, 50.0, 150.0, 100.0]);
    }

    #[test]
    fn identity_rescale_when_spaces_match() {
        let out = rescale([5.0, 5.0, 15.0, 15.0], 20.0, 20.0, 20.0, 20.0);
        assert_eq!(out, [5.0, 5.0, 15.0, 15.0]);
    }

    #[test]
    fn small_absolute_box_is_read_as_normalized() {
        assert!(is_normalized(&[0.0, 0.0, 1.0, 1.5]));
        assert!(!is_normalized(&[0.0, 0.0, 1.0, 1.6]));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(FrameDimensions::new(0, 10).is_err());
        assert!(Viewport::new(10.0, 0.0).is_err());
        assert!(Viewport::new(f64::NAN, 10.0).is_err());
    }
}

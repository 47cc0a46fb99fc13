//! User-built goal region.
//!
//! The region is a quadrilateral collected one tap at a time, clockwise. The
//! store only ever holds 0, 1-3 or exactly 4 points; once the fourth point
//! lands the region is frozen until it is cleared.

use crate::geometry::{bounding_rect, BoundingRect, Point};

pub const REGION_CORNERS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationState {
    Idle,
    Collecting,
    Complete,
}

/// Result of feeding a point to the store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointOutcome {
    /// Point stored, this many corners collected so far.
    Added(usize),
    /// Fourth point stored; the region is now complete.
    Completed([Point; REGION_CORNERS]),
    /// Region already complete, point dropped.
    Ignored,
}

#[derive(Clone, Debug, Default)]
pub struct AnnotationStore {
    points: Vec<Point>,
    /// Set by `begin` so that collection mode is active before the first tap.
    armed: bool,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AnnotationState {
        match self.points.len() {
            0 => AnnotationState::Idle,
            REGION_CORNERS => AnnotationState::Complete,
            _ => AnnotationState::Collecting,
        }
    }

    /// Discard any region and enter collection mode.
    pub fn begin(&mut self) {
        self.points.clear();
        self.armed = true;
    }

    /// True while the user is placing corners. Detection is paused meanwhile.
    pub fn is_collecting(&self) -> bool {
        match self.state() {
            AnnotationState::Idle => self.armed,
            AnnotationState::Collecting => true,
            AnnotationState::Complete => false,
        }
    }

    pub fn add_point(&mut self, point: Point) -> PointOutcome {
        if self.state() == AnnotationState::Complete {
            return PointOutcome::Ignored;
        }
        self.points.push(point);
        if self.points.len() == REGION_CORNERS {
            self.armed = false;
            return PointOutcome::Completed([
                self.points[0],
                self.points[1],
                self.points[2],
                self.points[3],
            ]);
        }
        PointOutcome::Added(self.points.len())
    }

    /// Back to Idle from any state.
    pub fn clear(&mut self) {
        self.points.clear();
        self.armed = false;
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The completed region, if any.
    pub fn region(&self) -> Option<&[Point]> {
        (self.state() == AnnotationState::Complete).then_some(self.points.as_slice())
    }

    /// Bounding rectangle of the completed region.
    pub fn region_rect(&self) -> Option<BoundingRect> {
        self.region().and_then(|r| bounding_rect(r).ok())
    }
}

//! Validity filter and primary-detection selection.
//!
//! All bounds are exclusive and are evaluated on the raw wire box, before
//! any rescaling.

use serde::Deserialize;

use super::result::{Detection, DetectionSummary};

/// Bounds a detection must fall strictly inside to be considered.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub min_confidence: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_area: f64,
    pub max_area: f64,
    pub min_side: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.15,
            min_aspect: 0.3,
            max_aspect: 3.0,
            min_area: 100.0,
            max_area: 100_000.0,
            min_side: 10.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DetectionFilter {
    settings: FilterSettings,
}

impl DetectionFilter {
    pub fn new(settings: FilterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    pub fn is_valid(&self, d: &Detection) -> bool {
        let (Some(width), Some(height)) = (d.width(), d.height()) else {
            return false;
        };
        let s = &self.settings;
        let aspect = width / height;
        let area = width * height;

        // NaN fails every comparison below.
        d.confidence > s.min_confidence
            && aspect > s.min_aspect
            && aspect < s.max_aspect
            && area > s.min_area
            && area < s.max_area
            && width > s.min_side
            && height > s.min_side
    }

    /// Highest-confidence valid detection. Ties keep the earliest entry.
    pub fn select_primary<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection> {
        detections
            .iter()
            .filter(|d| self.is_valid(d))
            .fold(None, |best: Option<&Detection>, d| match best {
                Some(b) if b.confidence >= d.confidence => Some(b),
                _ => Some(d),
            })
    }

    pub fn summarize(&self, detections: &[Detection]) -> DetectionSummary {
        DetectionSummary {
            received: detections.len(),
            valid: detections.iter().filter(|d| self.is_valid(d)).count(),
            primary: self.select_primary(detections).cloned(),
        }
    }
}

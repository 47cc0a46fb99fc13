//! Detection records as reported by the inference service.

use serde::{Deserialize, Serialize};

/// One detected object.
///
/// `bbox` is `[x1, y1, x2, y2]` in the inference frame: either 0..1 normalized
/// or absolute pixels of the source frame sent with the request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub bbox: Vec<f64>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default = "default_class_name")]
    pub class_name: String,
    #[serde(default)]
    pub center: Option<[f64; 2]>,
}

fn default_class_name() -> String {
    "ball".to_string()
}

impl Detection {
    pub fn new(bbox: [f64; 4], confidence: f64) -> Self {
        Self {
            bbox: bbox.to_vec(),
            confidence,
            class_name: default_class_name(),
            center: Some([(bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0]),
        }
    }

    /// The box as a fixed array, when it has at least four entries.
    pub fn bbox4(&self) -> Option<[f64; 4]> {
        match self.bbox.as_slice() {
            [x1, y1, x2, y2, ..] => Some([*x1, *y1, *x2, *y2]),
            _ => None,
        }
    }

    pub fn width(&self) -> Option<f64> {
        self.bbox4().map(|b| b[2] - b[0])
    }

    pub fn height(&self) -> Option<f64> {
        self.bbox4().map(|b| b[3] - b[1])
    }
}

/// Summary of one evaluated detection message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSummary {
    /// Detections received, valid or not.
    pub received: usize,
    /// Detections that passed the filter.
    pub valid: usize,
    /// The single detection used for the overlap test.
    pub primary: Option<Detection>,
}

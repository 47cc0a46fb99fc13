//! Wire protocol spoken with the detection service.
//!
//! Outbound: `{"image": "data:image/jpeg;base64,...", "timestamp": <epoch ms>}`.
//! Inbound success: `{"success": true, "detections": {"soccer_balls": [...]}, "is_goal_moment": bool}`.
//! Inbound failure: `{"success": false, "message": "..."}` (the service also
//! uses `error` for the same field).
//!
//! Anything else is a [`ProtocolError`]; callers log and drop it.

use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::error::ProtocolError;

pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Raw frame as delivered by the socket.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

/// One outbound frame request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    pub image: String,
    pub timestamp: i64,
}

impl FramePayload {
    pub fn from_base64_jpeg(jpeg_base64: &str, timestamp_ms: i64) -> Self {
        Self {
            image: format!("{}{}", JPEG_DATA_URI_PREFIX, jpeg_base64),
            timestamp: timestamp_ms,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// A recognized inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    Detections {
        balls: Vec<Detection>,
        is_goal_moment: bool,
    },
    Failure {
        message: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    success: bool,
    #[serde(default)]
    detections: Option<DetectionSet>,
    #[serde(default, alias = "error")]
    message: Option<String>,
    #[serde(default)]
    is_goal_moment: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct DetectionSet {
    #[serde(default)]
    soccer_balls: Vec<serde_json::Value>,
}

/// Parse one inbound frame.
///
/// Individual detections that do not deserialize are dropped here; they would
/// fail the validity filter anyway.
pub fn parse_inbound(payload: &Payload) -> Result<InboundMessage, ProtocolError> {
    let text = match payload {
        Payload::Text(text) => text,
        Payload::Binary(_) => return Err(ProtocolError::NonText),
    };

    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Err(ProtocolError::NotStructured);
    }

    let value: serde_json::Value =
        serde_json::from_str(trimmed).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let has_success_flag = value
        .get("success")
        .map(|s| s.is_boolean())
        .unwrap_or(false);
    if !has_success_flag {
        return Err(ProtocolError::UnrecognizedShape);
    }

    let response: DetectionResponse =
        serde_json::from_value(value).map_err(|_| ProtocolError::UnrecognizedShape)?;

    if !response.success {
        return Ok(InboundMessage::Failure {
            message: response.message,
        });
    }

    let balls = response
        .detections
        .map(|set| {
            set.soccer_balls
                .into_iter()
                .filter_map(|raw| serde_json::from_value::<Detection>(raw).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(InboundMessage::Detections {
        balls,
        is_goal_moment: response.is_goal_moment.unwrap_or(false),
    })
}

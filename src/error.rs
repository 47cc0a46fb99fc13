//! Error taxonomy for the detection pipeline.
//!
//! None of these are fatal to the process. Connection and capture errors are
//! recovered inside the component that raised them (retry, notice or no-op);
//! protocol errors are logged and the offending message is dropped. A
//! detection that fails the validity filter is not an error at all.

use thiserror::Error;

/// Transport-level failure on the detection channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("socket i/o failed: {0}")]
    Io(String),

    #[error("connection closed")]
    Closed,
}

/// Malformed or unexpected inbound message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("non-text payload")]
    NonText,

    #[error("payload is not a JSON object or array")]
    NotStructured,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("unrecognized message shape")]
    UnrecognizedShape,
}

/// Capture device or recorder rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("already recording")]
    AlreadyRecording,

    #[error("capture device is not ready yet")]
    DeviceNotReady,

    #[error("capture device torn down: {0}")]
    DeviceGone(String),

    #[error("capture failed: {0}")]
    Transient(String),
}

impl CaptureError {
    /// Whether the frame scheduler must stop after this error.
    ///
    /// Only a torn-down device halts scheduling; everything else is retried on
    /// the next tick.
    pub fn is_fatal_to_streaming(&self) -> bool {
        matches!(self, CaptureError::DeviceGone(_))
    }
}

/// Invalid geometry input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

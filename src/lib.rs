//! Goal Sentinel
//!
//! Streams camera frames to a remote ball-detection service, checks each
//! reported ball against a goal region the user drew on screen, and starts a
//! bounded clip recording when the ball enters the goal.
//!
//! # Pipeline
//!
//! ```text
//! FrameScheduler -> FrameGrabber -> DetectionChannel ~~ws~~> detection service
//!                                          |
//!   CaptureController <- OverlapEventTracker <- overlap test <- DetectionFilter
//! ```
//!
//! 1. Every second, while connected, focused and not annotating, one low
//!    quality JPEG is captured and sent as `{image, timestamp}`.
//! 2. Inbound `{success, detections: {soccer_balls}}` messages are validated;
//!    anything else is logged and dropped.
//! 3. The highest-confidence valid ball is rescaled from the frame into the
//!    viewport and its box is tested against the goal region's box.
//! 4. A rising overlap edge outside the 3 s cooldown, with no recording
//!    running, starts a recording capped at 10 s.
//!
//! # Module Structure
//!
//! - `geometry`: rectangles, rescaling, overlap test
//! - `annotation`: the four-corner goal region
//! - `detect`: detection records and the validity filter
//! - `tracker`: overlap edges, cooldown, banner and presence timers
//! - `transport`: wire protocol, connection lifecycle, websocket pump
//! - `scheduler`: frame cadence and gating
//! - `capture`: recording control and recorders
//! - `ingest`: frame grabbers
//! - `session`: the single-threaded reactive core
//! - `runtime`: threads and the event loop around the session
//! - `config`: file and environment configuration

pub mod annotation;
pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod geometry;
pub mod ingest;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod tracker;
pub mod transport;

pub use annotation::{AnnotationState, AnnotationStore, PointOutcome};
pub use capture::{CaptureController, CommandRecorder, LoggingRecorder, Recorder};
pub use config::SentinelConfig;
pub use detect::{Detection, DetectionFilter, FilterSettings};
pub use error::{CaptureError, ConnectionError, GeometryError, ProtocolError};
pub use geometry::{
    bounding_rect, rectangles_overlap, rescale, BoundingRect, FrameDimensions, Point, Viewport,
};
pub use ingest::{open_grabber, CapturedFrame, FrameGrabber};
pub use runtime::{Presenter, Runtime, RuntimeEvent};
pub use scheduler::FrameScheduler;
pub use session::{Command, Notice, Session, SessionAction, SessionSettings, SessionStatus};
pub use tracker::{EventBanner, OverlapEventTracker, PresenceIndicator};
pub use transport::{ConnectionState, DetectionChannel, InboundMessage, LinkEvent, Payload};

/// Recorder for the configured command, or a log-only one.
pub fn recorder_for(command: Option<&str>) -> Box<dyn Recorder> {
    match command {
        Some(cmd) => Box::new(CommandRecorder::new(cmd)),
        None => Box::new(LoggingRecorder::new()),
    }
}

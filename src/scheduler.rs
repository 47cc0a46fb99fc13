//! Frame cadence.
//!
//! The scheduler owns the fixed-interval tick and decides, at each tick, whether
//! a capture may be dispatched. Capture itself runs elsewhere; its completion
//! comes back through [`FrameScheduler::on_captured`] or
//! [`FrameScheduler::on_failed`]. The tick never waits for a capture: a slow
//! capture only causes later ticks to be skipped while it is still in flight.

use serde::Serialize;

use crate::error::CaptureError;
use crate::geometry::FrameDimensions;
use crate::ingest::CapturedFrame;

pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 1_000;

/// Conditions outside the scheduler that must all hold for a capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameGate {
    pub connected: bool,
    pub view_active: bool,
    pub annotating: bool,
}

impl FrameGate {
    fn blocked_by(&self) -> Option<&'static str> {
        if !self.view_active {
            Some("view inactive")
        } else if !self.connected {
            Some("channel not connected")
        } else if self.annotating {
            Some("annotation in progress")
        } else {
            None
        }
    }
}

/// A capture dispatched by a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRequest {
    pub seq: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub captures_requested: u64,
    pub captures_completed: u64,
    pub captures_failed: u64,
    pub ticks_skipped: u64,
}

pub struct FrameScheduler {
    interval_ms: u64,
    streaming: bool,
    halted: Option<String>,
    next_tick_ms: Option<u64>,
    in_flight: Option<u64>,
    seq: u64,
    frame_dims: FrameDimensions,
    fallback_dims: FrameDimensions,
    stats: SchedulerStats,
}

impl FrameScheduler {
    pub fn new(interval_ms: u64, fallback_dims: FrameDimensions) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            streaming: true,
            halted: None,
            next_tick_ms: None,
            in_flight: None,
            seq: 0,
            frame_dims: fallback_dims,
            fallback_dims,
            stats: SchedulerStats::default(),
        }
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn set_streaming(&mut self, enabled: bool) {
        if self.streaming != enabled {
            log::info!("streaming {}", if enabled { "enabled" } else { "disabled" });
        }
        self.streaming = enabled;
    }

    pub fn is_running(&self) -> bool {
        self.next_tick_ms.is_some()
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn is_capture_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Dimensions of the most recent captured frame, or the fallback.
    pub fn frame_dimensions(&self) -> FrameDimensions {
        self.frame_dims
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.next_tick_ms
    }

    /// Arm the cadence; the first tick is one interval from `now_ms`.
    pub fn start(&mut self, now_ms: u64) {
        if self.halted.is_some() {
            return;
        }
        if self.next_tick_ms.is_none() {
            log::debug!("frame cadence started ({} ms)", self.interval_ms);
            self.next_tick_ms = Some(now_ms.saturating_add(self.interval_ms));
        }
    }

    pub fn stop(&mut self) {
        if self.next_tick_ms.take().is_some() {
            log::debug!("frame cadence stopped");
        }
    }

    /// Forget the session: stop ticking, disown any capture in flight, clear a
    /// halt, and drop back to the fallback dimensions.
    pub fn reset(&mut self) {
        self.stop();
        self.in_flight = None;
        self.halted = None;
        self.frame_dims = self.fallback_dims;
    }

    /// Handle a tick if one is due. Returns a capture to dispatch, if allowed.
    pub fn poll(&mut self, now_ms: u64, gate: FrameGate) -> Option<CaptureRequest> {
        let due = self.next_tick_ms?;
        if now_ms < due {
            return None;
        }
        // Fixed cadence: missed ticks collapse into one.
        let missed = (now_ms - due) / self.interval_ms;
        self.next_tick_ms = Some(due + (missed + 1) * self.interval_ms);

        let blocked = if !self.streaming {
            Some("streaming disabled")
        } else if self.in_flight.is_some() {
            Some("previous capture still in flight")
        } else {
            gate.blocked_by()
        };
        if let Some(reason) = blocked {
            self.stats.ticks_skipped += 1;
            log::debug!("tick skipped: {}", reason);
            return None;
        }

        self.seq += 1;
        self.in_flight = Some(self.seq);
        self.stats.captures_requested += 1;
        Some(CaptureRequest { seq: self.seq })
    }

    /// Record a completed capture. Returns false for a capture this scheduler
    /// no longer owns; such a frame must not be sent.
    pub fn on_captured(&mut self, seq: u64, frame: &CapturedFrame) -> bool {
        if self.in_flight != Some(seq) {
            log::debug!("discarding stale capture #{}", seq);
            return false;
        }
        self.in_flight = None;
        self.stats.captures_completed += 1;
        match FrameDimensions::new(frame.width, frame.height) {
            Ok(dims) => self.frame_dims = dims,
            Err(_) => log::warn!(
                "capture #{} reported empty size {}x{}",
                seq,
                frame.width,
                frame.height
            ),
        }
        true
    }

    /// Record a failed capture. Returns true when scheduling has been halted.
    pub fn on_failed(&mut self, seq: u64, error: &CaptureError) -> bool {
        if self.in_flight != Some(seq) {
            return false;
        }
        self.in_flight = None;
        self.stats.captures_failed += 1;
        if error.is_fatal_to_streaming() {
            log::warn!("frame capture halted: {}", error);
            self.halted = Some(error.to_string());
            self.stop();
            true
        } else {
            log::debug!("capture #{} failed: {}", seq, error);
            false
        }
    }
}

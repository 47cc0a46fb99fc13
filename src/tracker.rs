//! Debounced goal-event tracking.
//!
//! Three independent timers live here:
//! - [`OverlapEventTracker`]: edge detection on the per-frame overlap signal
//!   plus the cooldown that rate-limits the recording trigger.
//! - [`EventBanner`]: the short cosmetic "goal" flash raised on every rising
//!   edge, cooldown or not.
//! - [`PresenceIndicator`]: "a valid ball was seen recently", re-armed by
//!   every valid detection and decaying after a quiet window.
//!
//! All timestamps are milliseconds on the caller's monotonic clock.

pub const DEFAULT_COOLDOWN_MS: u64 = 3_000;
pub const DEFAULT_BANNER_MS: u64 = 1_500;
pub const DEFAULT_PRESENCE_WINDOW_MS: u64 = 1_000;

/// Edge classification of one update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Steady,
}

/// What one overlap update produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlapUpdate {
    pub edge: Edge,
    /// Whether the caller should fire the side effect now.
    pub trigger: bool,
    /// Set when a rising edge was held back by cooldown or a busy action.
    pub suppressed: Option<Suppression>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Suppression {
    /// Milliseconds left before another trigger is allowed.
    Cooldown(u64),
    Busy,
}

/// Previous-overlap flag and last-trigger time for one session.
///
/// `reset` must be called when the view loses focus so that no stale cooldown
/// or overlap carries into the next session.
#[derive(Clone, Debug)]
pub struct OverlapEventTracker {
    cooldown_ms: u64,
    is_overlapping: bool,
    last_trigger_ms: Option<u64>,
}

impl Default for OverlapEventTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_MS)
    }
}

impl OverlapEventTracker {
    pub fn new(cooldown_ms: u64) -> Self {
        Self {
            cooldown_ms,
            is_overlapping: false,
            last_trigger_ms: None,
        }
    }

    pub fn is_overlapping(&self) -> bool {
        self.is_overlapping
    }

    pub fn last_trigger_ms(&self) -> Option<u64> {
        self.last_trigger_ms
    }

    pub fn update(&mut self, current: bool, now_ms: u64, is_busy: bool) -> OverlapUpdate {
        let previous = self.is_overlapping;
        self.is_overlapping = current;

        let edge = match (previous, current) {
            (false, true) => Edge::Rising,
            (true, false) => Edge::Falling,
            _ => Edge::Steady,
        };

        if edge != Edge::Rising {
            return OverlapUpdate {
                edge,
                trigger: false,
                suppressed: None,
            };
        }

        let elapsed = self
            .last_trigger_ms
            .map(|last| now_ms.saturating_sub(last));
        let cooled = elapsed.map_or(true, |e| e > self.cooldown_ms);

        let suppressed = if !cooled {
            let e = elapsed.unwrap_or(0);
            Some(Suppression::Cooldown(self.cooldown_ms.saturating_sub(e)))
        } else if is_busy {
            Some(Suppression::Busy)
        } else {
            None
        };

        if suppressed.is_none() {
            self.last_trigger_ms = Some(now_ms);
        }

        OverlapUpdate {
            edge,
            trigger: suppressed.is_none(),
            suppressed,
        }
    }

    /// Forget the previous frame's overlap so the next overlap is a fresh
    /// rising edge. The cooldown is kept.
    pub fn clear_overlap(&mut self) {
        self.is_overlapping = false;
    }

    pub fn reset(&mut self) {
        self.is_overlapping = false;
        self.last_trigger_ms = None;
    }
}

/// Fixed-length cosmetic flash.
#[derive(Clone, Debug)]
pub struct EventBanner {
    duration_ms: u64,
    until_ms: Option<u64>,
}

impl Default for EventBanner {
    fn default() -> Self {
        Self::new(DEFAULT_BANNER_MS)
    }
}

impl EventBanner {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            until_ms: None,
        }
    }

    /// Raise (or extend) the banner. Returns true if it was not already up.
    pub fn raise(&mut self, now_ms: u64) -> bool {
        let was_up = self.until_ms.is_some();
        self.until_ms = Some(now_ms + self.duration_ms);
        !was_up
    }

    pub fn is_active(&self) -> bool {
        self.until_ms.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.until_ms
    }

    /// Lower the banner once its window has passed. Returns true on lowering.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.until_ms {
            Some(until) if now_ms >= until => {
                self.until_ms = None;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.until_ms = None;
    }
}

/// Debounce-with-refresh "ball seen recently" flag.
#[derive(Clone, Debug)]
pub struct PresenceIndicator {
    window_ms: u64,
    expires_ms: Option<u64>,
    confidence: f64,
}

impl Default for PresenceIndicator {
    fn default() -> Self {
        Self::new(DEFAULT_PRESENCE_WINDOW_MS)
    }
}

impl PresenceIndicator {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            expires_ms: None,
            confidence: 0.0,
        }
    }

    /// Feed one evaluation. Only a valid detection re-arms the countdown; a
    /// frame without one leaves the pending countdown alone.
    ///
    /// Returns true when the flag flipped to present.
    pub fn observe(&mut self, valid: Option<f64>, now_ms: u64) -> bool {
        let Some(confidence) = valid else {
            return false;
        };
        let was_present = self.is_present();
        self.expires_ms = Some(now_ms + self.window_ms);
        self.confidence = confidence;
        !was_present
    }

    pub fn is_present(&self) -> bool {
        self.expires_ms.is_some()
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn deadline(&self) -> Option<u64> {
        self.expires_ms
    }

    /// Flip to absent if the countdown elapsed. Returns true on flip.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.expires_ms {
            Some(expires) if now_ms >= expires => {
                self.expires_ms = None;
                self.confidence = 0.0;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.expires_ms = None;
        self.confidence = 0.0;
    }
}

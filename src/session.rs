//! The detection session.
//!
//! `Session` is the single owner of every piece of mutable pipeline state:
//! connection, frame cadence, annotation, overlap tracking and recording. It
//! reacts to discrete events (user command, link event, capture completion,
//! device ready, timer) and never blocks. Work it cannot do itself is queued
//! as a [`SessionAction`] for the runtime to carry out; anything the user
//! should see is queued as a [`Notice`].
//!
//! Inbound detections are evaluated synchronously inside the link-event
//! handler, so one message's overlap test and trigger complete before the next
//! message is looked at.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use url::Url;

use crate::annotation::{AnnotationState, AnnotationStore, PointOutcome};
use crate::capture::{
    CaptureController, Recorder, RecordingHandle, StoppedRecording, DEFAULT_MAX_RECORDING_MS,
};
use crate::detect::{DetectionFilter, FilterSettings};
use crate::error::CaptureError;
use crate::geometry::{rectangles_overlap, to_viewport, BoundingRect, FrameDimensions, Point, Viewport};
use crate::ingest::CapturedFrame;
use crate::scheduler::{FrameGate, FrameScheduler, SchedulerStats, DEFAULT_FRAME_INTERVAL_MS};
use crate::tracker::{Edge, EventBanner, OverlapEventTracker, PresenceIndicator, Suppression};
use crate::transport::{
    ChannelStats, ConnectRequest, ConnectionState, DetectionChannel, FramePayload, InboundMessage,
    LinkEvent, DEFAULT_RECONNECT_DELAY_MS,
};

/// Timing and tuning for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub frame_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub connect_delay_ms: u64,
    pub cooldown_ms: u64,
    pub banner_ms: u64,
    pub presence_window_ms: u64,
    pub ready_settle_ms: u64,
    pub max_recording_ms: u64,
    pub capture_quality: f32,
    pub codec_hint: Option<String>,
    pub viewport: Viewport,
    pub fallback_frame: FrameDimensions,
    pub filter: FilterSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            retry_delay_ms: 1_000,
            connect_delay_ms: 300,
            cooldown_ms: 3_000,
            banner_ms: 1_500,
            presence_window_ms: 1_000,
            ready_settle_ms: 500,
            max_recording_ms: DEFAULT_MAX_RECORDING_MS,
            capture_quality: 0.05,
            codec_hint: None,
            viewport: Viewport {
                width: 390.0,
                height: 761.0,
            },
            fallback_frame: FrameDimensions::FALLBACK,
            filter: FilterSettings::default(),
        }
    }
}

/// User-facing controls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    Focus,
    Blur,
    BeginAnnotation,
    AddPoint(Point),
    CancelAnnotation,
    ClearAnnotation,
    StartRecording,
    StopRecording,
    Retry,
    SetStreaming(bool),
}

/// Side effects the runtime must perform for the session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionAction {
    Connect(ConnectRequest),
    Capture { seq: u64, quality: f32 },
    /// The view came up; the device should report readiness when it can.
    PrepareDevice,
}

/// Things the user should be told about.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    Connection(ConnectionState),
    /// Connection attempt failed; `retry` is available.
    ConnectionFailed(String),
    ReconnectScheduled { at_ms: u64 },
    ServiceFailure(String),
    DeviceReady,
    CaptureHalted(String),
    CaptureRejected(CaptureError),
    AnnotationStarted,
    AnnotationProgress(usize),
    AnnotationComplete([Point; 4]),
    AnnotationCleared,
    BallPresence { present: bool, confidence: f64 },
    GoalEntered,
    GoalLeft,
    TriggerSuppressed(Suppression),
    Banner(bool),
    RecordingStarted { handle: RecordingHandle, triggered: bool },
    RecordingStopped(StoppedRecording),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Connection(state) => write!(f, "connection: {}", state),
            Notice::ConnectionFailed(e) => {
                write!(f, "cannot reach detection server ({}); type `retry` to try again", e)
            }
            Notice::ReconnectScheduled { at_ms } => write!(f, "reconnecting at t={}ms", at_ms),
            Notice::ServiceFailure(msg) => write!(f, "detection failed: {}", msg),
            Notice::DeviceReady => write!(f, "camera ready"),
            Notice::CaptureHalted(e) => write!(f, "frame capture stopped: {}", e),
            Notice::CaptureRejected(e) => write!(f, "cannot record: {}", e),
            Notice::AnnotationStarted => {
                write!(f, "goal annotation: tap the 4 corners clockwise")
            }
            Notice::AnnotationProgress(n) => write!(f, "goal corner {}/4", n),
            Notice::AnnotationComplete(points) => {
                write!(f, "goal region saved:")?;
                for (i, p) in points.iter().enumerate() {
                    write!(f, " corner{}=({:.0}, {:.0})", i + 1, p.x, p.y)?;
                }
                Ok(())
            }
            Notice::AnnotationCleared => write!(f, "goal annotation cleared"),
            Notice::BallPresence { present: true, confidence } => {
                write!(f, "ball detected ({:.0}%)", confidence * 100.0)
            }
            Notice::BallPresence { present: false, .. } => write!(f, "no ball"),
            Notice::GoalEntered => write!(f, "ball entered goal region"),
            Notice::GoalLeft => write!(f, "ball left goal region"),
            Notice::TriggerSuppressed(Suppression::Cooldown(left)) => {
                write!(f, "trigger suppressed: cooldown ({}ms left)", left)
            }
            Notice::TriggerSuppressed(Suppression::Busy) => {
                write!(f, "trigger suppressed: already recording")
            }
            Notice::Banner(true) => write!(f, "GOAL!"),
            Notice::Banner(false) => write!(f, "goal banner cleared"),
            Notice::RecordingStarted { handle, triggered } => write!(
                f,
                "recording #{} started{}",
                handle.0,
                if *triggered { " (goal)" } else { "" }
            ),
            Notice::RecordingStopped(stopped) => write!(
                f,
                "recording #{} stopped after {:.1}s{}",
                stopped.handle.0,
                stopped.duration_ms as f64 / 1000.0,
                if stopped.timed_out { " (limit reached)" } else { "" }
            ),
        }
    }
}

/// Snapshot for the `status` command.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionStatus {
    pub connection: String,
    pub last_error: Option<String>,
    pub view_active: bool,
    pub streaming: bool,
    pub capture_halted: Option<String>,
    pub device_ready: bool,
    pub recording: bool,
    pub annotation: String,
    pub region: Option<Vec<Point>>,
    pub has_ball_recently: bool,
    pub confidence: f64,
    pub overlapping: bool,
    pub banner: bool,
    pub last_ball: Option<BoundingRect>,
    pub frame: FrameDimensions,
    pub channel: ChannelStats,
    pub frames: SchedulerStats,
}

pub struct Session {
    settings: SessionSettings,
    channel: DetectionChannel,
    scheduler: FrameScheduler,
    filter: DetectionFilter,
    annotation: AnnotationStore,
    tracker: OverlapEventTracker,
    banner: EventBanner,
    presence: PresenceIndicator,
    capture: CaptureController,
    view_active: bool,
    ready_at_ms: Option<u64>,
    last_ball: Option<BoundingRect>,
    actions: Vec<SessionAction>,
    notices: Vec<Notice>,
}

impl Session {
    pub fn new(settings: SessionSettings, server: Url, recorder: Box<dyn Recorder>) -> Self {
        let channel = DetectionChannel::new(server, settings.reconnect_delay_ms);
        let scheduler = FrameScheduler::new(settings.frame_interval_ms, settings.fallback_frame);
        let capture = CaptureController::new(recorder, settings.max_recording_ms)
            .with_codec_hint(settings.codec_hint.clone());
        Self {
            channel,
            scheduler,
            filter: DetectionFilter::new(settings.filter),
            annotation: AnnotationStore::new(),
            tracker: OverlapEventTracker::new(settings.cooldown_ms),
            banner: EventBanner::new(settings.banner_ms),
            presence: PresenceIndicator::new(settings.presence_window_ms),
            capture,
            view_active: false,
            ready_at_ms: None,
            last_ball: None,
            actions: Vec::new(),
            notices: Vec::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn channel(&self) -> &DetectionChannel {
        &self.channel
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    pub fn annotation(&self) -> &AnnotationStore {
        &self.annotation
    }

    pub fn tracker(&self) -> &OverlapEventTracker {
        &self.tracker
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn is_view_active(&self) -> bool {
        self.view_active
    }

    pub fn take_actions(&mut self) -> Vec<SessionAction> {
        std::mem::take(&mut self.actions)
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Earliest instant at which `on_timer` has something to do.
    pub fn next_deadline(&self) -> Option<u64> {
        [
            self.channel.pending_connect(),
            self.ready_at_ms,
            self.scheduler.next_deadline(),
            self.banner.deadline(),
            self.presence.deadline(),
            self.capture.deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            connection: self.channel.state().to_string(),
            last_error: self.channel.last_error().map(|e| e.to_string()),
            view_active: self.view_active,
            streaming: self.scheduler.is_streaming(),
            capture_halted: self.scheduler.halt_reason().map(str::to_string),
            device_ready: self.capture.is_ready(),
            recording: self.capture.is_busy(),
            annotation: match self.annotation.state() {
                AnnotationState::Idle if self.annotation.is_collecting() => "collecting",
                AnnotationState::Idle => "idle",
                AnnotationState::Collecting => "collecting",
                AnnotationState::Complete => "complete",
            }
            .to_string(),
            region: self.annotation.region().map(<[Point]>::to_vec),
            has_ball_recently: self.presence.is_present(),
            confidence: self.presence.confidence(),
            overlapping: self.tracker.is_overlapping(),
            banner: self.banner.is_active(),
            last_ball: self.last_ball,
            frame: self.scheduler.frame_dimensions(),
            channel: self.channel.stats(),
            frames: self.scheduler.stats().clone(),
        }
    }

    pub fn handle_command(&mut self, command: Command, now_ms: u64) {
        let before = self.channel.state();
        match command {
            Command::Focus => self.focus(now_ms),
            Command::Blur => self.blur(now_ms),
            Command::BeginAnnotation => {
                self.annotation.begin();
                self.tracker.clear_overlap();
                self.notices.push(Notice::AnnotationStarted);
            }
            Command::AddPoint(point) => self.add_point(point),
            Command::CancelAnnotation | Command::ClearAnnotation => {
                self.annotation.clear();
                self.tracker.clear_overlap();
                self.notices.push(Notice::AnnotationCleared);
            }
            Command::StartRecording => self.start_recording(now_ms, false),
            Command::StopRecording => {
                if let Some(stopped) = self.capture.stop(now_ms) {
                    self.notices.push(Notice::RecordingStopped(stopped));
                }
            }
            Command::Retry => {
                log::info!("manual retry requested");
                self.channel.close();
                self.channel
                    .schedule_connect(now_ms + self.settings.retry_delay_ms);
            }
            Command::SetStreaming(enabled) => self.scheduler.set_streaming(enabled),
        }
        self.note_connection(before);
    }

    fn focus(&mut self, now_ms: u64) {
        if self.view_active {
            return;
        }
        log::info!("view active");
        self.view_active = true;
        self.scheduler.set_streaming(true);
        self.scheduler.start(now_ms);
        self.channel
            .schedule_connect(now_ms + self.settings.connect_delay_ms);
        self.actions.push(SessionAction::PrepareDevice);
    }

    /// Leaving the view tears the session down to its initial state.
    fn blur(&mut self, now_ms: u64) {
        if !self.view_active {
            return;
        }
        log::info!("view inactive");
        self.view_active = false;
        self.scheduler.set_streaming(false);
        self.scheduler.reset();
        self.channel.close();
        self.tracker.reset();
        self.banner.reset();
        self.presence.reset();
        self.last_ball = None;
        if let Some(stopped) = self.capture.reset(now_ms) {
            self.notices.push(Notice::RecordingStopped(stopped));
        }
        self.capture.mark_unready();
        self.ready_at_ms = None;
        if self.annotation.state() != AnnotationState::Idle || self.annotation.is_collecting() {
            self.annotation.clear();
            self.notices.push(Notice::AnnotationCleared);
        }
    }

    fn add_point(&mut self, point: Point) {
        if !self.annotation.is_collecting() {
            log::debug!("tap ignored: not annotating");
            return;
        }
        match self.annotation.add_point(point) {
            PointOutcome::Added(n) => self.notices.push(Notice::AnnotationProgress(n)),
            PointOutcome::Completed(points) => {
                log::info!(
                    "goal region complete: {}",
                    points
                        .iter()
                        .map(|p| format!("({:.0}, {:.0})", p.x, p.y))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                self.notices.push(Notice::AnnotationComplete(points));
            }
            PointOutcome::Ignored => log::debug!("tap ignored: region complete"),
        }
    }

    fn start_recording(&mut self, now_ms: u64, triggered: bool) {
        match self.capture.start(now_ms) {
            Ok(handle) => self
                .notices
                .push(Notice::RecordingStarted { handle, triggered }),
            Err(e) => {
                log::warn!("recording rejected: {}", e);
                self.notices.push(Notice::CaptureRejected(e));
            }
        }
    }

    pub fn on_link_event(&mut self, event: LinkEvent, now_ms: u64) {
        let before = self.channel.state();
        match event {
            LinkEvent::Opened { attempt, handle } => {
                self.channel.on_open(attempt, handle);
            }
            LinkEvent::Failed { attempt, error } => {
                let message = error.to_string();
                if self.channel.on_error(attempt, error) {
                    self.notices.push(Notice::ConnectionFailed(message));
                }
            }
            LinkEvent::Message { attempt, payload } => {
                if let Some(message) = self.channel.receive(attempt, &payload) {
                    self.evaluate(message, now_ms);
                }
            }
            LinkEvent::Closed { attempt, code } => {
                if let Some(at_ms) = self.channel.on_close(attempt, code, now_ms, self.view_active)
                {
                    self.notices.push(Notice::ReconnectScheduled { at_ms });
                }
            }
        }
        self.note_connection(before);
    }

    fn evaluate(&mut self, message: InboundMessage, now_ms: u64) {
        let (balls, is_goal_moment) = match message {
            InboundMessage::Failure { message } => {
                let message = message.unwrap_or_else(|| "unknown error".to_string());
                log::info!("detection service reported failure: {}", message);
                self.notices.push(Notice::ServiceFailure(message));
                return;
            }
            InboundMessage::Detections {
                balls,
                is_goal_moment,
            } => (balls, is_goal_moment),
        };

        let summary = self.filter.summarize(&balls);
        let primary = summary.primary.as_ref();
        log::debug!(
            "{} detections ({} valid), primary {:?}",
            summary.received,
            summary.valid,
            primary.map(|d| d.confidence)
        );

        if self.presence.observe(primary.map(|d| d.confidence), now_ms) {
            self.notices.push(Notice::BallPresence {
                present: true,
                confidence: self.presence.confidence(),
            });
        }

        let frame = self.scheduler.frame_dimensions();
        let ball = primary
            .and_then(|d| d.bbox4())
            .map(|b| to_viewport(b, frame, self.settings.viewport));
        self.last_ball = ball;
        let overlap = match (ball, self.annotation.region_rect()) {
            (Some(ball), Some(region)) => rectangles_overlap(&ball, &region),
            _ => false,
        };

        let update = self
            .tracker
            .update(overlap, now_ms, self.capture.is_busy());
        match update.edge {
            Edge::Rising => {
                log::info!("ball entered goal region");
                self.notices.push(Notice::GoalEntered);
            }
            Edge::Falling => {
                log::debug!("ball left goal region");
                self.notices.push(Notice::GoalLeft);
            }
            Edge::Steady => {}
        }
        if update.trigger {
            self.start_recording(now_ms, true);
        }
        if let Some(suppression) = update.suppressed {
            log::info!("recording trigger suppressed: {:?}", suppression);
            self.notices.push(Notice::TriggerSuppressed(suppression));
        }
        if (update.edge == Edge::Rising || is_goal_moment) && self.banner.raise(now_ms) {
            self.notices.push(Notice::Banner(true));
        }
    }

    /// A capture dispatched by this session finished.
    pub fn on_frame_captured(&mut self, seq: u64, frame: CapturedFrame) {
        if !self.scheduler.on_captured(seq, &frame) {
            return;
        }
        let payload = FramePayload::from_base64_jpeg(&frame.jpeg_base64, epoch_ms());
        match payload.to_json() {
            Ok(json) => {
                self.channel.send(json);
            }
            Err(e) => log::warn!("frame not sent: {}", e),
        }
    }

    pub fn on_capture_failed(&mut self, seq: u64, error: CaptureError) {
        if self.scheduler.on_failed(seq, &error) {
            self.notices.push(Notice::CaptureHalted(error.to_string()));
        }
    }

    /// Device-ready callback. Recording is allowed once the settle delay passes.
    pub fn on_device_ready(&mut self, now_ms: u64) {
        if !self.view_active {
            log::debug!("device ready ignored: view inactive");
            return;
        }
        if self.capture.is_ready() || self.ready_at_ms.is_some() {
            return;
        }
        self.ready_at_ms = Some(now_ms + self.settings.ready_settle_ms);
    }

    pub fn on_timer(&mut self, now_ms: u64) {
        let before = self.channel.state();

        if let Some(request) = self.channel.poll_connect(now_ms, self.view_active) {
            self.actions.push(SessionAction::Connect(request));
        }

        if matches!(self.ready_at_ms, Some(at) if now_ms >= at) {
            self.ready_at_ms = None;
            self.capture.mark_ready();
            self.notices.push(Notice::DeviceReady);
        }

        let gate = FrameGate {
            connected: self.channel.is_connected(),
            view_active: self.view_active,
            annotating: self.annotation.is_collecting(),
        };
        if let Some(request) = self.scheduler.poll(now_ms, gate) {
            self.actions.push(SessionAction::Capture {
                seq: request.seq,
                quality: self.settings.capture_quality,
            });
        }

        if self.banner.poll(now_ms) {
            self.notices.push(Notice::Banner(false));
        }
        if self.presence.poll(now_ms) {
            self.notices.push(Notice::BallPresence {
                present: false,
                confidence: 0.0,
            });
        }
        if let Some(stopped) = self.capture.poll(now_ms) {
            self.notices.push(Notice::RecordingStopped(stopped));
        }

        self.note_connection(before);
    }

    /// Stop recording and close the channel normally.
    pub fn shutdown(&mut self, now_ms: u64) {
        let before = self.channel.state();
        if let Some(stopped) = self.capture.stop(now_ms) {
            self.notices.push(Notice::RecordingStopped(stopped));
        }
        self.channel.close();
        self.scheduler.reset();
        self.view_active = false;
        self.note_connection(before);
    }

    fn note_connection(&mut self, before: ConnectionState) {
        let after = self.channel.state();
        if after != before {
            self.notices.push(Notice::Connection(after));
        }
    }
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::LoggingRecorder;
    use crate::detect::Detection;
    use crate::transport::channel::tests::RecordingConnection;
    use crate::transport::{Payload, ABNORMAL_CLOSE};

    fn session() -> Session {
        let settings = SessionSettings {
            viewport: Viewport {
                width: 100.0,
                height: 100.0,
            },
            fallback_frame: FrameDimensions::new(100, 100).unwrap(),
            ..SessionSettings::default()
        };
        Session::new(
            settings,
            Url::parse("ws://127.0.0.1:8000/ws").unwrap(),
            Box::new(LoggingRecorder::new()),
        )
    }

    fn connect_request(session: &mut Session) -> ConnectRequest {
        session
            .take_actions()
            .into_iter()
            .find_map(|a| match a {
                SessionAction::Connect(request) => Some(request),
                _ => None,
            })
            .expect("connect action")
    }

    /// Focus, connect, open and mark the device ready. Returns the connection.
    fn live(session: &mut Session) -> RecordingConnection {
        session.handle_command(Command::Focus, 0);
        session.on_timer(300);
        let request = connect_request(session);
        let conn = RecordingConnection::default();
        session.on_link_event(
            LinkEvent::Opened {
                attempt: request.attempt,
                handle: Box::new(conn.clone()),
            },
            310,
        );
        session.on_device_ready(320);
        session.on_timer(820);
        assert!(session.capture().is_ready());
        session.take_notices();
        conn
    }

    fn annotate_unit_square(session: &mut Session) {
        session.handle_command(Command::BeginAnnotation, 0);
        for (x, y) in [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)] {
            session.handle_command(Command::AddPoint(Point::new(x, y)), 0);
        }
    }

    fn balls(session: &mut Session, bbox: [f64; 4], now_ms: u64) {
        let attempt = 1;
        let text = serde_json::json!({
            "success": true,
            "detections": { "soccer_balls": [Detection::new(bbox, 0.9)] },
        })
        .to_string();
        session.on_link_event(
            LinkEvent::Message {
                attempt,
                payload: Payload::Text(text),
            },
            now_ms,
        );
    }

    #[test]
    fn focus_defers_connect() {
        let mut s = session();
        s.handle_command(Command::Focus, 1_000);
        assert_eq!(s.take_actions(), vec![SessionAction::PrepareDevice]);
        assert_eq!(s.next_deadline(), Some(1_300));
        s.on_timer(1_299);
        assert!(s.take_actions().is_empty());
        s.on_timer(1_300);
        assert!(matches!(
            s.take_actions().as_slice(),
            [SessionAction::Connect(_)]
        ));
        assert_eq!(s.channel().state(), ConnectionState::Connecting);
    }

    #[test]
    fn blur_before_deferred_connect_cancels_it() {
        let mut s = session();
        s.handle_command(Command::Focus, 0);
        s.handle_command(Command::Blur, 100);
        s.on_timer(300);
        assert!(!s
            .take_actions()
            .iter()
            .any(|a| matches!(a, SessionAction::Connect(_))));
    }

    #[test]
    fn overlap_triggers_recording_and_banner() {
        let mut s = session();
        live(&mut s);
        annotate_unit_square(&mut s);
        s.take_notices();

        balls(&mut s, [5.0, 5.0, 25.0, 25.0], 1_000);
        let notices = s.take_notices();
        assert!(notices.contains(&Notice::GoalEntered));
        assert!(notices.contains(&Notice::Banner(true)));
        assert!(notices
            .iter()
            .any(|n| matches!(n, Notice::RecordingStarted { triggered: true, .. })));
        assert!(s.capture().is_busy());
        assert_eq!(s.tracker().last_trigger_ms(), Some(1_000));
    }

    #[test]
    fn no_region_means_no_overlap() {
        let mut s = session();
        live(&mut s);
        balls(&mut s, [5.0, 5.0, 25.0, 25.0], 1_000);
        assert!(!s.tracker().is_overlapping());
        assert!(!s.capture().is_busy());
        assert!(s.status().has_ball_recently);
    }

    #[test]
    fn trigger_before_ready_is_rejected_with_notice() {
        let mut s = session();
        s.handle_command(Command::Focus, 0);
        s.on_timer(300);
        let request = connect_request(&mut s);
        s.on_link_event(
            LinkEvent::Opened {
                attempt: request.attempt,
                handle: Box::new(RecordingConnection::default()),
            },
            310,
        );
        annotate_unit_square(&mut s);
        s.take_notices();
        balls(&mut s, [5.0, 5.0, 25.0, 25.0], 1_000);
        assert!(s
            .take_notices()
            .contains(&Notice::CaptureRejected(CaptureError::DeviceNotReady)));
    }

    #[test]
    fn goal_moment_hint_raises_banner_only() {
        let mut s = session();
        live(&mut s);
        let text = r#"{"success": true, "detections": {"soccer_balls": []}, "is_goal_moment": true}"#;
        s.on_link_event(
            LinkEvent::Message {
                attempt: 1,
                payload: Payload::Text(text.to_string()),
            },
            1_000,
        );
        assert_eq!(s.take_notices(), vec![Notice::Banner(true)]);
        assert!(!s.capture().is_busy());
        s.on_timer(2_500);
        assert!(s.take_notices().contains(&Notice::Banner(false)));
    }

    #[test]
    fn frames_are_sent_when_connected() {
        let mut s = session();
        let conn = live(&mut s);
        s.on_timer(1_000);
        let seq = match s.take_actions().as_slice() {
            [SessionAction::Capture { seq, quality }] => {
                assert_eq!(*quality, 0.05);
                *seq
            }
            other => panic!("unexpected actions {:?}", other),
        };
        s.on_frame_captured(
            seq,
            CapturedFrame {
                jpeg_base64: "QUJD".to_string(),
                width: 640,
                height: 480,
            },
        );
        let sent = conn.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("data:image/jpeg;base64,QUJD"));
        assert_eq!(s.status().frame, FrameDimensions::new(640, 480).unwrap());
    }

    #[test]
    fn annotating_pauses_capture() {
        let mut s = session();
        live(&mut s);
        s.handle_command(Command::BeginAnnotation, 900);
        s.on_timer(1_000);
        assert!(s.take_actions().is_empty());
        s.handle_command(Command::CancelAnnotation, 1_500);
        s.on_timer(2_000);
        assert_eq!(s.take_actions().len(), 1);
    }

    #[test]
    fn abnormal_close_reconnects_only_while_active() {
        let mut s = session();
        live(&mut s);
        s.on_link_event(
            LinkEvent::Closed {
                attempt: 1,
                code: ABNORMAL_CLOSE,
            },
            5_000,
        );
        assert!(s
            .take_notices()
            .contains(&Notice::ReconnectScheduled { at_ms: 8_000 }));
        s.handle_command(Command::Blur, 6_000);
        s.on_timer(8_000);
        assert!(!s
            .take_actions()
            .iter()
            .any(|a| matches!(a, SessionAction::Connect(_))));
    }

    #[test]
    fn connect_error_offers_manual_retry() {
        let mut s = session();
        s.handle_command(Command::Focus, 0);
        s.on_timer(300);
        let request = connect_request(&mut s);
        s.on_link_event(
            LinkEvent::Failed {
                attempt: request.attempt,
                error: crate::error::ConnectionError::Connect("refused".into()),
            },
            400,
        );
        assert_eq!(s.channel().state(), ConnectionState::Error);
        assert!(s
            .take_notices()
            .iter()
            .any(|n| matches!(n, Notice::ConnectionFailed(_))));
        assert_eq!(s.channel().pending_connect(), None);

        s.handle_command(Command::Retry, 1_000);
        s.on_timer(1_999);
        assert!(s.take_actions().is_empty());
        s.on_timer(2_000);
        assert!(matches!(
            s.take_actions().as_slice(),
            [SessionAction::Connect(_)]
        ));
    }

    #[test]
    fn blur_resets_session_state() {
        let mut s = session();
        live(&mut s);
        annotate_unit_square(&mut s);
        balls(&mut s, [5.0, 5.0, 25.0, 25.0], 1_000);
        assert!(s.capture().is_busy());

        s.handle_command(Command::Blur, 2_000);
        assert!(!s.capture().is_busy());
        assert!(!s.capture().is_ready());
        assert!(!s.tracker().is_overlapping());
        assert_eq!(s.tracker().last_trigger_ms(), None);
        assert_eq!(s.annotation().state(), AnnotationState::Idle);
        assert_eq!(s.channel().state(), ConnectionState::Disconnected);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn recording_stops_at_limit() {
        let mut s = session();
        live(&mut s);
        s.handle_command(Command::StartRecording, 1_000);
        assert!(s.capture().is_busy());
        s.on_timer(11_000);
        assert!(s
            .take_notices()
            .iter()
            .any(|n| matches!(n, Notice::RecordingStopped(stopped) if stopped.timed_out)));
        assert!(!s.capture().is_busy());
    }

    #[test]
    fn service_failure_is_reported() {
        let mut s = session();
        live(&mut s);
        s.on_link_event(
            LinkEvent::Message {
                attempt: 1,
                payload: Payload::Text(r#"{"success": false, "error": "model not loaded"}"#.into()),
            },
            1_000,
        );
        assert_eq!(
            s.take_notices(),
            vec![Notice::ServiceFailure("model not loaded".to_string())]
        );
    }
}

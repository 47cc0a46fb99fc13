//! End-to-end scenarios through the public session API.
//!
//! These drive a `Session` the way the runtime does (commands, link events,
//! timer polls) with a fake connection in place of the socket, and check:
//! 1. A ball box overlapping the goal box starts a recording
//! 2. The trigger cooldown and the busy guard
//! 3. Reconnect after an abnormal close, and its cancellation on focus loss
//! 4. Malformed traffic is dropped without touching the connection
//! 5. Normalized boxes are rescaled before the overlap test

use std::sync::{Arc, Mutex};

use goal_sentinel::transport::{ConnectionHandle, ABNORMAL_CLOSE, NORMAL_CLOSE};
use goal_sentinel::{
    bounding_rect, rectangles_overlap, BoundingRect, Command, ConnectionError, ConnectionState,
    Detection, DetectionFilter, FilterSettings, FrameDimensions, LinkEvent, LoggingRecorder,
    Notice, OverlapEventTracker, Payload, Point, Session, SessionAction, SessionSettings, Viewport,
};
use url::Url;

#[derive(Clone, Default)]
struct FakeConnection {
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

impl ConnectionHandle for FakeConnection {
    fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&mut self, code: u16) {
        *self.closed_with.lock().unwrap() = Some(code);
    }
}

struct Harness {
    session: Session,
    attempt: u64,
    conn: FakeConnection,
}

impl Harness {
    fn new(settings: SessionSettings) -> Self {
        let session = Session::new(
            settings,
            Url::parse("ws://127.0.0.1:8000/ws").unwrap(),
            Box::new(LoggingRecorder::new()),
        );
        Self {
            session,
            attempt: 0,
            conn: FakeConnection::default(),
        }
    }

    /// Viewport and frame both 100x100, so boxes map one-to-one.
    fn identity() -> Self {
        Self::new(SessionSettings {
            viewport: Viewport::new(100.0, 100.0).unwrap(),
            fallback_frame: FrameDimensions::new(100, 100).unwrap(),
            ..SessionSettings::default()
        })
    }

    fn connect_action(&mut self) -> Option<u64> {
        self.session.take_actions().into_iter().find_map(|a| match a {
            SessionAction::Connect(request) => Some(request.attempt),
            _ => None,
        })
    }

    fn open(&mut self, attempt: u64, now_ms: u64) {
        self.attempt = attempt;
        self.conn = FakeConnection::default();
        self.session.on_link_event(
            LinkEvent::Opened {
                attempt,
                handle: Box::new(self.conn.clone()),
            },
            now_ms,
        );
    }

    /// Focused, connected and ready to record by t=1000.
    fn go_live(&mut self) {
        self.session.handle_command(Command::Focus, 0);
        self.session.on_timer(300);
        let attempt = self.connect_action().expect("connect after focus");
        self.open(attempt, 350);
        self.session.on_device_ready(400);
        self.session.on_timer(900);
        assert!(self.session.capture().is_ready());
        self.session.take_notices();
    }

    fn draw_goal(&mut self, corners: [(f64, f64); 4]) {
        self.session.handle_command(Command::BeginAnnotation, 0);
        for (x, y) in corners {
            self.session
                .handle_command(Command::AddPoint(Point::new(x, y)), 0);
        }
        self.session.take_notices();
    }

    fn text(&mut self, text: &str, now_ms: u64) -> Vec<Notice> {
        self.session.on_link_event(
            LinkEvent::Message {
                attempt: self.attempt,
                payload: Payload::Text(text.to_string()),
            },
            now_ms,
        );
        self.session.take_notices()
    }

    fn ball(&mut self, bbox: [f64; 4], now_ms: u64) -> Vec<Notice> {
        let text = format!(
            r#"{{"success": true, "detections": {{"soccer_balls": [{{"bbox": [{}, {}, {}, {}], "confidence": 0.9, "center": [0, 0]}}]}}}}"#,
            bbox[0], bbox[1], bbox[2], bbox[3]
        );
        self.text(&text, now_ms)
    }
}

fn started(notices: &[Notice]) -> bool {
    notices
        .iter()
        .any(|n| matches!(n, Notice::RecordingStarted { triggered: true, .. }))
}

const UNIT_GOAL: [(f64, f64); 4] = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
const IN_GOAL: [f64; 4] = [5.0, 5.0, 25.0, 25.0];
const OUTSIDE: [f64; 4] = [50.0, 50.0, 70.0, 70.0];

#[test]
fn ball_touching_goal_starts_recording() {
    let mut h = Harness::identity();
    h.go_live();
    h.draw_goal(UNIT_GOAL);

    let notices = h.ball(IN_GOAL, 1_000);
    assert!(notices.contains(&Notice::GoalEntered));
    assert!(notices.contains(&Notice::Banner(true)));
    assert!(started(&notices));
    assert!(h.session.status().overlapping);
    assert!(h.session.status().recording);
}

#[test]
fn edge_contact_counts_as_overlap() {
    let mut h = Harness::identity();
    h.go_live();
    h.draw_goal(UNIT_GOAL);
    // Left edge of the ball sits exactly on the goal's right edge.
    let notices = h.ball([10.0, 0.0, 30.0, 20.0], 1_000);
    assert!(notices.contains(&Notice::GoalEntered));
}

#[test]
fn ten_pixel_ball_on_unit_goal_overlaps_and_triggers() {
    let corners: Vec<Point> = UNIT_GOAL.iter().map(|&(x, y)| Point::new(x, y)).collect();
    let goal = bounding_rect(&corners).unwrap();
    assert_eq!(goal, BoundingRect::new(0.0, 0.0, 10.0, 10.0));

    let ball = BoundingRect::from_box([5.0, 5.0, 15.0, 15.0]);
    assert!(rectangles_overlap(&goal, &ball));

    let mut tracker = OverlapEventTracker::default();
    assert!(tracker.update(true, 0, false).trigger);
}

#[test]
fn ten_pixel_ball_sits_on_default_filter_minimums() {
    // Width 10 and area 100 are both exclusive lower bounds.
    let filter = DetectionFilter::default();
    assert!(!filter.is_valid(&Detection::new([5.0, 5.0, 15.0, 15.0], 0.9)));
    assert!(filter.is_valid(&Detection::new([5.0, 5.0, 15.5, 15.5], 0.9)));
}

#[test]
fn ten_pixel_ball_triggers_with_relaxed_filter() {
    let mut h = Harness::new(SessionSettings {
        viewport: Viewport::new(100.0, 100.0).unwrap(),
        fallback_frame: FrameDimensions::new(100, 100).unwrap(),
        filter: FilterSettings {
            min_area: 0.0,
            min_side: 0.0,
            ..FilterSettings::default()
        },
        ..SessionSettings::default()
    });
    h.go_live();
    h.draw_goal(UNIT_GOAL);

    let notices = h.ball([5.0, 5.0, 15.0, 15.0], 1_000);
    assert!(notices.contains(&Notice::GoalEntered));
    assert!(started(&notices));
    assert_eq!(
        h.session.status().last_ball,
        Some(BoundingRect::new(5.0, 5.0, 15.0, 15.0))
    );
}

#[test]
fn cooldown_and_busy_gate_the_trigger() {
    let mut h = Harness::identity();
    h.go_live();
    h.draw_goal(UNIT_GOAL);

    assert!(started(&h.ball(IN_GOAL, 1_000)));
    h.ball(OUTSIDE, 1_500);

    let notices = h.ball(IN_GOAL, 2_000);
    assert!(!started(&notices));
    assert!(notices
        .iter()
        .any(|n| matches!(n, Notice::TriggerSuppressed(_))));
    // The banner is cosmetic and still flashes on the suppressed edge.
    assert!(h.session.status().banner);

    h.ball(OUTSIDE, 3_000);
    h.session.handle_command(Command::StopRecording, 3_500);
    assert!(started(&h.ball(IN_GOAL, 4_100)));
    assert_eq!(h.session.tracker().last_trigger_ms(), Some(4_100));
}

#[test]
fn sustained_overlap_triggers_once() {
    let mut h = Harness::identity();
    h.go_live();
    h.draw_goal(UNIT_GOAL);
    assert!(started(&h.ball(IN_GOAL, 1_000)));
    h.session.handle_command(Command::StopRecording, 1_500);
    for t in [5_000, 9_000, 20_000] {
        assert!(!started(&h.ball(IN_GOAL, t)));
    }
}

#[test]
fn invalid_or_missing_ball_reads_as_no_overlap() {
    let mut h = Harness::identity();
    h.go_live();
    h.draw_goal(UNIT_GOAL);

    // Too thin: aspect ratio 0.1.
    let notices = h.ball([0.0, 0.0, 5.0, 50.0], 1_000);
    assert!(!notices.contains(&Notice::GoalEntered));
    let notices = h.text(
        r#"{"success": true, "detections": {"soccer_balls": []}}"#,
        2_000,
    );
    assert!(notices.is_empty());
    assert!(!h.session.status().overlapping);
}

#[test]
fn normalized_boxes_are_rescaled_before_overlap() {
    let mut h = Harness::new(SessionSettings {
        viewport: Viewport::new(100.0, 200.0).unwrap(),
        fallback_frame: FrameDimensions::new(100, 200).unwrap(),
        filter: FilterSettings {
            min_area: 0.0,
            min_side: 0.0,
            ..FilterSettings::default()
        },
        ..SessionSettings::default()
    });
    h.go_live();
    // Only reachable once [0.1, 0.1, 0.5, 0.5] expands to [10, 20, 50, 100].
    h.draw_goal([(45.0, 95.0), (60.0, 95.0), (60.0, 110.0), (45.0, 110.0)]);

    let notices = h.ball([0.1, 0.1, 0.5, 0.5], 1_000);
    assert!(notices.contains(&Notice::GoalEntered));
    let ball = h.session.status().last_ball.unwrap();
    assert_eq!((ball.x1, ball.y1, ball.x2, ball.y2), (10.0, 20.0, 50.0, 100.0));
}

#[test]
fn malformed_traffic_is_dropped_and_connection_kept() {
    let mut h = Harness::identity();
    h.go_live();

    for text in [
        "hello",
        "{ broken",
        r#"{"detections": {"soccer_balls": []}}"#,
        r#"[1, 2, 3]"#,
    ] {
        assert!(h.text(text, 1_000).is_empty(), "reacted to {}", text);
    }
    h.session.on_link_event(
        LinkEvent::Message {
            attempt: h.attempt,
            payload: Payload::Binary(vec![0xff, 0xd8]),
        },
        1_000,
    );
    assert_eq!(h.session.channel().state(), ConnectionState::Connected);
    assert_eq!(h.session.channel().stats().messages_discarded, 5);
    assert_eq!(*h.conn.closed_with.lock().unwrap(), None);
}

#[test]
fn abnormal_close_reconnects_after_delay() {
    let mut h = Harness::identity();
    h.go_live();

    h.session.on_link_event(
        LinkEvent::Closed {
            attempt: h.attempt,
            code: ABNORMAL_CLOSE,
        },
        10_000,
    );
    assert_eq!(h.session.channel().state(), ConnectionState::Disconnected);
    h.session.on_timer(12_999);
    assert_eq!(h.connect_action(), None);
    h.session.on_timer(13_000);
    let attempt = h.connect_action().expect("reconnect");
    h.open(attempt, 13_100);
    assert_eq!(h.session.channel().state(), ConnectionState::Connected);
}

#[test]
fn normal_close_does_not_reconnect() {
    let mut h = Harness::identity();
    h.go_live();
    h.session.on_link_event(
        LinkEvent::Closed {
            attempt: h.attempt,
            code: NORMAL_CLOSE,
        },
        10_000,
    );
    h.session.on_timer(20_000);
    assert_eq!(h.connect_action(), None);
    assert_eq!(h.session.channel().pending_connect(), None);
}

#[test]
fn focus_loss_cancels_pending_reconnect() {
    let mut h = Harness::identity();
    h.go_live();
    h.session.on_link_event(
        LinkEvent::Closed {
            attempt: h.attempt,
            code: ABNORMAL_CLOSE,
        },
        10_000,
    );
    h.session.handle_command(Command::Blur, 11_000);
    h.session.on_timer(13_000);
    assert_eq!(h.connect_action(), None);
    assert_eq!(h.session.channel().state(), ConnectionState::Disconnected);
}

#[test]
fn focus_loss_closes_connection_normally() {
    let mut h = Harness::identity();
    h.go_live();
    h.session.handle_command(Command::Blur, 5_000);
    assert_eq!(*h.conn.closed_with.lock().unwrap(), Some(NORMAL_CLOSE));

    // A late abnormal close echo from the abandoned socket changes nothing.
    h.session.on_link_event(
        LinkEvent::Closed {
            attempt: h.attempt,
            code: ABNORMAL_CLOSE,
        },
        5_100,
    );
    assert_eq!(h.session.channel().pending_connect(), None);
}

#[test]
fn refocus_starts_a_clean_session() {
    let mut h = Harness::identity();
    h.go_live();
    h.draw_goal(UNIT_GOAL);
    assert!(started(&h.ball(IN_GOAL, 1_000)));
    h.session.handle_command(Command::Blur, 1_500);

    h.session.handle_command(Command::Focus, 2_000);
    assert!(h
        .session
        .take_actions()
        .contains(&SessionAction::PrepareDevice));
    let status = h.session.status();
    assert!(!status.recording);
    assert!(!status.device_ready);
    assert_eq!(status.region, None);
    assert_eq!(h.session.tracker().last_trigger_ms(), None);
}

#[test]
fn frames_flow_only_while_connected() {
    let mut h = Harness::identity();
    h.session.handle_command(Command::Focus, 0);
    // Not connected yet: the tick is skipped.
    h.session.on_timer(1_000);
    assert!(!h
        .session
        .take_actions()
        .iter()
        .any(|a| matches!(a, SessionAction::Capture { .. })));

    h.session.on_timer(1_001);
    h.open(1, 1_002);
    h.session.on_timer(2_000);
    let seq = h
        .session
        .take_actions()
        .into_iter()
        .find_map(|a| match a {
            SessionAction::Capture { seq, .. } => Some(seq),
            _ => None,
        })
        .expect("capture dispatched");
    h.session.on_frame_captured(
        seq,
        goal_sentinel::CapturedFrame {
            jpeg_base64: "/9j/".to_string(),
            width: 1280,
            height: 720,
        },
    );
    let sent = h.conn.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let frame: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(frame["image"], "data:image/jpeg;base64,/9j/");
    assert!(frame["timestamp"].as_i64().unwrap() > 0);
}

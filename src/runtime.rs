//! Thread model around the session.
//!
//! ```text
//! stdin reader ──┐
//! ctrl-c ────────┤
//! ws pump(s) ────┼──> events ──> session loop ──> connector / capture worker
//! capture worker ┘
//! ```
//!
//! The session loop is the only thread that touches [`Session`]. Everything
//! else talks to it over one mpsc channel, and the loop sleeps in
//! `recv_timeout` until the next event or session deadline.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::error::CaptureError;
use crate::geometry::Point;
use crate::ingest::{CapturedFrame, FrameGrabber};
use crate::session::{Command, Notice, Session, SessionAction, SessionStatus};
use crate::transport::{Connector, LinkEvent, WsConnector};

/// Longest sleep when nothing is scheduled.
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// Everything the session loop reacts to.
#[derive(Debug)]
pub enum RuntimeEvent {
    Link(LinkEvent),
    Command(Command),
    Captured {
        seq: u64,
        result: Result<CapturedFrame, CaptureError>,
    },
    DeviceReady,
    Status,
    Shutdown,
}

impl From<LinkEvent> for RuntimeEvent {
    fn from(event: LinkEvent) -> Self {
        RuntimeEvent::Link(event)
    }
}

/// Where notices and status snapshots go.
pub trait Presenter {
    fn notice(&mut self, notice: &Notice);
    fn status(&mut self, status: &SessionStatus);
}

/// Presenter that writes through the `log` facade.
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn notice(&mut self, notice: &Notice) {
        log::info!("{}", notice);
    }

    fn status(&mut self, status: &SessionStatus) {
        match serde_json::to_string(status) {
            Ok(json) => log::info!("status {}", json),
            Err(e) => log::warn!("status unavailable: {}", e),
        }
    }
}

enum CaptureJob {
    Prepare,
    Grab { seq: u64, quality: f32 },
}

pub struct Runtime {
    session: Session,
    connector: Box<dyn Connector>,
    capture: Sender<CaptureJob>,
    events: Receiver<RuntimeEvent>,
    sender: Sender<RuntimeEvent>,
    worker: Option<JoinHandle<()>>,
    started: Instant,
}

impl Runtime {
    /// Wire the session to a websocket connector and a capture worker.
    pub fn new(session: Session, grabber: Box<dyn FrameGrabber>) -> Result<Self> {
        let (sender, events) = mpsc::channel();
        let connector = Box::new(WsConnector::new(sender.clone()));
        Self::with_connector(session, grabber, connector, sender, events)
    }

    /// As `new`, with a caller-supplied connector reporting into `sender`.
    pub fn with_connector(
        session: Session,
        grabber: Box<dyn FrameGrabber>,
        connector: Box<dyn Connector>,
        sender: Sender<RuntimeEvent>,
        events: Receiver<RuntimeEvent>,
    ) -> Result<Self> {
        let (capture, jobs) = mpsc::channel();
        let worker = spawn_capture_worker(grabber, jobs, sender.clone())?;
        Ok(Self {
            session,
            connector,
            capture,
            events,
            sender,
            worker: Some(worker),
            started: Instant::now(),
        })
    }

    /// Handle for other threads to post events.
    pub fn sender(&self) -> Sender<RuntimeEvent> {
        self.sender.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Run until a `Shutdown` event arrives.
    pub fn run(&mut self, presenter: &mut dyn Presenter) -> Result<()> {
        loop {
            self.dispatch(presenter);

            let now = self.now_ms();
            let wait = self
                .session
                .next_deadline()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
                .unwrap_or(IDLE_WAIT)
                .min(IDLE_WAIT);

            match self.events.recv_timeout(wait) {
                Ok(RuntimeEvent::Shutdown) => {
                    log::info!("shutting down");
                    self.session.shutdown(self.now_ms());
                    self.dispatch(presenter);
                    return Ok(());
                }
                Ok(event) => self.handle(event, presenter),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("event channel closed"));
                }
            }
            self.session.on_timer(self.now_ms());
        }
    }

    fn handle(&mut self, event: RuntimeEvent, presenter: &mut dyn Presenter) {
        let now = self.now_ms();
        match event {
            RuntimeEvent::Link(event) => self.session.on_link_event(event, now),
            RuntimeEvent::Command(command) => self.session.handle_command(command, now),
            RuntimeEvent::Captured { seq, result } => match result {
                Ok(frame) => self.session.on_frame_captured(seq, frame),
                Err(e) => self.session.on_capture_failed(seq, e),
            },
            RuntimeEvent::DeviceReady => self.session.on_device_ready(now),
            RuntimeEvent::Status => presenter.status(&self.session.status()),
            RuntimeEvent::Shutdown => {}
        }
    }

    fn dispatch(&mut self, presenter: &mut dyn Presenter) {
        for action in self.session.take_actions() {
            match action {
                SessionAction::Connect(request) => self.connector.open(request),
                SessionAction::Capture { seq, quality } => {
                    if self.capture.send(CaptureJob::Grab { seq, quality }).is_err() {
                        self.session.on_capture_failed(
                            seq,
                            CaptureError::DeviceGone("capture worker stopped".to_string()),
                        );
                    }
                }
                SessionAction::PrepareDevice => {
                    if self.capture.send(CaptureJob::Prepare).is_err() {
                        log::warn!("capture worker stopped; device will never be ready");
                    }
                }
            }
        }
        for notice in self.session.take_notices() {
            presenter.notice(&notice);
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Closing the job queue ends the worker.
        let (closed, _) = mpsc::channel();
        self.capture = closed;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn spawn_capture_worker(
    mut grabber: Box<dyn FrameGrabber>,
    jobs: Receiver<CaptureJob>,
    events: Sender<RuntimeEvent>,
) -> Result<JoinHandle<()>> {
    log::info!("capture source: {}", grabber.describe());
    thread::Builder::new()
        .name("capture".to_string())
        .spawn(move || {
            for job in jobs {
                let event = match job {
                    CaptureJob::Prepare => RuntimeEvent::DeviceReady,
                    CaptureJob::Grab { seq, quality } => RuntimeEvent::Captured {
                        seq,
                        result: grabber.capture(quality),
                    },
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        })
        .context("spawn capture worker")
}

/// Post an event to the session loop. Fails once the loop has stopped.
pub fn post(events: &Sender<RuntimeEvent>, event: RuntimeEvent) -> Result<()> {
    // SendError carries the event back, and link events are not Sync.
    events
        .send(event)
        .map_err(|_| anyhow!("session loop has stopped"))
}

/// Read commands from stdin and post them to the session loop. End of input
/// is treated as `quit`.
pub fn spawn_command_reader(events: Sender<RuntimeEvent>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command_line(&line) {
                    Ok(event) => {
                        let quit = matches!(event, RuntimeEvent::Shutdown);
                        if events.send(event).is_err() || quit {
                            return;
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            let _ = events.send(RuntimeEvent::Shutdown);
        })
        .context("spawn stdin reader")
}

pub const COMMAND_HELP: &str = "commands: annotate | point X Y | cancel | clear | record | stop | \
retry | focus | blur | stream on|off | status | quit";

/// Parse one line of user input.
pub fn parse_command_line(line: &str) -> Result<RuntimeEvent, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = words.collect();
    let command = match (verb.as_str(), args.as_slice()) {
        ("annotate", []) => Command::BeginAnnotation,
        ("point", [x, y]) => {
            let x: f64 = x.parse().map_err(|_| format!("invalid x: {}", x))?;
            let y: f64 = y.parse().map_err(|_| format!("invalid y: {}", y))?;
            Command::AddPoint(Point::new(x, y))
        }
        ("cancel", []) => Command::CancelAnnotation,
        ("clear", []) => Command::ClearAnnotation,
        ("record", []) => Command::StartRecording,
        ("stop", []) => Command::StopRecording,
        ("retry", []) => Command::Retry,
        ("focus", []) => Command::Focus,
        ("blur", []) => Command::Blur,
        ("stream", ["on"]) => Command::SetStreaming(true),
        ("stream", ["off"]) => Command::SetStreaming(false),
        ("status", []) => return Ok(RuntimeEvent::Status),
        ("quit" | "exit", []) => return Ok(RuntimeEvent::Shutdown),
        _ => return Err(format!("unrecognized command `{}`; {}", line.trim(), COMMAND_HELP)),
    };
    Ok(RuntimeEvent::Command(command))
}

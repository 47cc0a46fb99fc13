//! Recording control.
//!
//! `CaptureController` wraps the external recorder with the rules the trigger
//! path depends on: one recording at a time, nothing before the device has
//! signalled readiness, and a hard cap on clip length. Clip storage belongs to
//! the recorder; the controller only tracks handles and deadlines.

use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::error::CaptureError;

pub const DEFAULT_MAX_RECORDING_MS: u64 = 10_000;

/// Opaque token for a running recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordingHandle(pub u64);

/// Recording side of the camera collaborator.
pub trait Recorder: Send {
    fn describe(&self) -> String;

    fn start_recording(
        &mut self,
        max_duration: Duration,
        codec_hint: Option<&str>,
    ) -> Result<RecordingHandle, CaptureError>;

    /// Fails if `handle` is not the recording in progress.
    fn stop_recording(&mut self, handle: RecordingHandle) -> Result<(), CaptureError>;
}

/// Recorder that only logs. Used when no recorder command is configured.
#[derive(Default)]
pub struct LoggingRecorder {
    next_id: u64,
    active: Option<RecordingHandle>,
}

impl LoggingRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Recorder for LoggingRecorder {
    fn describe(&self) -> String {
        "log-only recorder".to_string()
    }

    fn start_recording(
        &mut self,
        max_duration: Duration,
        codec_hint: Option<&str>,
    ) -> Result<RecordingHandle, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        self.next_id += 1;
        let handle = RecordingHandle(self.next_id);
        log::info!(
            "recording #{} started (max {}s, codec {})",
            handle.0,
            max_duration.as_secs(),
            codec_hint.unwrap_or("default")
        );
        self.active = Some(handle);
        Ok(handle)
    }

    fn stop_recording(&mut self, handle: RecordingHandle) -> Result<(), CaptureError> {
        match self.active {
            Some(active) if active == handle => {
                self.active = None;
                log::info!("recording #{} stopped", handle.0);
                Ok(())
            }
            _ => Err(CaptureError::Transient(format!(
                "recording #{} is not running",
                handle.0
            ))),
        }
    }
}

/// Recorder that runs an external command for the lifetime of a clip.
///
/// `{duration_secs}` and `{codec}` in the template are substituted before the
/// command is split on whitespace. Stopping kills the child.
pub struct CommandRecorder {
    template: String,
    next_id: u64,
    active: Option<(RecordingHandle, Child)>,
}

impl CommandRecorder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            next_id: 0,
            active: None,
        }
    }

    fn render(&self, max_duration: Duration, codec_hint: Option<&str>) -> Vec<String> {
        self.template
            .replace("{duration_secs}", &max_duration.as_secs().to_string())
            .replace("{codec}", codec_hint.unwrap_or("h264"))
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

impl Recorder for CommandRecorder {
    fn describe(&self) -> String {
        format!("command recorder `{}`", self.template)
    }

    fn start_recording(
        &mut self,
        max_duration: Duration,
        codec_hint: Option<&str>,
    ) -> Result<RecordingHandle, CaptureError> {
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        let argv = self.render(max_duration, codec_hint);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| CaptureError::DeviceGone("recorder command is empty".to_string()))?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::Transient(format!("spawn {}: {}", program, e)))?;
        self.next_id += 1;
        let handle = RecordingHandle(self.next_id);
        log::info!("recording #{} started: pid {}", handle.0, child.id());
        self.active = Some((handle, child));
        Ok(handle)
    }

    fn stop_recording(&mut self, handle: RecordingHandle) -> Result<(), CaptureError> {
        match self.active.take() {
            Some((active, mut child)) if active == handle => {
                if let Ok(Some(status)) = child.try_wait() {
                    log::debug!("recorder exited early with {}", status);
                    return Ok(());
                }
                child
                    .kill()
                    .map_err(|e| CaptureError::Transient(format!("kill recorder: {}", e)))?;
                let _ = child.wait();
                Ok(())
            }
            other => {
                self.active = other;
                Err(CaptureError::Transient(format!(
                    "recording #{} is not running",
                    handle.0
                )))
            }
        }
    }
}

impl Drop for CommandRecorder {
    fn drop(&mut self) {
        if let Some((_, mut child)) = self.active.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording {
        handle: RecordingHandle,
        started_at_ms: u64,
        deadline_ms: u64,
    },
}

/// A finished recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoppedRecording {
    pub handle: RecordingHandle,
    pub duration_ms: u64,
    pub timed_out: bool,
}

pub struct CaptureController {
    recorder: Box<dyn Recorder>,
    max_duration_ms: u64,
    codec_hint: Option<String>,
    ready: bool,
    state: RecordingState,
    recordings_started: u64,
}

impl CaptureController {
    pub fn new(recorder: Box<dyn Recorder>, max_duration_ms: u64) -> Self {
        Self {
            recorder,
            max_duration_ms,
            codec_hint: None,
            ready: false,
            state: RecordingState::Idle,
            recordings_started: 0,
        }
    }

    pub fn with_codec_hint(mut self, codec: Option<String>) -> Self {
        self.codec_hint = codec;
        self
    }

    pub fn describe(&self) -> String {
        self.recorder.describe()
    }

    /// Device readiness, signalled by the capture collaborator.
    pub fn mark_ready(&mut self) {
        if !self.ready {
            log::info!("capture device ready");
        }
        self.ready = true;
    }

    /// The device went away with the view; a fresh ready signal is needed.
    pub fn mark_unready(&mut self) {
        self.ready = false;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, RecordingState::Recording { .. })
    }

    pub fn recordings_started(&self) -> u64 {
        self.recordings_started
    }

    /// When the running recording must be stopped automatically.
    pub fn deadline(&self) -> Option<u64> {
        match self.state {
            RecordingState::Recording { deadline_ms, .. } => Some(deadline_ms),
            RecordingState::Idle => None,
        }
    }

    pub fn start(&mut self, now_ms: u64) -> Result<RecordingHandle, CaptureError> {
        if self.is_busy() {
            return Err(CaptureError::AlreadyRecording);
        }
        if !self.ready {
            return Err(CaptureError::DeviceNotReady);
        }
        let handle = self.recorder.start_recording(
            Duration::from_millis(self.max_duration_ms),
            self.codec_hint.as_deref(),
        )?;
        self.recordings_started += 1;
        self.state = RecordingState::Recording {
            handle,
            started_at_ms: now_ms,
            deadline_ms: now_ms.saturating_add(self.max_duration_ms),
        };
        Ok(handle)
    }

    /// No-op when idle. A recorder failure still leaves the controller idle.
    pub fn stop(&mut self, now_ms: u64) -> Option<StoppedRecording> {
        self.finish(now_ms, false)
    }

    /// Enforce the duration cap.
    pub fn poll(&mut self, now_ms: u64) -> Option<StoppedRecording> {
        match self.deadline() {
            Some(deadline) if now_ms >= deadline => self.finish(now_ms, true),
            _ => None,
        }
    }

    /// Stop anything in flight. Readiness is left to the caller.
    pub fn reset(&mut self, now_ms: u64) -> Option<StoppedRecording> {
        self.stop(now_ms)
    }

    fn finish(&mut self, now_ms: u64, timed_out: bool) -> Option<StoppedRecording> {
        let RecordingState::Recording {
            handle,
            started_at_ms,
            ..
        } = self.state
        else {
            return None;
        };
        self.state = RecordingState::Idle;
        if let Err(e) = self.recorder.stop_recording(handle) {
            log::warn!("stop recording #{}: {}", handle.0, e);
        }
        Some(StoppedRecording {
            handle,
            duration_ms: now_ms.saturating_sub(started_at_ms),
            timed_out,
        })
    }
}

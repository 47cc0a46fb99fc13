use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::detect::FilterSettings;
use crate::geometry::{FrameDimensions, Viewport};
use crate::session::SessionSettings;
use crate::transport::parse_server_endpoint;

const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:8000/ws";
const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_QUALITY: f32 = 0.05;
const DEFAULT_VIEWPORT_WIDTH: f64 = 390.0;
const DEFAULT_VIEWPORT_HEIGHT: f64 = 761.0;

pub const CONFIG_ENV: &str = "GOAL_SENTINEL_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct SentinelConfigFile {
    server: Option<ServerConfigFile>,
    timing: Option<TimingConfigFile>,
    capture: Option<CaptureConfigFile>,
    viewport: Option<ViewportConfigFile>,
    filter: Option<FilterSettings>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingConfigFile {
    frame_interval_ms: Option<u64>,
    reconnect_delay_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
    connect_delay_ms: Option<u64>,
    cooldown_ms: Option<u64>,
    banner_ms: Option<u64>,
    presence_window_ms: Option<u64>,
    ready_settle_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    source: Option<String>,
    quality: Option<f32>,
    max_recording_ms: Option<u64>,
    codec_hint: Option<String>,
    recorder_command: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ViewportConfigFile {
    width: Option<f64>,
    height: Option<f64>,
    fallback_frame_width: Option<u32>,
    fallback_frame_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingSettings {
    pub frame_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub connect_delay_ms: u64,
    pub cooldown_ms: u64,
    pub banner_ms: u64,
    pub presence_window_ms: u64,
    pub ready_settle_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub source: String,
    pub quality: f32,
    pub max_recording_ms: u64,
    pub codec_hint: Option<String>,
    pub recorder_command: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportSettings {
    pub width: f64,
    pub height: f64,
    pub fallback_frame_width: u32,
    pub fallback_frame_height: u32,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub server_url: Url,
    pub timing: TimingSettings,
    pub capture: CaptureSettings,
    pub viewport: ViewportSettings,
    pub filter: FilterSettings,
}

impl SentinelConfig {
    /// Defaults, then the file named by `GOAL_SENTINEL_CONFIG`, then env.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, but with an explicit config file.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentinelConfigFile) -> Result<Self> {
        let server_url = parse_server_endpoint(
            file.server
                .as_ref()
                .and_then(|server| server.url.as_deref())
                .unwrap_or(DEFAULT_SERVER_URL),
        )?;

        let defaults = SessionSettings::default();
        let timing = file.timing.unwrap_or_default();
        let timing = TimingSettings {
            frame_interval_ms: timing.frame_interval_ms.unwrap_or(defaults.frame_interval_ms),
            reconnect_delay_ms: timing
                .reconnect_delay_ms
                .unwrap_or(defaults.reconnect_delay_ms),
            retry_delay_ms: timing.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
            connect_delay_ms: timing.connect_delay_ms.unwrap_or(defaults.connect_delay_ms),
            cooldown_ms: timing.cooldown_ms.unwrap_or(defaults.cooldown_ms),
            banner_ms: timing.banner_ms.unwrap_or(defaults.banner_ms),
            presence_window_ms: timing
                .presence_window_ms
                .unwrap_or(defaults.presence_window_ms),
            ready_settle_ms: timing.ready_settle_ms.unwrap_or(defaults.ready_settle_ms),
        };

        let capture = file.capture.unwrap_or_default();
        let capture = CaptureSettings {
            source: capture.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            quality: capture.quality.unwrap_or(DEFAULT_QUALITY),
            max_recording_ms: capture
                .max_recording_ms
                .unwrap_or(defaults.max_recording_ms),
            codec_hint: capture.codec_hint.filter(|c| !c.trim().is_empty()),
            recorder_command: capture.recorder_command.filter(|c| !c.trim().is_empty()),
        };

        let viewport = file.viewport.unwrap_or_default();
        let viewport = ViewportSettings {
            width: viewport.width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
            height: viewport.height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
            fallback_frame_width: viewport
                .fallback_frame_width
                .unwrap_or(FrameDimensions::FALLBACK.w),
            fallback_frame_height: viewport
                .fallback_frame_height
                .unwrap_or(FrameDimensions::FALLBACK.h),
        };

        Ok(Self {
            server_url,
            timing,
            capture,
            viewport,
            filter: file.filter.unwrap_or_default(),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("GOAL_SENTINEL_SERVER_URL") {
            if !url.trim().is_empty() {
                self.set_server_url(&url)?;
            }
        }
        if let Ok(source) = std::env::var("GOAL_SENTINEL_SOURCE") {
            if !source.trim().is_empty() {
                self.capture.source = source;
            }
        }
        if let Ok(viewport) = std::env::var("GOAL_SENTINEL_VIEWPORT") {
            if !viewport.trim().is_empty() {
                self.set_viewport(&viewport)?;
            }
        }
        if let Ok(cooldown) = std::env::var("GOAL_SENTINEL_COOLDOWN_MS") {
            self.timing.cooldown_ms = cooldown.trim().parse().map_err(|_| {
                anyhow!("GOAL_SENTINEL_COOLDOWN_MS must be an integer number of milliseconds")
            })?;
        }
        if let Ok(cmd) = std::env::var("GOAL_SENTINEL_RECORDER_CMD") {
            if !cmd.trim().is_empty() {
                self.capture.recorder_command = Some(cmd);
            }
        }
        Ok(())
    }

    pub fn set_server_url(&mut self, addr: &str) -> Result<()> {
        self.server_url = parse_server_endpoint(addr)?;
        Ok(())
    }

    /// Set the viewport from a `WxH` string.
    pub fn set_viewport(&mut self, value: &str) -> Result<()> {
        let (width, height) = parse_dimensions(value)?;
        self.viewport.width = width;
        self.viewport.height = height;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        for (name, value) in [
            ("timing.frame_interval_ms", t.frame_interval_ms),
            ("timing.reconnect_delay_ms", t.reconnect_delay_ms),
            ("timing.banner_ms", t.banner_ms),
            ("timing.presence_window_ms", t.presence_window_ms),
            ("capture.max_recording_ms", self.capture.max_recording_ms),
        ] {
            if value == 0 {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }
        if !(self.capture.quality > 0.0 && self.capture.quality <= 1.0) {
            return Err(anyhow!("capture.quality must be in (0, 1]"));
        }
        if self.capture.source.trim().is_empty() {
            return Err(anyhow!("capture.source must not be empty"));
        }
        Viewport::new(self.viewport.width, self.viewport.height)
            .map_err(|e| anyhow!("viewport: {}", e))?;
        FrameDimensions::new(
            self.viewport.fallback_frame_width,
            self.viewport.fallback_frame_height,
        )
        .map_err(|e| anyhow!("fallback frame: {}", e))?;

        let f = &self.filter;
        if !(f.min_aspect < f.max_aspect) {
            return Err(anyhow!("filter.min_aspect must be below filter.max_aspect"));
        }
        if !(f.min_area < f.max_area) {
            return Err(anyhow!("filter.min_area must be below filter.max_area"));
        }
        if !(0.0..1.0).contains(&f.min_confidence) {
            return Err(anyhow!("filter.min_confidence must be in [0, 1)"));
        }
        match self.server_url.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(anyhow!("server url must be ws or wss, got {}", other)),
        }
    }

    pub fn session_settings(&self) -> Result<SessionSettings> {
        Ok(SessionSettings {
            frame_interval_ms: self.timing.frame_interval_ms,
            reconnect_delay_ms: self.timing.reconnect_delay_ms,
            retry_delay_ms: self.timing.retry_delay_ms,
            connect_delay_ms: self.timing.connect_delay_ms,
            cooldown_ms: self.timing.cooldown_ms,
            banner_ms: self.timing.banner_ms,
            presence_window_ms: self.timing.presence_window_ms,
            ready_settle_ms: self.timing.ready_settle_ms,
            max_recording_ms: self.capture.max_recording_ms,
            capture_quality: self.capture.quality,
            codec_hint: self.capture.codec_hint.clone(),
            viewport: Viewport::new(self.viewport.width, self.viewport.height)
                .map_err(|e| anyhow!("viewport: {}", e))?,
            fallback_frame: FrameDimensions::new(
                self.viewport.fallback_frame_width,
                self.viewport.fallback_frame_height,
            )
            .map_err(|e| anyhow!("fallback frame: {}", e))?,
            filter: self.filter,
        })
    }
}

fn read_config_file(path: &Path) -> Result<SentinelConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Parse `WxH` (also accepts `W,H`).
pub fn parse_dimensions(value: &str) -> Result<(f64, f64)> {
    let (w, h) = value
        .trim()
        .split_once(|c| c == 'x' || c == 'X' || c == ',')
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got {}", value))?;
    let width: f64 = w
        .trim()
        .parse()
        .with_context(|| format!("invalid width in {}", value))?;
    let height: f64 = h
        .trim()
        .parse()
        .with_context(|| format!("invalid height in {}", value))?;
    if !(width > 0.0 && height > 0.0) {
        return Err(anyhow!("dimensions must be positive: {}", value));
    }
    Ok((width, height))
}

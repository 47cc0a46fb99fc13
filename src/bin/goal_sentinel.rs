//! goal_sentinel - Watch a goal with a camera and record when the ball goes in.
//!
//! 1. Captures frames from the configured source and streams them to the
//!    detection service over a websocket
//! 2. Tests each detected ball against the goal region drawn with `annotate`
//!    and `point X Y`
//! 3. Starts a short recording when the ball enters the goal
//!
//! Controls are read from stdin, one command per line.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use goal_sentinel::config::CONFIG_ENV;
use goal_sentinel::runtime::{post, spawn_command_reader, COMMAND_HELP};
use goal_sentinel::transport::is_loopback;
use goal_sentinel::{
    open_grabber, recorder_for, Command, Notice, Presenter, Runtime, RuntimeEvent,
    SentinelConfig, Session, SessionStatus,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream camera frames to a ball detector and record goals"
)]
struct Args {
    /// Config file (JSON, or TOML by extension).
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Detection server, e.g. ws://10.0.0.50:8000/ws or http://10.0.0.50:8000.
    #[arg(long, env = "GOAL_SENTINEL_SERVER_URL")]
    server_url: Option<String>,

    /// Capture source: stub://camera, file:///path/to/stills or http://camera/capture.
    #[arg(long, env = "GOAL_SENTINEL_SOURCE")]
    source: Option<String>,

    /// Viewport size as WIDTHxHEIGHT.
    #[arg(long, env = "GOAL_SENTINEL_VIEWPORT")]
    viewport: Option<String>,

    /// Start unfocused; send `focus` to begin.
    #[arg(long)]
    no_autofocus: bool,
}

struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn notice(&mut self, notice: &Notice) {
        println!("{}", notice);
    }

    fn status(&mut self, status: &SessionStatus) {
        match serde_json::to_string_pretty(status) {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("status unavailable: {}", e),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = SentinelConfig::load_from(args.config.as_deref())?;
    if let Some(url) = args.server_url.as_deref() {
        config.set_server_url(url)?;
    }
    if let Some(source) = args.source {
        config.capture.source = source;
    }
    if let Some(viewport) = args.viewport.as_deref() {
        config.set_viewport(viewport)?;
    }
    config.validate()?;

    if !is_loopback(&config.server_url) {
        log::warn!(
            "Detection server {} is remote - frames leave this machine",
            config.server_url
        );
    }

    let grabber = open_grabber(&config.capture.source)?;
    let recorder = recorder_for(config.capture.recorder_command.as_deref());

    log::info!("goal sentinel starting");
    log::info!("  detection server: {}", config.server_url);
    log::info!("  capture source: {}", grabber.describe());
    log::info!("  recorder: {}", recorder.describe());
    log::info!(
        "  viewport: {}x{}",
        config.viewport.width,
        config.viewport.height
    );

    let session = Session::new(
        config.session_settings()?,
        config.server_url.clone(),
        recorder,
    );
    let mut runtime = Runtime::new(session, grabber)?;

    let shutdown = runtime.sender();
    ctrlc::set_handler(move || {
        let _ = shutdown.send(RuntimeEvent::Shutdown);
    })
    .context("install ctrl-c handler")?;

    spawn_command_reader(runtime.sender())?;
    if !args.no_autofocus {
        post(&runtime.sender(), RuntimeEvent::Command(Command::Focus))
            .context("post initial focus")?;
    }
    println!("{}", COMMAND_HELP);

    runtime.run(&mut ConsolePresenter)?;
    log::info!("goal sentinel stopped");
    Ok(())
}

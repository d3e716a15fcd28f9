// src/main.rs
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info, warn};

use gesture_arm::config::ControlConfig;
use gesture_arm::data::SessionRecorder;
use gesture_arm::landmarks::LandmarkFeed;
use gesture_arm::pipeline::{DisplayState, GesturePipeline};
use gesture_arm::protocol::ProtocolClient;

#[derive(Parser, Debug)]
#[command(name = "gesture_arm", about = "Drive a 6-axis arm from hand-gesture landmarks")]
struct Cli {
    /// JSON config file (defaults are used for missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Controller host, overrides the config
    #[arg(long)]
    host: Option<String>,

    /// Controller port, overrides the config
    #[arg(long)]
    port: Option<u16>,

    /// Landmark feed, one JSON frame per line (default: stdin)
    #[arg(long)]
    feed: Option<PathBuf>,

    /// Recalibrate the pinch reference every time the pinch is released
    #[arg(long)]
    reset_on_release: bool,

    /// Do not write the session CSV
    #[arg(long)]
    no_record: bool,

    /// Directory for session recordings
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesture_arm=info".into()),
        )
        .init();

    let config = load_config(&cli)?;
    info!(
        pinch_threshold_px = config.pinch_threshold_px,
        pixels_per_cm = config.pixels_per_cm,
        step = config.adjustment_step,
        "gesture_arm v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let addr = config.controller_addr();
    let mut client = match ProtocolClient::connect(
        &addr,
        config.connect_timeout(),
        config.response_timeout(),
        config.response_buffer_size,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("{}. Is the controller program running?", e);
            return Err(e).context("Cannot start without a controller connection");
        }
    };

    let reader: Box<dyn BufRead> = match &cli.feed {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open feed {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let mut pipeline = GesturePipeline::new(&config);
    let mut recorder = if config.record_session {
        let recorder = SessionRecorder::new(&config.output_directory, None)?;
        info!("recording session to {}", recorder.csv_path().display());
        Some(recorder)
    } else {
        None
    };
    let started = Instant::now();

    for frame in LandmarkFeed::new(reader) {
        let hand = match frame {
            Ok(hand) => hand,
            Err(e) => {
                warn!("skipping frame: {}", e);
                None
            }
        };

        let report = pipeline.process_frame(hand.as_ref(), &mut client);
        if report.engaged() {
            debug!(display = ?DisplayState::from(&report), "frame");
        }
        let record_err = recorder.as_mut().and_then(|rec| {
            rec.add_frame(&report, pipeline.joints().values(), started.elapsed().as_secs_f64())
                .err()
        });
        if let Some(e) = record_err {
            error!("failed to record frame, recording stopped: {:#}", e);
            recorder = None;
        }
    }

    let stats = client.stats();
    info!(sent = stats.sent, confirmed = stats.confirmed, failed = stats.failed, "feed ended");

    if let Some(recorder) = recorder {
        let summary = recorder.summary();
        info!(
            frames = summary.frames,
            hand_frames = summary.hand_frames,
            engaged_frames = summary.engaged_frames,
            adjustments = summary.adjustments,
            "session {} finished",
            recorder.session_name()
        );
        match recorder.finish() {
            Ok(path) => info!("session written to {}", path.display()),
            Err(e) => error!("failed to write session: {:#}", e),
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ControlConfig> {
    let mut config = match &cli.config {
        Some(path) => ControlConfig::load(path)?,
        None => ControlConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.reset_on_release {
        config.reset_reference_on_release = true;
    }
    if cli.no_record {
        config.record_session = false;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_directory = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

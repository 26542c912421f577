//! detect_once - run one video through the detector once
//!
//! Processes the video from the start frame to its end, keeping the
//! availability file current after every processed frame, then prints the
//! final report as JSON.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lot_occupancy::config::OccupancyConfig;
use lot_occupancy::ui::Ui;
use lot_occupancy::zone::load_zone_file;
use lot_occupancy::{
    build_detector, open_source, AvailabilityReport, DetectionSession, LoopMode, ParkingStatus,
    StatusTally,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Local video file (or stub:// url for testing).
    #[arg(long)]
    video: String,
    /// Zone file (JSON array or TOML with [[zones]]).
    #[arg(long)]
    zones: PathBuf,
    /// Frame offset to start from.
    #[arg(long, default_value_t = 1)]
    start_frame: u64,
    /// Availability file rewritten after every processed frame.
    #[arg(long, default_value = "parking_lot_state.json")]
    output: PathBuf,
    /// Detector backend override (stub|tract).
    #[arg(long)]
    backend: Option<String>,
    /// ONNX model for the tract backend.
    #[arg(long)]
    model_path: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let cfg = OccupancyConfig::load()?;
    let mut detector_settings = cfg.detector.clone();
    if let Some(backend) = args.backend {
        detector_settings.backend = backend.to_lowercase();
    }
    if let Some(model_path) = args.model_path {
        detector_settings.model_path = Some(model_path);
    }
    let engine = lot_occupancy::EngineSettings {
        frame_pause: Duration::ZERO,
        ..cfg.engine.clone()
    };

    let zones = {
        let _stage = ui.stage("Load zones");
        load_zone_file(&args.zones)?
    };
    let source = {
        let _stage = ui.stage("Open video");
        open_source(&args.video)?
    };
    let detector = {
        let _stage = ui.stage("Load detector");
        build_detector(&detector_settings)?
    };

    let progress = Arc::new(Mutex::new(ui.occupancy(&args.video)));
    let observer_progress = Arc::clone(&progress);
    let output = args.output.clone();
    let mut last_written: Option<AvailabilityReport> = None;
    let session = DetectionSession::new(
        args.video.clone(),
        &zones,
        source,
        args.start_frame,
        detector,
        engine,
        LoopMode::OneShot,
    )?
    .with_observer(Box::new(move |statuses: &[ParkingStatus]| {
        let tally = StatusTally::from_statuses(statuses);
        if let Ok(mut progress) = observer_progress.lock() {
            progress.update(tally);
        }
        let report = AvailabilityReport::from(tally);
        if last_written == Some(report) {
            return;
        }
        match report.write_to(&output) {
            Ok(()) => last_written = Some(report),
            Err(e) => log::warn!("availability file not written: {:#}", e),
        }
    }));

    let stop = session.stop_flag();
    ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
        .expect("error setting Ctrl-C handler");

    let board = session.status_board();
    let exit = session.run();
    if let Ok(progress) = Arc::try_unwrap(progress) {
        if let Ok(progress) = progress.into_inner() {
            progress.finish();
        }
    }
    let exit = exit?;
    log::info!("detect_once finished ({:?})", exit);

    let statuses = board
        .latest()
        .ok_or_else(|| anyhow!("no frame was processed from {}", args.video))?;
    let report = AvailabilityReport::from_statuses(&statuses);
    report.write_to(&args.output)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

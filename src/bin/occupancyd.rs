//! occupancyd - parking lot occupancy daemon
//!
//! This daemon:
//! 1. Loads configuration (OCCUPANCY_CONFIG file + OCCUPANCY_* overrides)
//! 2. Starts one continuous detection loop per active lot in the catalog
//! 3. Snapshots every running lot's counts into the store at a fixed interval
//! 4. Stops all loops and the snapshot task on Ctrl-C

use anyhow::Result;
use std::sync::{mpsc, Arc};

use lot_occupancy::config::OccupancyConfig;
use lot_occupancy::{build_detector, DetectorFactory, LotManager, SqliteLotStore};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = OccupancyConfig::load()?;
    let store = SqliteLotStore::open(&cfg.db_path)?;

    // Surface a broken backend before any lot starts.
    let probe = build_detector(&cfg.detector)?;
    log::info!("detector backend: {}", probe.name());
    drop(probe);

    let detector_settings = cfg.detector.clone();
    let detectors: DetectorFactory = Arc::new(move || build_detector(&detector_settings));
    let manager = LotManager::new(store, cfg.manager_settings(), detectors);
    manager.initialize()?;
    log::info!(
        "occupancyd running {} lots (db {}, snapshot every {}s)",
        manager.active_lots().len(),
        cfg.db_path,
        cfg.snapshot_interval.as_secs()
    );
    if let Some(dir) = &cfg.availability_dir {
        log::info!("availability files in {}", dir.display());
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("occupancyd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping detectors...");
    manager.shutdown();

    Ok(())
}

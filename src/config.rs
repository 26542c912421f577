use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DetectorSettings;
use crate::engine::EngineSettings;
use crate::manager::ManagerSettings;

const DEFAULT_DB_PATH: &str = "occupancy.db";
const DEFAULT_SNAPSHOT_SECS: u64 = 10;
const DETECTOR_BACKENDS: &[&str] = &["stub", "tract"];
const MAX_INPUT_SIZE: u32 = 4096;

#[derive(Debug, Deserialize, Default)]
struct OccupancyConfigFile {
    db_path: Option<String>,
    snapshot_interval: Option<u64>,
    availability_dir: Option<PathBuf>,
    engine: Option<EngineConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    texture_threshold: Option<f64>,
    detect_delay_secs: Option<f64>,
    sample_every: Option<u64>,
    blur_sigma: Option<f32>,
    frame_pause_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
}

/// Process configuration for the daemon and the admin tools.
///
/// Loaded from the JSON file named by `OCCUPANCY_CONFIG` (optional), then
/// overridden by `OCCUPANCY_*` environment variables, then validated.
#[derive(Debug, Clone)]
pub struct OccupancyConfig {
    pub db_path: String,
    pub snapshot_interval: Duration,
    pub availability_dir: Option<PathBuf>,
    pub engine: EngineSettings,
    pub detector: DetectorSettings,
}

impl OccupancyConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OCCUPANCY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OccupancyConfigFile) -> Self {
        let engine_defaults = EngineSettings::default();
        let engine_file = file.engine.unwrap_or_default();
        let engine = EngineSettings {
            texture_threshold: engine_file
                .texture_threshold
                .unwrap_or(engine_defaults.texture_threshold),
            detect_delay_secs: engine_file
                .detect_delay_secs
                .unwrap_or(engine_defaults.detect_delay_secs),
            sample_every: engine_file
                .sample_every
                .unwrap_or(engine_defaults.sample_every),
            blur_sigma: engine_file.blur_sigma.unwrap_or(engine_defaults.blur_sigma),
            frame_pause: engine_file
                .frame_pause_ms
                .map(Duration::from_millis)
                .unwrap_or(engine_defaults.frame_pause),
        };

        let detector_defaults = DetectorSettings::default();
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file.backend.unwrap_or(detector_defaults.backend),
            model_path: detector_file.model_path.or(detector_defaults.model_path),
            input_size: detector_file
                .input_size
                .unwrap_or(detector_defaults.input_size),
            confidence_threshold: detector_file
                .confidence_threshold
                .unwrap_or(detector_defaults.confidence_threshold),
        };

        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            snapshot_interval: Duration::from_secs(
                file.snapshot_interval.unwrap_or(DEFAULT_SNAPSHOT_SECS),
            ),
            availability_dir: file.availability_dir,
            engine,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("OCCUPANCY_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(secs) = std::env::var("OCCUPANCY_SNAPSHOT_SECS") {
            let seconds: u64 = secs.trim().parse().map_err(|_| {
                anyhow!("OCCUPANCY_SNAPSHOT_SECS must be an integer number of seconds")
            })?;
            self.snapshot_interval = Duration::from_secs(seconds);
        }
        if let Ok(dir) = std::env::var("OCCUPANCY_AVAILABILITY_DIR") {
            if !dir.trim().is_empty() {
                self.availability_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(backend) = std::env::var("OCCUPANCY_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("OCCUPANCY_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.snapshot_interval.is_zero() {
            return Err(anyhow!("snapshot_interval must be greater than zero"));
        }
        self.engine.validate().map_err(|e| anyhow!("engine: {}", e))?;

        self.detector.backend = self.detector.backend.to_lowercase();
        if !DETECTOR_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}' (expected one of: {})",
                self.detector.backend,
                DETECTOR_BACKENDS.join(", ")
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("detector backend 'tract' requires model_path"));
        }
        if self.detector.input_size == 0 || self.detector.input_size > MAX_INPUT_SIZE {
            return Err(anyhow!(
                "detector input_size must be within 1..={}",
                MAX_INPUT_SIZE
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!("detector confidence_threshold must be within 0..=1"));
        }
        Ok(())
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            engine: self.engine.clone(),
            snapshot_interval: self.snapshot_interval,
            availability_dir: self.availability_dir.clone(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<OccupancyConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

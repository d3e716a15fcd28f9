// src/config.rs - Controller endpoint and calibration settings
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::joints::JOINT_COUNT;

/// Pose the arm is assumed to hold when the session starts.
pub const DEFAULT_INITIAL_POSE: [f64; JOINT_COUNT] = [0.400, -101.980, 162.100, 0.560, 43.930, 1.730];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub host: String,
    pub port: u16,
    /// Thumb-to-index distance (pixels) below which the hand counts as pinching.
    pub pinch_threshold_px: f64,
    pub pixels_per_cm: f64,
    /// Magnitude of a single joint adjustment.
    pub adjustment_step: f64,
    pub initial_pose: [f64; JOINT_COUNT],
    pub connect_timeout_ms: u64,
    pub response_timeout_ms: u64,
    pub response_buffer_size: usize,
    /// Clear the pinch reference when the pinch is released, so the next
    /// pinch recalibrates. Off by default: the first reference is kept.
    pub reset_reference_on_release: bool,
    pub record_session: bool,
    pub output_directory: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.20".to_string(),
            port: 10003,
            pinch_threshold_px: 20.0,
            pixels_per_cm: 37.0,
            adjustment_step: 5.0,
            initial_pose: DEFAULT_INITIAL_POSE,
            connect_timeout_ms: 3000,
            response_timeout_ms: 2000,
            response_buffer_size: 1024,
            reset_reference_on_release: false,
            record_session: true,
            output_directory: directories::UserDirs::new()
                .and_then(|dirs| dirs.document_dir().map(|p| p.join("GestureArm")))
                .unwrap_or_else(|| PathBuf::from("./output")),
        }
    }
}

impl ControlConfig {
    /// Load settings from a JSON file. Fields missing from the file keep
    /// their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.pinch_threshold_px > 0.0 && self.pinch_threshold_px.is_finite()) {
            bail!("pinch_threshold_px must be positive and finite, got {}", self.pinch_threshold_px);
        }
        if !(self.pixels_per_cm > 0.0 && self.pixels_per_cm.is_finite()) {
            bail!("pixels_per_cm must be positive and finite, got {}", self.pixels_per_cm);
        }
        if !(self.adjustment_step > 0.0 && self.adjustment_step.is_finite()) {
            bail!("adjustment_step must be positive and finite, got {}", self.adjustment_step);
        }
        if self.response_buffer_size == 0 {
            bail!("response_buffer_size must be non-zero");
        }
        if self.connect_timeout_ms == 0 || self.response_timeout_ms == 0 {
            bail!("timeouts must be non-zero");
        }
        if self.initial_pose.iter().any(|v| !v.is_finite()) {
            bail!("initial_pose must contain finite values");
        }
        Ok(())
    }

    pub fn controller_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

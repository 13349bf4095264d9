use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Hard bounds for the configured interaction distance, metres.
pub const MIN_MAX_DISTANCE_M: f32 = 10.0;
pub const MAX_MAX_DISTANCE_M: f32 = 50.0;

/// Hard bounds for the price multipliers.
pub const MIN_PRICE_MULTIPLIER: f32 = 1.0;
pub const MAX_PRICE_MULTIPLIER: f32 = 5.0;

/// Persisted configuration surface.
///
/// Values are sanitised on load rather than rejected: a hand-edited file with
/// an out-of-bounds slider value clamps back into range, matching how the
/// host community expects settings files to behave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Subject-to-unit distance that keeps an interactive session valid.
    pub max_distance_m: f32,
    /// Configured controller signal range for the range-governed mode. The
    /// policy layer applies its own [1, 1000] clamp at every read.
    pub signal_range_m: f32,
    /// Per-vehicle weight limit enforced in the range-governed mode, tonnes.
    pub weight_limit_t: f32,
    /// Allow crane/tender targets through the weight check when the companion
    /// module is present.
    pub allow_crane_bypass: bool,
    /// Price multipliers for the price-governed mode.
    pub base_price_mul: f32,
    pub price_per_meter_mul: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_distance_m: 50.0,
            signal_range_m: 25.0,
            weight_limit_t: 35.0,
            allow_crane_bypass: false,
            base_price_mul: 2.5,
            price_per_meter_mul: 2.5,
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write settings file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        Ok(settings.sanitized())
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply the hard clamps. Distances round to whole metres the way the
    /// settings slider does.
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        out.max_distance_m = out
            .max_distance_m
            .round()
            .clamp(MIN_MAX_DISTANCE_M, MAX_MAX_DISTANCE_M);
        out.weight_limit_t = out.weight_limit_t.max(1.0);
        out.base_price_mul = out
            .base_price_mul
            .clamp(MIN_PRICE_MULTIPLIER, MAX_PRICE_MULTIPLIER);
        out.price_per_meter_mul = out
            .price_per_meter_mul
            .clamp(MIN_PRICE_MULTIPLIER, MAX_PRICE_MULTIPLIER);
        if out != *self {
            warn!("settings were out of bounds and have been clamped");
        }
        out
    }
}

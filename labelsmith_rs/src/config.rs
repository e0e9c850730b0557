use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetSelection {
    Weekly,
    Monthly,
    #[default]
    Both,
    /// Skip labelling entirely (feature-only export).
    None,
}

impl TargetSelection {
    pub fn weekly(self) -> bool {
        matches!(self, Self::Weekly | Self::Both)
    }

    pub fn monthly(self) -> bool {
        matches!(self, Self::Monthly | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Parquet,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Parquet => "parquet",
            Self::Csv => "csv",
        }
    }
}

fn default_input_path() -> PathBuf {
    PathBuf::from("data/raw/ibov_top40_long.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_out_base() -> String {
    "ibov_top40_features".to_string()
}

fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Parquet, OutputFormat::Csv]
}

fn default_min_history() -> usize {
    252
}

fn default_horizon_weekly() -> usize {
    5
}

fn default_horizon_monthly() -> usize {
    21
}

fn default_momentum_windows() -> Vec<usize> {
    vec![5, 21, 63, 126, 252]
}

fn default_ma_windows() -> Vec<usize> {
    vec![10, 21, 63, 126, 252]
}

fn default_vol_windows() -> Vec<usize> {
    vec![10, 21, 63]
}

fn default_volume_z_window() -> usize {
    63
}

fn default_rsi_window() -> usize {
    14
}

/// Immutable run configuration handed to every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// File stem for the written table (`<out_base>.parquet`, `<out_base>.csv`).
    #[serde(default = "default_out_base")]
    pub out_base: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,
    /// Entities with fewer observations than this are removed before any
    /// feature is computed.
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    #[serde(default = "default_horizon_weekly")]
    pub horizon_weekly: usize,
    #[serde(default = "default_horizon_monthly")]
    pub horizon_monthly: usize,
    #[serde(default = "default_momentum_windows")]
    pub momentum_windows: Vec<usize>,
    #[serde(default = "default_ma_windows")]
    pub ma_windows: Vec<usize>,
    #[serde(default = "default_vol_windows")]
    pub vol_windows: Vec<usize>,
    #[serde(default = "default_volume_z_window")]
    pub volume_z_window: usize,
    #[serde(default = "default_rsi_window")]
    pub rsi_window: usize,
    #[serde(default)]
    pub which_targets: TargetSelection,
    /// Overrides the Finalizer's default gate columns when set.
    #[serde(default)]
    pub required_columns: Option<Vec<String>>,
    /// Worker threads for per-entity computation; 0 uses all logical cores.
    #[serde(default)]
    pub n_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_dir: default_output_dir(),
            out_base: default_out_base(),
            formats: default_formats(),
            min_history: default_min_history(),
            horizon_weekly: default_horizon_weekly(),
            horizon_monthly: default_horizon_monthly(),
            momentum_windows: default_momentum_windows(),
            ma_windows: default_ma_windows(),
            vol_windows: default_vol_windows(),
            volume_z_window: default_volume_z_window(),
            rsi_window: default_rsi_window(),
            which_targets: TargetSelection::default(),
            required_columns: None,
            n_workers: 0,
        }
    }
}

impl Config {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Check window/horizon bounds and return a copy whose window sets are
    /// sorted ascending with duplicates removed.
    pub fn validated(&self) -> Result<Self, ConfigError> {
        let mut config = self.clone();
        for (field, windows, min) in [
            ("momentum_windows", &mut config.momentum_windows, 1),
            ("ma_windows", &mut config.ma_windows, 1),
            // Sample standard deviation needs two observations.
            ("vol_windows", &mut config.vol_windows, 2),
        ] {
            windows.sort_unstable();
            windows.dedup();
            if windows.is_empty() {
                return Err(ConfigError::EmptyWindows { field });
            }
            if windows[0] < min {
                return Err(ConfigError::TooSmall {
                    field,
                    min,
                    value: windows[0],
                });
            }
        }
        for (field, value, min) in [
            ("volume_z_window", config.volume_z_window, 2),
            ("rsi_window", config.rsi_window, 1),
            ("horizon_weekly", config.horizon_weekly, 1),
            ("horizon_monthly", config.horizon_monthly, 1),
        ] {
            if value < min {
                return Err(ConfigError::TooSmall { field, min, value });
            }
        }
        config.formats.sort_by_key(|format| format.extension());
        config.formats.dedup();
        if config.formats.is_empty() {
            return Err(ConfigError::NoOutputFormat);
        }
        Ok(config)
    }

    /// Columns whose undefined values cause the Finalizer to drop a row.
    pub fn required_columns(&self) -> Vec<String> {
        match &self.required_columns {
            Some(columns) => columns.clone(),
            None => vec![
                "ret_1d".to_string(),
                format!("rsi_{}", self.rsi_window),
                "vol_21".to_string(),
                "price_to_ma_21".to_string(),
                "mom_21d".to_string(),
            ],
        }
    }

    pub fn output_path(&self, format: OutputFormat) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.out_base, format.extension()))
    }
}

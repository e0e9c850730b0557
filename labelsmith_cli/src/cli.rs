use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use labelsmith_rs::config::{Config, OutputFormat, TargetSelection};

#[derive(Parser, Debug)]
#[command(
    name = "labelsmith",
    about = "Leakage-safe per-entity feature and label builder for daily OHLCV panels"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the feature and label table from a long-format OHLCV file
    #[command(name = "build")]
    Build(BuildArgs),
    /// Print every derived column a configuration produces
    #[command(name = "columns")]
    Columns(ColumnsArgs),
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Long-format input (CSV, or Parquet when the extension is .parquet)
    #[arg(long = "input", alias = "csv", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub input: Option<PathBuf>,

    /// Optional TOML configuration; flags given here override its values
    #[arg(long = "config", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Directory receiving the table and labelsmith.log
    #[arg(long = "output-dir", value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// File stem of the written table
    #[arg(long = "out-base")]
    pub out_base: Option<String>,

    /// Output formats (repeat or comma-separate)
    #[arg(long = "format", value_enum, value_delimiter = ',')]
    pub formats: Vec<FormatValue>,

    /// Entities with fewer observations are dropped before feature computation
    #[arg(long = "min-history")]
    pub min_history: Option<usize>,

    /// Which label horizons to produce
    #[arg(long = "targets", value_enum)]
    pub targets: Option<TargetsValue>,

    #[arg(long = "momentum-windows", value_delimiter = ',')]
    pub momentum_windows: Option<Vec<usize>>,

    #[arg(long = "ma-windows", value_delimiter = ',')]
    pub ma_windows: Option<Vec<usize>>,

    #[arg(long = "vol-windows", value_delimiter = ',')]
    pub vol_windows: Option<Vec<usize>>,

    #[arg(long = "rsi-window")]
    pub rsi_window: Option<usize>,

    #[arg(long = "horizon-weekly")]
    pub horizon_weekly: Option<usize>,

    #[arg(long = "horizon-monthly")]
    pub horizon_monthly: Option<usize>,

    /// Number of worker threads (omit to use all logical cores)
    #[arg(long = "workers", alias = "n-jobs")]
    pub workers: Option<usize>,

    /// Disable writing labelsmith.log into the output directory. When set,
    /// logs are only emitted to stdout.
    #[arg(long = "no-file-log", default_value_t = false)]
    pub no_file_log: bool,
}

#[derive(Parser, Debug)]
pub struct ColumnsArgs {
    /// Optional TOML configuration whose windows and targets are listed
    #[arg(long = "config", value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TargetsValue {
    Weekly,
    Monthly,
    Both,
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatValue {
    Parquet,
    Csv,
}

impl Cli {
    pub fn parse() -> Self {
        <Cli as Parser>::parse()
    }
}

impl BuildArgs {
    pub fn into_config(self) -> Result<Config> {
        let mut config = load_base_config(self.config.as_ref())?;
        if let Some(input) = self.input {
            config.input_path = input;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(base) = self.out_base {
            config.out_base = base;
        }
        if !self.formats.is_empty() {
            config.formats = self.formats.into_iter().map(FormatValue::to_format).collect();
        }
        if let Some(min_history) = self.min_history {
            config.min_history = min_history;
        }
        if let Some(targets) = self.targets {
            config.which_targets = targets.to_selection();
        }
        if let Some(windows) = self.momentum_windows {
            config.momentum_windows = windows;
        }
        if let Some(windows) = self.ma_windows {
            config.ma_windows = windows;
        }
        if let Some(windows) = self.vol_windows {
            config.vol_windows = windows;
        }
        if let Some(window) = self.rsi_window {
            config.rsi_window = window;
        }
        if let Some(horizon) = self.horizon_weekly {
            config.horizon_weekly = horizon;
        }
        if let Some(horizon) = self.horizon_monthly {
            config.horizon_monthly = horizon;
        }
        if self.workers.is_some() || config.n_workers == 0 {
            config.n_workers = normalize_workers(self.workers);
        }
        Ok(config.validated()?)
    }
}

impl ColumnsArgs {
    pub fn into_config(self) -> Result<Config> {
        let config = load_base_config(self.config.as_ref())?;
        Ok(config.validated()?)
    }
}

impl TargetsValue {
    fn to_selection(self) -> TargetSelection {
        match self {
            TargetsValue::Weekly => TargetSelection::Weekly,
            TargetsValue::Monthly => TargetSelection::Monthly,
            TargetsValue::Both => TargetSelection::Both,
            TargetsValue::None => TargetSelection::None,
        }
    }
}

impl FormatValue {
    fn to_format(self) -> OutputFormat {
        match self {
            FormatValue::Parquet => OutputFormat::Parquet,
            FormatValue::Csv => OutputFormat::Csv,
        }
    }
}

fn load_base_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_toml_file(path),
        None => Ok(Config::default()),
    }
}

fn normalize_workers(value: Option<usize>) -> usize {
    value.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use polars::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::info;

use crate::config::Config;
use crate::data::load_long_table;
use crate::features::FeatureEngine;
use crate::finalize::{FinalizeReport, finalize};
use crate::history::{HistoryReport, filter_min_history};
use crate::normalize::{NormalizeReport, normalize};
use crate::storage::{DatasetSummary, write_outputs};
use crate::targets::TargetLabeler;

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub normalize: NormalizeReport,
    pub history: HistoryReport,
    pub finalize: FinalizeReport,
    pub summary: Option<DatasetSummary>,
    pub outputs: Vec<PathBuf>,
}

/// Normalizer → HistoryFilter → FeatureEngine → TargetLabeler → Finalizer,
/// with the sink at the end of [`FeaturePipeline::run`].
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    config: Config,
}

impl FeaturePipeline {
    pub fn new(config: Config) -> Result<Self> {
        let config = config.validated().context("Invalid pipeline configuration")?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every in-memory stage on a raw long-format table.
    pub fn build(&self, raw: &DataFrame) -> Result<(DataFrame, PipelineReport)> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.n_workers)
            .thread_name(|idx| format!("labelsmith-worker-{idx}"))
            .build()
            .map_err(|err| anyhow!("failed to build worker pool: {err}"))?;

        pool.install(|| -> Result<(DataFrame, PipelineReport)> {
            let start = Instant::now();
            let (normalized, normalize_report) = normalize(raw)?;
            let (eligible, history_report) =
                filter_min_history(&normalized, self.config.min_history)?;
            let featured = FeatureEngine::new(&self.config).apply(&eligible)?;
            let labelled = TargetLabeler::new(&self.config).apply(&featured)?;
            let (finalized, finalize_report) = finalize(&labelled, &self.config)?;
            info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                workers = rayon::current_num_threads(),
                rows = finalized.height(),
                "Feature pipeline finished"
            );
            Ok((
                finalized,
                PipelineReport {
                    normalize: normalize_report,
                    history: history_report,
                    finalize: finalize_report,
                    ..Default::default()
                },
            ))
        })
    }

    /// Load `input_path`, build the dataset and write it to `output_dir`.
    pub fn run(&self) -> Result<PipelineReport> {
        let raw = load_long_table(&self.config.input_path)?;
        let (mut dataset, mut report) = self.build(&raw)?;
        report.outputs = write_outputs(&mut dataset, &self.config)?;
        let summary = DatasetSummary::from_frame(&mut dataset)?;
        info!(
            rows = summary.rows,
            entities = summary.entities,
            first_date = ?summary.first_date,
            last_date = ?summary.last_date,
            sha256 = %summary.sha256,
            "Dataset summary"
        );
        report.summary = Some(summary);
        Ok(report)
    }
}

/// Convenience wrapper for one-off in-memory builds.
pub fn build_dataset(raw: &DataFrame, config: &Config) -> Result<DataFrame> {
    let (dataset, _) = FeaturePipeline::new(config.clone())?.build(raw)?;
    Ok(dataset)
}

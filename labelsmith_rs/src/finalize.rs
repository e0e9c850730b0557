use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::SchemaError;
use crate::feature::FeatureCatalog;
use crate::panel::{date_column, entity_column, float_column};

const STAGE: &str = "finalize";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub rows_in: usize,
    pub rows_out: usize,
}

/// Drop rows whose required feature columns are undefined, then order by
/// `(date, entity_id)`.
///
/// Target columns are never part of the gate: rows at the end of each
/// entity keep their undefined labels for training-time consumers to drop.
pub fn finalize(frame: &DataFrame, config: &Config) -> Result<(DataFrame, FinalizeReport)> {
    let required = config.required_columns();
    let missing: Vec<String> = required
        .iter()
        .filter(|name| frame.column(name).is_err())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SchemaError::missing(STAGE, missing).into());
    }
    let catalog = FeatureCatalog::for_config(config);
    let forward: Vec<String> = required
        .iter()
        .filter(|name| catalog.is_forward_looking(name))
        .cloned()
        .collect();
    if !forward.is_empty() {
        return Err(SchemaError::ForwardLookingRequirement {
            stage: STAGE,
            columns: forward,
        }
        .into());
    }

    let mut keep = vec![true; frame.height()];
    for name in &required {
        let values = float_column(frame, name)?;
        for (flag, value) in keep.iter_mut().zip(values) {
            *flag &= value.is_some();
        }
    }
    let mask = BooleanChunked::from_slice("required_defined", &keep);
    let gated = frame
        .filter(&mask)
        .with_context(|| "Failed to drop rows with undefined required features")?;

    let dates = date_column(&gated)?;
    let entities = entity_column(&gated)?;
    let mut order: Vec<IdxSize> = (0..gated.height() as IdxSize).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        (dates[a], &entities[a]).cmp(&(dates[b], &entities[b]))
    });
    let indices = IdxCa::from_vec("order", order);
    let sorted = gated
        .take(&indices)
        .with_context(|| "Failed to reorder finalized rows by (date, entity_id)")?;

    let report = FinalizeReport {
        rows_in: frame.height(),
        rows_out: sorted.height(),
    };
    if report.rows_out == 0 && report.rows_in > 0 {
        warn!(
            required = ?required,
            "Every row has an undefined required feature; histories may be shorter than the warm-up"
        );
    }
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        required = ?required,
        "Finalized dataset"
    );
    Ok((sorted, report))
}

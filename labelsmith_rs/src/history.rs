use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;

use crate::panel::entity_ranges;

const STAGE: &str = "history";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryReport {
    pub entities_kept: usize,
    pub rows_kept: usize,
    /// Removed entities with their observation counts.
    pub dropped: Vec<(String, usize)>,
}

/// Remove every entity with fewer than `min_history` observations.
///
/// Counts rows only; gaps in the calendar are not inspected.
pub fn filter_min_history(frame: &DataFrame, min_history: usize) -> Result<(DataFrame, HistoryReport)> {
    let ranges = entity_ranges(frame, STAGE)?;
    let mut keep = vec![false; frame.height()];
    let mut report = HistoryReport::default();
    for range in &ranges {
        if range.rows.len() >= min_history {
            keep[range.rows.clone()].fill(true);
            report.entities_kept += 1;
            report.rows_kept += range.rows.len();
        } else {
            report.dropped.push((range.entity_id.clone(), range.rows.len()));
        }
    }

    let mask = BooleanChunked::from_slice("min_history", &keep);
    let filtered = frame
        .filter(&mask)
        .with_context(|| "Failed to drop short-history entities")?;
    info!(
        min_history,
        entities_kept = report.entities_kept,
        entities_dropped = report.dropped.len(),
        rows_kept = report.rows_kept,
        "Applied minimum-history gate"
    );
    Ok((filtered, report))
}

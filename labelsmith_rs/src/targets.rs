//! Forward-looking labels.
//!
//! This is the only module allowed to read rows after `i`. Its outputs are
//! tagged [`FeatureCategory::ForwardLooking`](crate::feature::FeatureCategory)
//! in the catalog and must never be fed back into feature computation or
//! used to gate rows in the Finalizer.

use anyhow::Result;
use polars::prelude::*;
use rayon::prelude::*;
use tracing::info;

use crate::config::Config;
use crate::panel::{ADJUSTED_CLOSE, entity_ranges, float_column, replace_column, stitch_columns};
use crate::rolling::ratio_change;

const STAGE: &str = "targets";

/// `prices[i + horizon] / prices[i] - 1`; undefined for the last `horizon`
/// rows of the entity.
pub fn forward_return(prices: &[Option<f64>], horizon: usize) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|i| {
            let ahead = prices.get(i + horizon).copied().flatten();
            if horizon == 0 { None } else { ratio_change(ahead, prices[i]) }
        })
        .collect()
}

/// 1 when the forward return is positive, 0 when it is zero or negative.
pub fn binarize(future: &[Option<f64>]) -> Vec<Option<i64>> {
    future
        .iter()
        .map(|ret| ret.map(|r| i64::from(r > 0.0)))
        .collect()
}

pub struct TargetLabeler<'a> {
    config: &'a Config,
}

impl<'a> TargetLabeler<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn horizons(&self) -> Vec<(&'static str, usize)> {
        let mut out = Vec::new();
        if self.config.which_targets.weekly() {
            out.push(("w", self.config.horizon_weekly));
        }
        if self.config.which_targets.monthly() {
            out.push(("m", self.config.horizon_monthly));
        }
        out
    }

    /// Append `future_ret_{w,m}` and `target_{w,m}` for the selected
    /// horizons. Reads only `adjusted_close`, so recomputing features never
    /// changes a label.
    pub fn apply(&self, frame: &DataFrame) -> Result<DataFrame> {
        let horizons = self.horizons();
        if horizons.is_empty() {
            info!("Target labelling disabled");
            return Ok(frame.clone());
        }
        let ranges = entity_ranges(frame, STAGE)?;
        let prices = float_column(frame, ADJUSTED_CLOSE)?;

        let parts: Vec<Vec<Vec<Option<f64>>>> = ranges
            .par_iter()
            .map(|range| {
                let slice = &prices[range.rows.clone()];
                horizons
                    .iter()
                    .map(|(_, horizon)| forward_return(slice, *horizon))
                    .collect()
            })
            .collect();
        let columns = stitch_columns(parts, horizons.len(), frame.height());

        let mut out = frame.clone();
        for ((suffix, horizon), future) in horizons.iter().zip(columns) {
            let target = binarize(&future);
            let labelled = target.iter().filter(|t| t.is_some()).count();
            replace_column(&mut out, Series::new(&format!("future_ret_{suffix}"), future))?;
            replace_column(&mut out, Series::new(&format!("target_{suffix}"), target))?;
            info!(
                horizon = *horizon,
                column = %format!("target_{suffix}"),
                labelled,
                unlabelled = out.height() - labelled,
                "Attached forward labels"
            );
        }
        Ok(out)
    }
}

//! Causal per-entity feature computation.
//!
//! Each entity's rows are handed to [`entity_features`] in isolation, so no
//! window can reach across an entity boundary, and every value at row `i`
//! is derived from rows `<= i` only.

use std::time::Instant;

use anyhow::Result;
use polars::prelude::*;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::feature::FeatureCatalog;
use crate::panel::{
    ADJUSTED_CLOSE, CLOSE, HIGH, LOW, OBSERVATION_COLUMNS, OPEN, VOLUME, ensure_columns,
    entity_ranges, float_column, replace_column, stitch_columns,
};
use crate::rolling::{
    diff, ln_positive, pct_change, ratio_change, rolling_mean, rolling_std, wilder_rsi,
};

const STAGE: &str = "features";

/// Borrowed view of one entity's bars, in date order.
#[derive(Clone, Copy, Debug)]
pub struct EntityBars<'a> {
    pub open: &'a [Option<f64>],
    pub high: &'a [Option<f64>],
    pub low: &'a [Option<f64>],
    pub close: &'a [Option<f64>],
    pub volume: &'a [Option<f64>],
    pub adjusted_close: &'a [Option<f64>],
}

/// Owned bar columns for a whole table.
#[derive(Clone, Debug, Default)]
pub struct BarColumns {
    pub open: Vec<Option<f64>>,
    pub high: Vec<Option<f64>>,
    pub low: Vec<Option<f64>>,
    pub close: Vec<Option<f64>>,
    pub volume: Vec<Option<f64>>,
    pub adjusted_close: Vec<Option<f64>>,
}

impl BarColumns {
    pub fn from_frame(frame: &DataFrame) -> Result<Self> {
        Ok(Self {
            open: float_column(frame, OPEN)?,
            high: float_column(frame, HIGH)?,
            low: float_column(frame, LOW)?,
            close: float_column(frame, CLOSE)?,
            volume: float_column(frame, VOLUME)?,
            adjusted_close: float_column(frame, ADJUSTED_CLOSE)?,
        })
    }

    pub fn slice(&self, rows: std::ops::Range<usize>) -> EntityBars<'_> {
        EntityBars {
            open: &self.open[rows.clone()],
            high: &self.high[rows.clone()],
            low: &self.low[rows.clone()],
            close: &self.close[rows.clone()],
            volume: &self.volume[rows.clone()],
            adjusted_close: &self.adjusted_close[rows],
        }
    }
}

/// Compute every causal column for one entity, in
/// [`FeatureCatalog::causal_descriptors`] order.
pub fn entity_features(bars: &EntityBars<'_>, config: &Config) -> Vec<Vec<Option<f64>>> {
    let prices = bars.adjusted_close;
    let mut out: Vec<Vec<Option<f64>>> = Vec::new();

    let log_prices: Vec<Option<f64>> = prices.iter().map(|p| ln_positive(*p)).collect();
    let logret = diff(&log_prices);
    out.push(pct_change(prices, 1));
    out.push(logret.clone());

    for &w in &config.momentum_windows {
        out.push(pct_change(prices, w));
    }

    for &w in &config.ma_windows {
        let ma = rolling_mean(prices, w);
        let distance = prices
            .iter()
            .zip(&ma)
            .map(|(p, m)| ratio_change(*p, *m))
            .collect();
        out.push(ma);
        out.push(distance);
    }

    for &w in &config.vol_windows {
        out.push(rolling_std(&logret, w));
    }

    let logvol: Vec<Option<f64>> = bars.volume.iter().map(|v| ln_positive(*v)).collect();
    let z = volume_zscore(&logvol, config.volume_z_window);
    out.push(logvol);
    out.push(z);

    out.push(pairwise_change(bars.high, bars.low));
    out.push(pairwise_change(bars.close, bars.open));
    out.push(wilder_rsi(prices, config.rsi_window));
    out
}

/// `(x - mean) / stdev` over a trailing window; undefined when the window
/// is incomplete or its standard deviation is zero.
pub fn volume_zscore(logvol: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mean = rolling_mean(logvol, window);
    let std = rolling_std(logvol, window);
    logvol
        .iter()
        .zip(mean.iter().zip(&std))
        .map(|(x, (m, s))| {
            let s = s.filter(|s| *s != 0.0)?;
            crate::rolling::finite((x.as_ref()? - m.as_ref()?) / s)
        })
        .collect()
}

fn pairwise_change(num: &[Option<f64>], den: &[Option<f64>]) -> Vec<Option<f64>> {
    num.iter()
        .zip(den)
        .map(|(n, d)| ratio_change(*n, *d))
        .collect()
}

pub struct FeatureEngine<'a> {
    config: &'a Config,
}

impl<'a> FeatureEngine<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Append every causal feature column to a table ordered by
    /// `(entity_id, date)`. Entities are processed in parallel on the
    /// current rayon pool; output does not depend on the worker count.
    pub fn apply(&self, frame: &DataFrame) -> Result<DataFrame> {
        let start = Instant::now();
        ensure_columns(frame, STAGE, &OBSERVATION_COLUMNS)?;
        let ranges = entity_ranges(frame, STAGE)?;
        let bars = BarColumns::from_frame(frame)?;
        let names: Vec<String> = FeatureCatalog::causal_descriptors(self.config)
            .into_iter()
            .map(|d| d.name)
            .collect();

        let parts: Vec<Vec<Vec<Option<f64>>>> = ranges
            .par_iter()
            .map(|range| entity_features(&bars.slice(range.rows.clone()), self.config))
            .collect();
        let columns = stitch_columns(parts, names.len(), frame.height());

        let mut out = frame.clone();
        for (name, values) in names.iter().zip(columns) {
            replace_column(&mut out, Series::new(name, values))?;
        }

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Feature stage timing"
        );
        info!(
            entities = ranges.len(),
            rows = out.height(),
            columns = names.len(),
            "Computed causal features"
        );
        Ok(out)
    }
}

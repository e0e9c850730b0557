//! Causal window helpers over a single entity's series.
//!
//! Every function takes one entity's values in date order and returns a
//! vector of the same length whose element `i` depends only on inputs at
//! indices `<= i`. Undefined values are `None`; non-finite arithmetic results
//! are mapped to `None` instead of leaking infinities downstream.

/// Neutralise division-by-zero / log-of-non-positive results.
#[inline]
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// `num / den - 1`, undefined when either side is missing or the ratio is
/// not finite.
#[inline]
pub fn ratio_change(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    finite(num? / den? - 1.0)
}

/// Natural log, undefined for non-positive or missing input.
#[inline]
pub fn ln_positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0).and_then(|v| finite(v.ln()))
}

/// `values[i] / values[i - period] - 1`.
pub fn pct_change(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period == 0 || i < period {
                None
            } else {
                ratio_change(values[i], values[i - period])
            }
        })
        .collect()
}

/// First difference `values[i] - values[i - 1]`.
pub fn diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i == 0 {
                None
            } else {
                finite(values[i]? - values[i - 1]?)
            }
        })
        .collect()
}

fn full_window(values: &[Option<f64>], end: usize, period: usize) -> Option<Vec<f64>> {
    if period == 0 || end + 1 < period {
        return None;
    }
    values[end + 1 - period..=end].iter().copied().collect()
}

/// Trailing arithmetic mean; defined only once `period` defined values fill
/// the window, so the first `period - 1` rows are always `None`.
pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let window = full_window(values, i, period)?;
            finite(window.iter().sum::<f64>() / period as f64)
        })
        .collect()
}

/// Trailing sample standard deviation (n - 1 denominator).
pub fn rolling_std(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if period < 2 {
                return None;
            }
            let window = full_window(values, i, period)?;
            // The mean of identical values can carry rounding error.
            if window.iter().all(|x| *x == window[0]) {
                return Some(0.0);
            }
            let mean = window.iter().sum::<f64>() / period as f64;
            let variance_sum = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
            finite((variance_sum / (period - 1) as f64).sqrt())
        })
        .collect()
}

/// Exponential smoother with `alpha = 1 / period` (Wilder's RMA).
///
/// The first defined input seeds the average; later inputs update it with
/// the recurrence `avg = alpha * x + (1 - alpha) * avg`. Missing inputs
/// report the carried average but keep decaying its weight, so after `k`
/// missing steps the next input is blended as
/// `(d * avg + alpha * x) / (d + alpha)` with `d = (1 - alpha)^(k + 1)`.
/// Nothing is reported until `period` inputs have contributed.
#[derive(Debug, Clone)]
pub struct WilderSmoother {
    alpha: f64,
    period: usize,
    average: Option<f64>,
    /// Weight of `average` relative to a fresh input, before this step's decay.
    carried_weight: f64,
    observed: usize,
}

impl WilderSmoother {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: 1.0 / period.max(1) as f64,
            period: period.max(1),
            average: None,
            carried_weight: 1.0,
            observed: 0,
        }
    }

    pub fn update(&mut self, value: Option<f64>) -> Option<f64> {
        let decay = 1.0 - self.alpha;
        match (value, self.average) {
            (Some(x), Some(prev)) => {
                let old_weight = self.carried_weight * decay;
                self.average = Some((old_weight * prev + self.alpha * x) / (old_weight + self.alpha));
                self.carried_weight = 1.0;
                self.observed += 1;
            }
            (Some(x), None) => {
                self.average = Some(x);
                self.observed += 1;
            }
            (None, Some(_)) => self.carried_weight *= decay,
            (None, None) => {}
        }
        self.current()
    }

    pub fn current(&self) -> Option<f64> {
        if self.observed >= self.period {
            self.average
        } else {
            None
        }
    }
}

/// Wilder relative strength index over one entity's price series.
///
/// When the smoothed loss is zero the relative strength is undefined; the
/// index then takes its limiting value of 100 if there was any gain, and
/// stays undefined for a perfectly flat series.
pub fn wilder_rsi(prices: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut gains = WilderSmoother::new(period);
    let mut losses = WilderSmoother::new(period);
    diff(prices)
        .into_iter()
        .map(|delta| {
            let avg_gain = gains.update(delta.map(|d| d.max(0.0)));
            let avg_loss = losses.update(delta.map(|d| (-d).max(0.0)));
            rsi_from_averages(avg_gain?, avg_loss?)
        })
        .collect()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }
    let rs = avg_gain / avg_loss;
    finite(100.0 - 100.0 / (1.0 + rs)).map(|rsi| rsi.clamp(0.0, 100.0))
}

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{info, warn};

use crate::panel::{
    ADJUSTED_CLOSE, CLOSE, DATE, ENTITY_ID, HIGH, LOW, OBSERVATION_COLUMNS, OPEN, VOLUME,
    days_to_date, ensure_columns, float_column, string_column,
};

const STAGE: &str = "normalize";

/// Column names used by the quote provider export, mapped onto the
/// canonical contract when the canonical name is absent.
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("ticker", ENTITY_ID),
    ("symbol", ENTITY_ID),
    ("adjustedClose", ADJUSTED_CLOSE),
    ("adj_close", ADJUSTED_CLOSE),
];

const PRICE_COLUMNS: [&str; 6] = [OPEN, HIGH, LOW, CLOSE, VOLUME, ADJUSTED_CLOSE];

/// One cleaned daily bar.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub entity_id: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<f64>,
    /// Source adjusted close when positive, otherwise `close`; undefined if
    /// the result is still non-positive.
    pub adjusted_close: Option<f64>,
}

/// Non-fatal data-quality findings from one normalisation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub dropped_bad_date: usize,
    pub dropped_missing_entity: usize,
    pub dropped_missing_close: usize,
    pub duplicate_rows: usize,
    pub adjusted_close_fallbacks: usize,
    /// Per column: non-empty raw values that could not be parsed.
    pub coerced_values: BTreeMap<String, usize>,
}

impl NormalizeReport {
    pub fn dropped_rows(&self) -> usize {
        self.input_rows - self.output_rows
    }

    fn log(&self) {
        let coerced: usize = self.coerced_values.values().sum();
        if self.dropped_rows() > 0 || coerced > 0 {
            warn!(
                dropped_bad_date = self.dropped_bad_date,
                dropped_missing_entity = self.dropped_missing_entity,
                dropped_missing_close = self.dropped_missing_close,
                duplicate_rows = self.duplicate_rows,
                coerced = ?self.coerced_values,
                "Data quality: malformed values coerced to undefined"
            );
        }
        info!(
            input_rows = self.input_rows,
            output_rows = self.output_rows,
            adjusted_close_fallbacks = self.adjusted_close_fallbacks,
            "Normalized long-format table"
        );
    }
}

/// Validate, coerce and order the raw long-format table.
///
/// The result has exactly the observation columns, typed (`date` as Date,
/// `entity_id` as String, the rest Float64 with nulls), sorted by
/// `(entity_id, date)` with one row per pair.
pub fn normalize(raw: &DataFrame) -> Result<(DataFrame, NormalizeReport)> {
    let frame = resolve_aliases(raw)?;
    ensure_columns(&frame, STAGE, &OBSERVATION_COLUMNS)?;

    let mut report = NormalizeReport {
        input_rows: frame.height(),
        ..Default::default()
    };

    let dates = coerce_dates(frame.column(DATE)?, &mut report)?;
    let entities: Vec<Option<String>> = string_column(&frame, ENTITY_ID)?
        .into_iter()
        .map(|value| {
            value
                .map(|raw| raw.trim().to_uppercase())
                .filter(|id| !id.is_empty())
        })
        .collect();
    let mut prices: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for name in PRICE_COLUMNS {
        let (values, coerced) = coerce_numeric(&frame, name)?;
        if coerced > 0 {
            report.coerced_values.insert(name.to_string(), coerced);
        }
        prices.insert(name, values);
    }

    let mut observations = Vec::with_capacity(frame.height());
    for row in 0..frame.height() {
        let Some(date) = dates[row] else {
            report.dropped_bad_date += 1;
            continue;
        };
        let Some(entity_id) = entities[row].clone() else {
            report.dropped_missing_entity += 1;
            continue;
        };
        let Some(close) = prices[CLOSE][row] else {
            report.dropped_missing_close += 1;
            continue;
        };
        let source_adjusted = prices[ADJUSTED_CLOSE][row].filter(|v| *v > 0.0);
        if source_adjusted.is_none() {
            report.adjusted_close_fallbacks += 1;
        }
        let adjusted_close = source_adjusted.or(Some(close)).filter(|v| *v > 0.0);
        observations.push(Observation {
            entity_id,
            date,
            open: prices[OPEN][row],
            high: prices[HIGH][row],
            low: prices[LOW][row],
            close,
            volume: prices[VOLUME][row],
            adjusted_close,
        });
    }

    // Stable sort keeps input order among duplicates; the last one wins.
    observations.sort_by(|a, b| (&a.entity_id, a.date).cmp(&(&b.entity_id, b.date)));
    let before_dedup = observations.len();
    let mut deduped: Vec<Observation> = Vec::with_capacity(before_dedup);
    for obs in observations {
        match deduped.last_mut() {
            Some(last) if last.entity_id == obs.entity_id && last.date == obs.date => *last = obs,
            _ => deduped.push(obs),
        }
    }
    report.duplicate_rows = before_dedup - deduped.len();
    report.output_rows = deduped.len();

    let normalized = observations_to_frame(&deduped)?;
    report.log();
    Ok((normalized, report))
}

/// Build a typed observation table in the given row order.
pub fn observations_to_frame(observations: &[Observation]) -> Result<DataFrame> {
    let column = |f: fn(&Observation) -> Option<f64>| -> Vec<Option<f64>> {
        observations.iter().map(f).collect()
    };
    DataFrame::new(vec![
        Series::new(DATE, observations.iter().map(|o| o.date).collect::<Vec<_>>()),
        Series::new(
            ENTITY_ID,
            observations
                .iter()
                .map(|o| o.entity_id.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(OPEN, column(|o| o.open)),
        Series::new(HIGH, column(|o| o.high)),
        Series::new(LOW, column(|o| o.low)),
        Series::new(CLOSE, column(|o| Some(o.close))),
        Series::new(VOLUME, column(|o| o.volume)),
        Series::new(ADJUSTED_CLOSE, column(|o| o.adjusted_close)),
    ])
    .context("Failed to assemble normalized observation table")
}

fn resolve_aliases(raw: &DataFrame) -> Result<DataFrame> {
    let mut frame = raw.clone();
    for (alias, canonical) in COLUMN_ALIASES {
        if frame.column(canonical).is_err() && frame.column(alias).is_ok() {
            frame
                .rename(alias, canonical)
                .with_context(|| format!("Failed to rename column {alias} to {canonical}"))?;
        }
    }
    Ok(frame)
}

fn coerce_numeric(frame: &DataFrame, name: &str) -> Result<(Vec<Option<f64>>, usize)> {
    let series = frame.column(name)?;
    if series.dtype() != &DataType::String {
        let raw_nulls = series.null_count();
        let values = float_column(frame, name)?;
        let undefined = values.iter().filter(|v| v.is_none()).count();
        return Ok((values, undefined.saturating_sub(raw_nulls)));
    }
    let mut coerced = 0;
    let values: Vec<Option<f64>> = series
        .str()?
        .into_iter()
        .map(|value| {
            let trimmed = value.map(str::trim).filter(|s| !s.is_empty())?;
            let parsed = trimmed.parse::<f64>().ok().filter(|v| v.is_finite());
            if parsed.is_none() {
                coerced += 1;
            }
            parsed
        })
        .collect();
    Ok((values, coerced))
}

fn coerce_dates(series: &Series, report: &mut NormalizeReport) -> Result<Vec<Option<NaiveDate>>> {
    let values: Vec<Option<NaiveDate>> = match series.dtype() {
        DataType::Date => series
            .cast(&DataType::Int32)?
            .i32()?
            .into_iter()
            .map(|days| days.and_then(days_to_date))
            .collect(),
        DataType::Datetime(unit, _) => {
            let per_second = match unit {
                TimeUnit::Nanoseconds => 1_000_000_000,
                TimeUnit::Microseconds => 1_000_000,
                TimeUnit::Milliseconds => 1_000,
            };
            series
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|ticks| ticks.and_then(|t| epoch_seconds_to_date(t.div_euclid(per_second))))
                .collect()
        }
        DataType::String => series
            .str()?
            .into_iter()
            .map(|value| value.and_then(parse_date))
            .collect(),
        dtype if dtype.is_integer() => series
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|secs| secs.and_then(epoch_seconds_to_date))
            .collect(),
        other => {
            return Err(crate::error::SchemaError::UnsupportedType {
                stage: STAGE,
                column: DATE.to_string(),
                dtype: other.to_string(),
            }
            .into());
        }
    };
    let coerced = values
        .iter()
        .filter(|v| v.is_none())
        .count()
        .saturating_sub(series.null_count());
    if coerced > 0 {
        report.coerced_values.insert(DATE.to_string(), coerced);
    }
    Ok(values)
}

fn epoch_seconds_to_date(secs: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive())
}

/// Accepts ISO dates, RFC3339 timestamps, naive date-times and Unix seconds.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y/%m/%d") {
        return Some(date);
    }
    raw.parse::<i64>().ok().and_then(epoch_seconds_to_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use crate::panel::{date_column, entity_column};

    fn raw_frame(rows: &[[&str; 8]]) -> DataFrame {
        let column = |idx: usize, name: &str| {
            Series::new(name, rows.iter().map(|r| r[idx]).collect::<Vec<_>>())
        };
        DataFrame::new(vec![
            column(0, "date"),
            column(1, "ticker"),
            column(2, "open"),
            column(3, "high"),
            column(4, "low"),
            column(5, "close"),
            column(6, "volume"),
            column(7, "adjustedClose"),
        ])
        .unwrap()
    }

    #[test]
    fn normalize_orders_by_entity_then_date_and_trims_ids() -> Result<()> {
        let raw = raw_frame(&[
            ["2024-01-03", " petr4 ", "1", "1", "1", "10", "5", "9"],
            ["2024-01-02", "VALE3", "1", "1", "1", "20", "5", ""],
            ["2024-01-02", "petr4", "1", "1", "1", "11", "5", "10"],
        ]);
        let (frame, report) = normalize(&raw)?;
        assert_eq!(report.output_rows, 3);
        assert_eq!(entity_column(&frame)?, vec!["PETR4", "PETR4", "VALE3"]);
        let dates = date_column(&frame)?;
        assert!(dates[0] < dates[1]);
        Ok(())
    }

    #[test]
    fn adjusted_close_falls_back_to_close() -> Result<()> {
        let raw = raw_frame(&[
            ["2024-01-02", "A", "1", "1", "1", "10", "5", ""],
            ["2024-01-03", "A", "1", "1", "1", "11", "5", "0"],
            ["2024-01-04", "A", "1", "1", "1", "12", "5", "6"],
            ["2024-01-05", "A", "1", "1", "1", "-1", "5", "x"],
        ]);
        let (frame, report) = normalize(&raw)?;
        let adjusted = float_column(&frame, ADJUSTED_CLOSE)?;
        assert_eq!(adjusted, vec![Some(10.0), Some(11.0), Some(6.0), None]);
        assert_eq!(report.adjusted_close_fallbacks, 3);
        assert_eq!(report.coerced_values.get(ADJUSTED_CLOSE), Some(&1));
        Ok(())
    }

    #[test]
    fn malformed_rows_are_dropped_not_fatal() -> Result<()> {
        let raw = raw_frame(&[
            ["not-a-date", "A", "1", "1", "1", "10", "5", "10"],
            ["2024-01-02", "  ", "1", "1", "1", "10", "5", "10"],
            ["2024-01-03", "A", "1", "1", "1", "n/a", "5", "10"],
            ["2024-01-04", "A", "oops", "1", "1", "10", "5", "10"],
        ]);
        let (frame, report) = normalize(&raw)?;
        assert_eq!(frame.height(), 1);
        assert_eq!(report.dropped_bad_date, 1);
        assert_eq!(report.dropped_missing_entity, 1);
        assert_eq!(report.dropped_missing_close, 1);
        assert_eq!(float_column(&frame, OPEN)?, vec![None]);
        Ok(())
    }

    #[test]
    fn duplicate_entity_dates_keep_the_last_row() -> Result<()> {
        let raw = raw_frame(&[
            ["2024-01-02", "A", "1", "1", "1", "10", "5", "10"],
            ["2024-01-02", "A", "1", "1", "1", "12", "5", "12"],
        ]);
        let (frame, report) = normalize(&raw)?;
        assert_eq!(report.duplicate_rows, 1);
        assert_eq!(float_column(&frame, CLOSE)?, vec![Some(12.0)]);
        Ok(())
    }

    #[test]
    fn missing_columns_raise_schema_error() {
        let raw = DataFrame::new(vec![
            Series::new("date", &["2024-01-02"]),
            Series::new("entity_id", &["A"]),
        ])
        .unwrap();
        let err = normalize(&raw).unwrap_err();
        match err.downcast_ref::<SchemaError>() {
            Some(SchemaError::MissingColumns { columns, .. }) => {
                assert!(columns.contains(&"close".to_string()));
                assert!(columns.contains(&"adjusted_close".to_string()));
                assert!(!columns.contains(&"entity_id".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_date_accepts_supported_encodings() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(parse_date("2024-03-15"), expected);
        assert_eq!(parse_date("2024-03-15T13:00:00Z"), expected);
        assert_eq!(parse_date("2024-03-15 09:30:00"), expected);
        assert_eq!(parse_date("1710460800"), expected);
        assert_eq!(parse_date("15/03/2024"), None);
    }
}

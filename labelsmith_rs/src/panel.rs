//! Column access and entity partitioning over the long-format table.
//!
//! Stages keep the table as a `DataFrame`, pull the columns they need into
//! plain vectors, and work on one contiguous entity range at a time.

use std::ops::Range;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::SchemaError;

pub const DATE: &str = "date";
pub const ENTITY_ID: &str = "entity_id";
pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";
pub const ADJUSTED_CLOSE: &str = "adjusted_close";

/// Input contract columns, in output order.
pub const OBSERVATION_COLUMNS: [&str; 8] = [
    DATE,
    ENTITY_ID,
    OPEN,
    HIGH,
    LOW,
    CLOSE,
    VOLUME,
    ADJUSTED_CLOSE,
];

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One entity's contiguous row range inside the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRange {
    pub entity_id: String,
    pub rows: Range<usize>,
}

pub fn ensure_columns(frame: &DataFrame, stage: &'static str, names: &[&str]) -> Result<()> {
    let missing: Vec<String> = names
        .iter()
        .filter(|name| frame.column(name).is_err())
        .map(|name| name.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::missing(stage, missing).into())
    }
}

/// Float column as optional values; nulls and non-finite values are undefined.
pub fn float_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = frame
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    let casted = series
        .cast(&DataType::Float64)
        .with_context(|| format!("Column {name} cannot be read as float"))?;
    Ok(casted
        .f64()
        .with_context(|| format!("Column {name} must be float"))?
        .into_iter()
        .map(|value| value.filter(|v| v.is_finite()))
        .collect())
}

pub fn string_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = frame
        .column(name)
        .with_context(|| format!("Missing required column {name}"))?;
    let casted = series
        .cast(&DataType::String)
        .with_context(|| format!("Column {name} cannot be read as string"))?;
    Ok(casted
        .str()
        .with_context(|| format!("Column {name} must be a string column"))?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

/// Date column of a normalised table (no nulls allowed).
pub fn date_column(frame: &DataFrame) -> Result<Vec<NaiveDate>> {
    let series = frame
        .column(DATE)
        .with_context(|| format!("Missing required column {DATE}"))?;
    if series.dtype() != &DataType::Date {
        return Err(SchemaError::UnsupportedType {
            stage: "panel",
            column: DATE.to_string(),
            dtype: series.dtype().to_string(),
        }
        .into());
    }
    let days = series.cast(&DataType::Int32)?;
    days.i32()?
        .into_iter()
        .map(|value| {
            value
                .and_then(days_to_date)
                .with_context(|| format!("Column {DATE} contains nulls"))
        })
        .collect()
}

pub fn days_to_date(days_since_epoch: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days_since_epoch.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

pub fn entity_column(frame: &DataFrame) -> Result<Vec<String>> {
    string_column(frame, ENTITY_ID)?
        .into_iter()
        .map(|value| value.with_context(|| format!("Column {ENTITY_ID} contains nulls")))
        .collect()
}

/// Split a table ordered by `(entity_id, date)` into per-entity ranges.
///
/// Fails with [`SchemaError::Unsorted`] when an entity reappears after
/// another one or its dates are not strictly ascending, since every windowed
/// computation relies on that ordering.
pub fn entity_ranges(frame: &DataFrame, stage: &'static str) -> Result<Vec<EntityRange>> {
    ensure_columns(frame, stage, &[ENTITY_ID, DATE])?;
    let entities = entity_column(frame)?;
    let dates = date_column(frame)?;
    partition_sorted(&entities, &dates, stage)
}

pub fn partition_sorted(
    entities: &[String],
    dates: &[NaiveDate],
    stage: &'static str,
) -> Result<Vec<EntityRange>> {
    let mut ranges: Vec<EntityRange> = Vec::new();
    let mut start = 0;
    for row in 0..entities.len() {
        let boundary = row + 1 == entities.len() || entities[row + 1] != entities[row];
        if row > start && dates[row] <= dates[row - 1] {
            return Err(SchemaError::Unsorted {
                stage,
                entity_id: entities[row].clone(),
                row,
            }
            .into());
        }
        if boundary {
            if let Some(prev) = ranges.last() {
                if prev.entity_id >= entities[row] {
                    return Err(SchemaError::Unsorted {
                        stage,
                        entity_id: entities[row].clone(),
                        row: start,
                    }
                    .into());
                }
            }
            ranges.push(EntityRange {
                entity_id: entities[row].clone(),
                rows: start..row + 1,
            });
            start = row + 1;
        }
    }
    Ok(ranges)
}

/// Transpose per-entity outputs (`parts[entity][column]`, in range order)
/// into full-height columns.
pub fn stitch_columns<T>(parts: Vec<Vec<Vec<T>>>, n_columns: usize, height: usize) -> Vec<Vec<T>> {
    let mut columns: Vec<Vec<T>> = (0..n_columns).map(|_| Vec::with_capacity(height)).collect();
    for part in parts {
        debug_assert_eq!(part.len(), n_columns);
        for (column, values) in columns.iter_mut().zip(part) {
            column.extend(values);
        }
    }
    columns
}

pub fn replace_column(frame: &mut DataFrame, series: Series) -> Result<()> {
    let name = series.name().to_string();
    if frame.column(&name).is_ok() {
        *frame = frame
            .drop(&name)
            .with_context(|| format!("Failed to remove existing column {name}"))?;
    }
    frame
        .with_column(series)
        .with_context(|| format!("Failed to update column {name}"))?;
    Ok(())
}

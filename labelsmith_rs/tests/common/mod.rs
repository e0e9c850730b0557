#![allow(dead_code)]

use anyhow::Result;
use chrono::{Days, NaiveDate};
use labelsmith_rs::config::Config;
use labelsmith_rs::normalize::{Observation, observations_to_frame};
use labelsmith_rs::panel::float_column;
use polars::prelude::*;

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date")
}

/// Bars on consecutive calendar days with the given adjusted prices.
pub fn bars_from_prices(entity: &str, prices: &[f64], volume: impl Fn(usize) -> f64) -> Vec<Observation> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &price)| Observation {
            entity_id: entity.to_string(),
            date: start_date() + Days::new(i as u64),
            open: Some(price * 0.995),
            high: Some(price * 1.01),
            low: Some(price * 0.985),
            close: price,
            volume: Some(volume(i)),
            adjusted_close: Some(price),
        })
        .collect()
}

pub fn compounding_prices(n: usize, start: f64, growth: f64) -> Vec<f64> {
    (0..n).map(|i| start * growth.powi(i as i32)).collect()
}

/// Deterministic oscillating series with drift; `phase` separates entities.
pub fn wavy_prices(n: usize, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            40.0 + 0.05 * t + 4.0 * (0.37 * t + phase).sin() + 1.5 * (1.3 * t + 2.0 * phase).cos()
        })
        .collect()
}

pub fn wavy_bars(entity: &str, n: usize, phase: f64) -> Vec<Observation> {
    bars_from_prices(entity, &wavy_prices(n, phase), |i| {
        1_000.0 + ((i * 37) % 500) as f64
    })
}

pub fn frame(observations: &[Observation]) -> DataFrame {
    observations_to_frame(observations).expect("observation frame")
}

/// Windows small enough for short synthetic histories.
pub fn compact_config() -> Config {
    Config {
        min_history: 30,
        momentum_windows: vec![5, 21],
        ma_windows: vec![10, 21],
        vol_windows: vec![10, 21],
        volume_z_window: 21,
        rsi_window: 14,
        n_workers: 2,
        ..Config::default()
    }
}

pub fn float_bits(frame: &DataFrame, name: &str) -> Result<Vec<Option<u64>>> {
    Ok(float_column(frame, name)?
        .into_iter()
        .map(|value| value.map(f64::to_bits))
        .collect())
}

pub fn int_column(frame: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    Ok(frame.column(name)?.i64()?.into_iter().collect())
}

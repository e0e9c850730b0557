mod common;

use anyhow::Result;
use common::{compact_config, float_bits, frame, wavy_bars};
use labelsmith_rs::config::OutputFormat;
use labelsmith_rs::feature::FeatureCatalog;
use labelsmith_rs::features::FeatureEngine;
use labelsmith_rs::normalize::{normalize, observations_to_frame};
use labelsmith_rs::panel::{entity_column, float_column};
use labelsmith_rs::{Config, FeaturePipeline, SchemaError, build_dataset};
use polars::io::parquet::ParquetWriter;
use polars::prelude::*;
use tempfile::tempdir;

fn features(observations: &[labelsmith_rs::Observation], config: &Config) -> Result<DataFrame> {
    let (normalized, _) = normalize(&frame(observations))?;
    FeatureEngine::new(config).apply(&normalized)
}

#[test]
fn entities_processed_together_match_each_processed_alone() -> Result<()> {
    let config = compact_config().validated()?;
    let aaa = wavy_bars("AAA", 75, 0.0);
    let bbb = wavy_bars("BBB", 90, 2.5);
    let mut both = bbb.clone();
    both.extend(aaa.clone());

    let alone_a = features(&aaa, &config)?;
    let alone_b = features(&bbb, &config)?;
    let together = features(&both, &config)?;
    assert_eq!(together.height(), alone_a.height() + alone_b.height());

    for descriptor in FeatureCatalog::causal_descriptors(&config) {
        let mut expected = float_bits(&alone_a, &descriptor.name)?;
        expected.extend(float_bits(&alone_b, &descriptor.name)?);
        assert_eq!(expected, float_bits(&together, &descriptor.name)?, "{}", descriptor.name);
    }
    Ok(())
}

#[test]
fn first_rows_of_an_entity_never_see_the_previous_entity() -> Result<()> {
    let config = compact_config().validated()?;
    let mut bars = wavy_bars("AAA", 40, 0.0);
    bars.extend(wavy_bars("BBB", 40, 1.0));
    let out = features(&bars, &config)?;
    let ret = float_column(&out, "ret_1d")?;
    assert_eq!(ret[0], None);
    assert_eq!(ret[40], None);
    assert!(ret[41].is_some());
    Ok(())
}

#[test]
fn short_histories_are_removed_before_features() -> Result<()> {
    let config = compact_config().validated()?;
    let mut bars = wavy_bars("LONG3", 60, 0.0);
    bars.extend(wavy_bars("SHRT3", 29, 1.0));
    let pipeline = FeaturePipeline::new(config)?;
    let (out, report) = pipeline.build(&frame(&bars))?;
    assert!(entity_column(&out)?.iter().all(|id| id == "LONG3"));
    assert_eq!(report.history.dropped, vec![("SHRT3".to_string(), 29)]);
    assert_eq!(report.history.rows_kept, 60);
    Ok(())
}

#[test]
fn output_is_ordered_by_date_then_entity() -> Result<()> {
    let config = compact_config().validated()?;
    let mut bars = wavy_bars("ZZZ", 50, 0.0);
    bars.extend(wavy_bars("AAA", 50, 1.0));
    let out = build_dataset(&frame(&bars), &config)?;
    let dates = labelsmith_rs::panel::date_column(&out)?;
    let entities = entity_column(&out)?;
    let keys: Vec<_> = dates.iter().zip(&entities).collect();
    assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(entities[0], "AAA");
    Ok(())
}

#[test]
fn worker_count_does_not_change_the_result() -> Result<()> {
    let mut bars = Vec::new();
    for (i, id) in ["AAA", "BBB", "CCC", "DDD", "EEE"].iter().enumerate() {
        bars.extend(wavy_bars(id, 70 + i * 7, i as f64));
    }
    let raw = frame(&bars);
    let single = build_dataset(&raw, &Config { n_workers: 1, ..compact_config() })?;
    let many = build_dataset(&raw, &Config { n_workers: 4, ..compact_config() })?;
    assert!(single.equals_missing(&many));
    Ok(())
}

#[test]
fn missing_input_column_is_a_schema_error() -> Result<()> {
    let raw = frame(&wavy_bars("AAA", 10, 0.0)).drop("volume")?;
    let err = normalize(&raw).unwrap_err();
    match err.downcast_ref::<SchemaError>() {
        Some(SchemaError::MissingColumns { stage, columns }) => {
            assert_eq!(*stage, "normalize");
            assert_eq!(columns, &vec!["volume".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn unnormalised_table_is_rejected_by_the_feature_stage() -> Result<()> {
    let config = compact_config().validated()?;
    let mut bars = wavy_bars("AAA", 10, 0.0);
    bars.reverse();
    let err = FeatureEngine::new(&config)
        .apply(&observations_to_frame(&bars)?)
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchemaError>(),
        Some(SchemaError::Unsorted { .. })
    ));
    Ok(())
}

#[test]
fn required_column_without_producer_fails_the_run() -> Result<()> {
    let config = Config {
        momentum_windows: vec![5, 63],
        ..compact_config()
    };
    let err = build_dataset(&frame(&wavy_bars("AAA", 80, 0.0)), &config).unwrap_err();
    match err.downcast_ref::<SchemaError>() {
        Some(SchemaError::MissingColumns { stage, columns }) => {
            assert_eq!(*stage, "finalize");
            assert_eq!(columns, &vec!["mom_21d".to_string()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_values_are_dropped_not_fatal() -> Result<()> {
    let raw = df!(
        "date" => ["2024-01-02", "not a date", "2024-01-03", "2024-01-04", "2024-01-04"],
        "ticker" => [" vale3 ", "VALE3", "VALE3", "", "VALE3"],
        "open" => ["1", "1", "x", "1", "1"],
        "high" => ["1", "1", "1", "1", "1"],
        "low" => ["1", "1", "1", "1", "1"],
        "close" => ["10", "11", "12", "13", "n/a"],
        "volume" => ["100", "100", "100", "100", "100"],
        "adjustedClose" => ["", "11", "-1", "13", "14"],
    )?;
    let (normalized, report) = normalize(&raw)?;
    assert_eq!(normalized.height(), 2);
    assert_eq!(report.dropped_bad_date, 1);
    assert_eq!(report.dropped_missing_entity, 1);
    assert_eq!(report.dropped_missing_close, 1);
    assert_eq!(report.coerced_values.get("open"), Some(&1));
    assert_eq!(entity_column(&normalized)?, vec!["VALE3", "VALE3"]);
    assert_eq!(
        float_column(&normalized, "adjusted_close")?,
        vec![Some(10.0), Some(12.0)]
    );
    Ok(())
}

#[test]
fn run_writes_every_format_and_summarises() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("long.parquet");
    let mut bars = wavy_bars("AAA", 60, 0.0);
    bars.extend(wavy_bars("BBB", 60, 1.0));
    let mut raw = frame(&bars);
    ParquetWriter::new(std::fs::File::create(&input)?).finish(&mut raw)?;

    let config = Config {
        input_path: input,
        output_dir: dir.path().join("processed"),
        out_base: "panel".to_string(),
        ..compact_config()
    };
    let pipeline = FeaturePipeline::new(config)?;
    let report = pipeline.run()?;
    assert_eq!(report.outputs.len(), 2);
    for format in [OutputFormat::Csv, OutputFormat::Parquet] {
        assert!(pipeline.config().output_path(format).exists());
    }
    let summary = report.summary.expect("summary");
    assert_eq!(summary.entities, 2);
    assert_eq!(summary.rows, 2 * (60 - 21));
    assert_eq!(summary.sha256.len(), 64);

    let rerun = FeaturePipeline::new(pipeline.config().clone())?.run()?;
    assert_eq!(rerun.summary.map(|s| s.sha256), Some(summary.sha256));
    Ok(())
}

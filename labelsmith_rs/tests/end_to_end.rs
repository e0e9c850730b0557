mod common;

use anyhow::Result;
use common::{bars_from_prices, compounding_prices, frame, int_column};
use labelsmith_rs::panel::float_column;
use labelsmith_rs::{Config, FeaturePipeline};

#[test]
fn compounding_series_produces_expected_table() -> Result<()> {
    let bars = bars_from_prices("ABCD3", &compounding_prices(300, 100.0, 1.01), |_| 1_000.0);
    let pipeline = FeaturePipeline::new(Config::default())?;
    let (out, report) = pipeline.build(&frame(&bars))?;

    // vol_21 and mom_21d need 21 prior observations.
    assert_eq!(out.height(), 300 - 21);
    assert_eq!(report.finalize.rows_in, 300);
    assert_eq!(report.finalize.rows_out, 279);
    assert_eq!(report.history.entities_kept, 1);

    let expected_mom = 1.01_f64.powi(21) - 1.0;
    for value in float_column(&out, "mom_21d")? {
        let value = value.expect("mom_21d is required");
        assert!((value - expected_mom).abs() < 1e-9, "mom_21d {value}");
    }
    for value in float_column(&out, "rsi_14")? {
        let value = value.expect("rsi_14 is required");
        assert!(value > 95.0, "rsi_14 {value}");
    }
    for value in float_column(&out, "ret_1d")? {
        assert!((value.expect("ret_1d") - 0.01).abs() < 1e-9);
    }

    for (name, horizon) in [("target_w", 5), ("target_m", 21)] {
        let labels = int_column(&out, name)?;
        let (labelled, trailing) = labels.split_at(labels.len() - horizon);
        assert!(labelled.iter().all(|label| *label == Some(1)), "{name}");
        assert!(trailing.iter().all(Option::is_none), "{name}");
    }
    Ok(())
}

#[test]
fn constant_volume_has_undefined_anomaly_score() -> Result<()> {
    let bars = bars_from_prices("FLAT3", &compounding_prices(300, 100.0, 1.01), |_| 1_000.0);
    let out = labelsmith_rs::build_dataset(&frame(&bars), &Config::default())?;
    assert_eq!(out.column("logvol_z_63")?.null_count(), out.height());
    assert_eq!(out.column("logvol")?.null_count(), 0);
    Ok(())
}

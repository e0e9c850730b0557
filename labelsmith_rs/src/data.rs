use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;

/// Load the raw long-format table produced by the quote downloader.
///
/// CSV columns are read as strings so that type coercion (and the
/// bookkeeping of values that fail it) stays with the normalizer. Files
/// ending in `.parquet` keep their stored types.
pub fn load_long_table(path: &Path) -> Result<DataFrame> {
    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    let df = if is_parquet {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        ParquetReader::new(file)
            .finish()
            .with_context(|| format!("Unable to read Parquet {}", path.display()))?
    } else {
        CsvReader::from_path(path)
            .with_context(|| format!("Failed to load {}", path.display()))?
            .has_header(true)
            .infer_schema(Some(0))
            .finish()
            .with_context(|| format!("Unable to read CSV {} into DataFrame", path.display()))?
    };
    info!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "Loaded long-format input"
    );
    Ok(df)
}

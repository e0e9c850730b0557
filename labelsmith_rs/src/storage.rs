use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::io::parquet::{ParquetCompression, ParquetWriter};
use polars::prelude::*;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::{Config, OutputFormat};
use crate::panel::{date_column, entity_column};

/// Shape and content fingerprint of a finalized table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub rows: usize,
    pub entities: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// SHA-256 of the CSV rendering (header included).
    pub sha256: String,
}

impl DatasetSummary {
    pub fn from_frame(frame: &mut DataFrame) -> Result<Self> {
        let dates = date_column(frame)?;
        let entities: HashSet<String> = entity_column(frame)?.into_iter().collect();
        Ok(Self {
            rows: frame.height(),
            entities: entities.len(),
            first_date: dates.iter().min().copied(),
            last_date: dates.iter().max().copied(),
            sha256: sha256_dataframe_as_csv(frame)?,
        })
    }
}

/// Write the finalized table in every configured format.
pub fn write_outputs(frame: &mut DataFrame, config: &Config) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Unable to create {}", config.output_dir.display()))?;
    let mut written = Vec::with_capacity(config.formats.len());
    for &format in &config.formats {
        let path = config.output_path(format);
        let mut file = File::create(&path)
            .with_context(|| format!("Unable to create {}", path.display()))?;
        match format {
            OutputFormat::Parquet => {
                ParquetWriter::new(&mut file)
                    .with_compression(ParquetCompression::Zstd(None))
                    .finish(frame)
                    .with_context(|| format!("Failed to write Parquet output {}", path.display()))?;
            }
            OutputFormat::Csv => {
                CsvWriter::new(&mut file)
                    .include_header(true)
                    .finish(frame)
                    .with_context(|| format!("Failed to write CSV output {}", path.display()))?;
            }
        }
        info!(path = %path.display(), rows = frame.height(), "Saved engineered dataset");
        written.push(path);
    }
    Ok(written)
}

pub fn sha256_dataframe_as_csv(frame: &mut DataFrame) -> Result<String> {
    let mut writer = HashingWriter::new(io::sink());
    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(frame)
        .with_context(|| "Failed to hash engineered dataset")?;
    Ok(writer.finalize_hex())
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

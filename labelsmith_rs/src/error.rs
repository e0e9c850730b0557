use thiserror::Error;

/// Structural mismatch between a table and the column contract a stage
/// expects. Always fatal: the run aborts and the message names every
/// offending column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{stage}: missing required column(s): {}", columns.join(", "))]
    MissingColumns {
        stage: &'static str,
        columns: Vec<String>,
    },

    #[error("{stage}: column '{column}' has unsupported type {dtype}")]
    UnsupportedType {
        stage: &'static str,
        column: String,
        dtype: String,
    },

    #[error(
        "{stage}: table is not ordered by (entity_id, date); entity '{entity_id}' is broken at row {row}"
    )]
    Unsorted {
        stage: &'static str,
        entity_id: String,
        row: usize,
    },

    #[error("{stage}: required column(s) read future rows and cannot gate features: {}", columns.join(", "))]
    ForwardLookingRequirement {
        stage: &'static str,
        columns: Vec<String>,
    },
}

impl SchemaError {
    pub fn missing(stage: &'static str, columns: Vec<String>) -> Self {
        Self::MissingColumns { stage, columns }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must contain at least one window")]
    EmptyWindows { field: &'static str },

    #[error("{field} must be >= {min} (got {value})")]
    TooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },

    #[error("no output format selected")]
    NoOutputFormat,
}

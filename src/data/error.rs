use std::path::PathBuf;

use thiserror::Error;

/// Why a source file could not be turned into a project table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} could not be decoded with any of: {}", tried.join(", "))]
    Encoding {
        path: PathBuf,
        tried: Vec<&'static str>,
    },

    #[error("missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<&'static str> },

    #[error("malformed delimited text: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed arrow data: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("malformed parquet file: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),
}

impl LoadError {
    /// Only a schema violation halts rendering; everything else degrades
    /// to an empty table.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoadError::Schema { .. })
    }
}

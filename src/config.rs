use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::loader::{LoadOptions, TextEncoding};
use crate::data::model::DateColumn;
use crate::geo::DEFAULT_SHAPES_URL;

/// What the dashboard renders besides the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Rows in ranked tables (top suppliers).
    pub top_n: usize,
    /// Rows in the recent-projects table.
    pub recent_rows: usize,
    /// Date the recent-projects table is ordered by.
    pub recent_by: DateColumn,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            top_n: 10,
            recent_rows: 10,
            recent_by: DateColumn::Publication,
        }
    }
}

/// Dashboard configuration, read from a JSON file. Missing keys take
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub source: PathBuf,
    /// Where generated sample data is cached when `source` is missing.
    pub sample_cache: PathBuf,
    pub sample_size: usize,
    /// GeoJSON department boundaries; `None` disables the map join.
    pub shapes_url: Option<String>,
    pub encodings: Vec<TextEncoding>,
    /// Single-byte field delimiter; sniffed when absent.
    pub delimiter: Option<char>,
    pub view: ViewSettings,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("proyectos_guatecompras.csv"),
            sample_cache: PathBuf::from("proyectos_guatecompras_sample.csv"),
            sample_size: 500,
            shapes_url: Some(DEFAULT_SHAPES_URL.to_string()),
            encodings: TextEncoding::DEFAULT_ORDER.to_vec(),
            delimiter: None,
            view: ViewSettings::default(),
        }
    }
}

impl DashboardConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        if let Some(d) = config.delimiter {
            anyhow::ensure!(d.is_ascii(), "delimiter {d:?} is not a single-byte character");
        }
        Ok(config)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            encodings: self.encodings.clone(),
            delimiter: self.delimiter.filter(char::is_ascii).map(|c| c as u8),
        }
    }
}

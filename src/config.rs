//! Extractor configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::TableDetectorConfig;

/// Default root for output directories.
pub const DEFAULT_EXTRACTIONS_DIR: &str = "extractions";

/// Default number of interactive password attempts.
pub const DEFAULT_MAX_PASSWORD_ATTEMPTS: u32 = 3;

/// Suffix appended to the input file stem to name its output directory.
pub const OUTPUT_DIR_SUFFIX: &str = "_extracted";

/// Options for extracting PDF documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Root under which default output directories are created
    pub extractions_dir: PathBuf,

    /// Attempts allowed when unlocking interactively
    pub max_password_attempts: u32,

    /// Table detection tuning
    pub table_detection: TableDetectorConfig,
}

impl ExtractorConfig {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the extractions root.
    pub fn with_extractions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extractions_dir = dir.into();
        self
    }

    /// Set the interactive attempt limit.
    pub fn with_max_password_attempts(mut self, attempts: u32) -> Self {
        self.max_password_attempts = attempts;
        self
    }

    /// Set table detection options.
    pub fn with_table_detection(mut self, config: TableDetectorConfig) -> Self {
        self.table_detection = config;
        self
    }

    /// Disable ruling-line table detection.
    pub fn text_aligned_tables_only(mut self) -> Self {
        self.table_detection.use_ruling_lines = false;
        self
    }

    /// Reject settings the extractor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_password_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_password_attempts must be at least 1".to_string(),
            ));
        }
        if self.extractions_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "extractions_dir must not be empty".to_string(),
            ));
        }
        let tables = &self.table_detection;
        if tables.min_columns > tables.max_columns {
            return Err(Error::InvalidConfig(format!(
                "table min_columns ({}) exceeds max_columns ({})",
                tables.min_columns, tables.max_columns
            )));
        }
        Ok(())
    }

    /// Create the extractions root if it does not exist.
    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.extractions_dir)?;
        log::info!("Directory ensured: {}", self.extractions_dir.display());
        Ok(())
    }

    /// Default output directory for `input`: `<extractions_dir>/<stem>_extracted`.
    pub fn output_dir_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        self.extractions_dir
            .join(format!("{}{}", stem, OUTPUT_DIR_SUFFIX))
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            extractions_dir: PathBuf::from(DEFAULT_EXTRACTIONS_DIR),
            max_password_attempts: DEFAULT_MAX_PASSWORD_ATTEMPTS,
            table_detection: TableDetectorConfig::default(),
        }
    }
}

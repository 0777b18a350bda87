//! Reading an extraction back into memory.
//!
//! [`ExtractionLoader`] is the consumer side of the artifact layout: it
//! gathers page text, parses table CSVs and returns the metadata file as an
//! opaque blob. Missing directories yield empty results and a warning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::extract::{METADATA_FILE, TABLES_DIR, TEXT_DIR};

/// Rows kept in a table summary sample.
const SAMPLE_ROWS: usize = 5;

/// File names listed per kind in a [`DataSummary`].
const SUMMARY_SAMPLES: usize = 3;

/// Which text rendering to assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextVariant {
    /// Content-stream order (`page_<N>_text.txt`)
    #[default]
    Raw,
    /// Reading order (`page_<N>_text_sorted.txt`)
    Sorted,
}

/// Shape of a loaded table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Data rows, not counting the header row
    pub rows: usize,
    pub columns: Vec<String>,
    /// First data rows
    pub sample: Vec<Vec<String>>,
}

/// A parsed table CSV. The first row is taken as the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub summary: TableSummary,
}

/// Everything an extraction directory holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadedExtraction {
    /// Page text files by file name
    pub text: BTreeMap<String, String>,
    /// Table CSVs by file name
    pub tables: BTreeMap<String, LoadedTable>,
    /// Contents of `metadata.txt`
    pub metadata: Option<String>,
}

/// Counts and sample names of an extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSummary {
    pub text_files: usize,
    pub table_files: usize,
    pub text_samples: Vec<String>,
    pub table_samples: Vec<String>,
}

/// Reads an extraction directory.
#[derive(Debug, Clone)]
pub struct ExtractionLoader {
    base_path: PathBuf,
}

impl ExtractionLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        log::debug!("ExtractionLoader for {}", base_path.display());
        Self { base_path }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Load text, tables and metadata.
    pub fn load_all(&self) -> Result<LoadedExtraction> {
        let loaded = LoadedExtraction {
            text: self.load_text_data()?,
            tables: self.load_table_data()?,
            metadata: self.metadata()?,
        };
        log::info!(
            "Loaded {} text files and {} table files",
            loaded.text.len(),
            loaded.tables.len()
        );
        Ok(loaded)
    }

    /// Page text files keyed by file name. `metadata.txt` is not included.
    pub fn load_text_data(&self) -> Result<BTreeMap<String, String>> {
        let mut text_data = BTreeMap::new();
        for path in self.list_files(TEXT_DIR, "txt")? {
            let Some(name) = file_name(&path) else {
                continue;
            };
            if name == METADATA_FILE {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(text) => {
                    text_data.insert(name, text);
                }
                Err(e) => log::error!("Error reading {}: {}", path.display(), e),
            }
        }
        log::debug!("Loaded {} text files", text_data.len());
        Ok(text_data)
    }

    /// Table CSVs keyed by file name.
    pub fn load_table_data(&self) -> Result<BTreeMap<String, LoadedTable>> {
        let mut table_data = BTreeMap::new();
        for path in self.list_files(TABLES_DIR, "csv")? {
            let Some(name) = file_name(&path) else {
                continue;
            };
            match read_table(&path) {
                Ok(table) => {
                    log::debug!("Loaded table file: {} with {} rows", name, table.rows.len());
                    table_data.insert(name, table);
                }
                Err(e) => log::error!("Error loading {}: {}", path.display(), e),
            }
        }
        Ok(table_data)
    }

    /// Contents of `text/metadata.txt`, if present.
    pub fn metadata(&self) -> Result<Option<String>> {
        let path = self.base_path.join(TEXT_DIR).join(METADATA_FILE);
        if !path.is_file() {
            log::warn!("No metadata file found");
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    /// Counts plus the first few file names of each kind.
    pub fn summary(&self) -> Result<DataSummary> {
        let text = self.load_text_data()?;
        let tables = self.load_table_data()?;
        Ok(DataSummary {
            text_files: text.len(),
            table_files: tables.len(),
            text_samples: text.keys().take(SUMMARY_SAMPLES).cloned().collect(),
            table_samples: tables.keys().take(SUMMARY_SAMPLES).cloned().collect(),
        })
    }

    /// Page texts of one rendering in page order, separated by blank lines.
    pub fn full_text(&self, variant: TextVariant) -> Result<String> {
        let mut pages: Vec<(u32, String)> = self
            .load_text_data()?
            .into_iter()
            .filter_map(|(name, text)| match parse_text_file_name(&name) {
                Some((page, v)) if v == variant => Some((page, text)),
                _ => None,
            })
            .collect();
        pages.sort_by_key(|(page, _)| *page);

        Ok(pages
            .iter()
            .map(|(_, text)| text.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    /// Files in `subdir` with extension `ext`, sorted by name.
    fn list_files(&self, subdir: &str, ext: &str) -> Result<Vec<PathBuf>> {
        let dir = self.base_path.join(subdir);
        if !dir.is_dir() {
            log::warn!("Directory not found: {}", dir.display());
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == ext) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

fn text_file_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^page_(\d+)_text(_sorted)?\.txt$").ok())
        .as_ref()
}

/// Page number and variant of a text file name.
fn parse_text_file_name(name: &str) -> Option<(u32, TextVariant)> {
    let caps = text_file_pattern()?.captures(name)?;
    let page = caps.get(1)?.as_str().parse().ok()?;
    let variant = if caps.get(2).is_some() {
        TextVariant::Sorted
    } else {
        TextVariant::Raw
    };
    Some((page, variant))
}

/// Parse one CSV. Ragged rows are padded or cut to the header width.
fn read_table(path: &Path) -> Result<LoadedTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    if headers.is_empty() {
        return Err(Error::TableExtract(format!(
            "{} has no header row",
            path.display()
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let mut row: Vec<String> = record?.iter().map(String::from).collect();
        row.resize(headers.len(), String::new());
        rows.push(row);
    }

    let summary = TableSummary {
        rows: rows.len(),
        columns: headers.clone(),
        sample: rows.iter().take(SAMPLE_ROWS).cloned().collect(),
    };
    Ok(LoadedTable {
        headers,
        rows,
        summary,
    })
}

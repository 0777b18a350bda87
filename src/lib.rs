//! # pdfsift
//!
//! PDF content extraction to a directory of plain artifacts.
//!
//! Each run writes, under `<extractions>/<stem>_extracted/`:
//!
//! ```text
//! text/page_<N>_text.txt          content-stream order
//! text/page_<N>_text_sorted.txt   reading order
//! text/metadata.txt               document information
//! tables/page_<N>_table_<K>.csv   one file per detected table
//! images/page_<N>_image_<K>.<ext> embedded raster images
//! ```
//!
//! Pages with no tables or images get a `page_<N>_no_tables.txt` /
//! `page_<N>_no_images.txt` sentinel instead, so every page is accounted
//! for in both directories.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdfsift::{ExtractionLoader, ExtractorConfig, PdfExtractor};
//!
//! fn main() -> pdfsift::Result<()> {
//!     let extractor = PdfExtractor::new(ExtractorConfig::default())?;
//!     let report = extractor.extract("report.pdf", None)?;
//!
//!     let loader = ExtractionLoader::new(&report.output_dir);
//!     for (name, table) in loader.load_table_data()? {
//!         println!("{}: {} rows", name, table.summary.rows);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Encrypted documents
//!
//! A password is tried once with [`PdfExtractor::extract`]. For repeated
//! attempts use [`PdfExtractor::extract_interactive`] with any
//! [`PasswordPrompt`]; the number of attempts is capped by
//! [`ExtractorConfig::max_password_attempts`].

pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod loader;
pub mod model;
pub mod parser;

pub use config::ExtractorConfig;
pub use detect::{detect_format_from_bytes, detect_format_from_path, is_pdf, PdfFormat};
pub use error::{Error, Result};
pub use extract::{
    ArtifactKind, ArtifactOutcome, CandidatePasswords, ExtractionObserver, ExtractionReport,
    ExtractionState, NoopObserver, PageFailure, PasswordPrompt, PdfExtractor,
};
pub use loader::{
    DataSummary, ExtractionLoader, LoadedExtraction, LoadedTable, TableSummary, TextVariant,
};
pub use model::{DetectionStrategy, DocumentMetadata, ExtractedImage, ImageEncoding, PageText, Rect, Table};
pub use parser::{LopdfOpener, LopdfSource, PdfOpener, PdfSource, TableDetectorConfig};

use std::path::Path;

/// Extract a PDF with the default configuration.
///
/// # Example
///
/// ```no_run
/// let report = pdfsift::extract("invoice.pdf", Some("s3cret"))?;
/// assert!(report.is_clean());
/// # Ok::<(), pdfsift::Error>(())
/// ```
pub fn extract<P: AsRef<Path>>(path: P, password: Option<&str>) -> Result<ExtractionReport> {
    PdfExtractor::new(ExtractorConfig::default())?.extract(path, password)
}

/// Load an extraction directory back into memory.
pub fn load<P: AsRef<Path>>(output_dir: P) -> Result<LoadedExtraction> {
    ExtractionLoader::new(output_dir.as_ref()).load_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extract_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = ExtractorConfig::new().with_extractions_dir(dir.path());
        let extractor = PdfExtractor::new(config).unwrap();

        let result = extractor.extract(dir.path().join("missing.pdf"), None);
        assert!(matches!(result, Err(Error::Open { .. })));
        assert!(!dir.path().join("missing_extracted").exists());
    }

    #[test]
    fn test_extract_not_a_pdf() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("notes.pdf");
        std::fs::write(&input, b"<!DOCTYPE html><html></html>").unwrap();

        let config = ExtractorConfig::new().with_extractions_dir(dir.path());
        let result = PdfExtractor::new(config).unwrap().extract(&input, None);
        assert!(matches!(result, Err(Error::Open { .. })));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ExtractorConfig::new().with_max_password_attempts(0);
        assert!(matches!(
            PdfExtractor::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = TempDir::new().unwrap();
        let loaded = load(dir.path()).unwrap();
        assert!(loaded.text.is_empty());
        assert!(loaded.metadata.is_none());
    }

    #[test]
    fn test_detect_format_unknown_magic() {
        let result = detect_format_from_bytes(b"GIF89a........");
        assert!(matches!(result, Err(Error::UnknownFormat)));
    }
}

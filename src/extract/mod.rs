//! Extraction orchestration.
//!
//! [`PdfExtractor`] opens a document, unlocks it, and walks its pages in
//! order. Each page yields both text renderings, then its tables, then its
//! images; `text/metadata.txt` is written once after the last page.
//!
//! Text failures abort the run. Table and image failures are recorded in
//! an error sentinel for that page and the run continues
//! (see [`ArtifactKind::isolates_failures`]).
//!
//! ```text
//! Unopened -> Unlocking -> PasswordRequired | OpenFailed | Unlocked
//! Unlocked -> ExtractingPages -> Completed | Aborted
//! ```

mod artifacts;
mod observer;
mod unlock;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::parser::{LopdfOpener, PdfOpener, PdfSource};

pub use artifacts::{
    render_metadata, table_to_csv, ArtifactWriter, IMAGES_DIR, METADATA_FILE, NO_IMAGES_MESSAGE,
    NO_TABLES_MESSAGE, TABLES_DIR, TEXT_DIR,
};
pub use observer::{ExtractionObserver, NoopObserver};
pub use unlock::{CandidatePasswords, OpenDocument, PasswordPrompt};

/// The per-page artifact families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Text,
    Tables,
    Images,
}

impl ArtifactKind {
    /// Whether a failure of this kind is confined to its page.
    ///
    /// `false` means the failure aborts the whole run.
    pub fn isolates_failures(&self) -> bool {
        match self {
            ArtifactKind::Text => false,
            ArtifactKind::Tables | ArtifactKind::Images => true,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Text => "text",
            ArtifactKind::Tables => "table",
            ArtifactKind::Images => "image",
        })
    }
}

/// What happened to one artifact kind on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// This many files were written
    Written(usize),
    /// Nothing found; the "none" sentinel was written
    Empty,
    /// The step failed; the error sentinel was written
    Failed(String),
}

/// Lifecycle states of one extraction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    Unopened,
    Unlocking,
    PasswordRequired,
    OpenFailed,
    Unlocked,
    ExtractingPages,
    Completed,
    Aborted,
}

/// An isolated table or image failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    /// 1-based page number
    pub page: u32,
    pub kind: ArtifactKind,
    pub message: String,
}

impl PageFailure {
    /// The failure as an [`Error::PageArtifact`].
    pub fn to_error(&self) -> Error {
        Error::PageArtifact {
            page: self.page,
            kind: self.kind,
            message: self.message.clone(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Root of the artifact tree
    pub output_dir: PathBuf,
    pub page_count: u32,
    /// CSV files written across all pages
    pub tables_written: usize,
    /// Image files written across all pages
    pub images_written: usize,
    /// Isolated failures, in page order
    pub page_failures: Vec<PageFailure>,
}

impl ExtractionReport {
    fn new(output_dir: &Path, page_count: u32) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            page_count,
            tables_written: 0,
            images_written: 0,
            page_failures: Vec::new(),
        }
    }

    /// True when no page recorded an isolated failure.
    pub fn is_clean(&self) -> bool {
        self.page_failures.is_empty()
    }
}

/// Extracts text, tables, images and metadata from PDF files.
///
/// # Example
///
/// ```no_run
/// use pdfsift::{ExtractorConfig, PdfExtractor};
///
/// let extractor = PdfExtractor::new(ExtractorConfig::default())?;
/// let report = extractor.extract("statement.pdf", None)?;
/// println!("{} pages -> {}", report.page_count, report.output_dir.display());
/// # Ok::<(), pdfsift::Error>(())
/// ```
pub struct PdfExtractor<O: PdfOpener = LopdfOpener> {
    config: ExtractorConfig,
    opener: O,
    observer: Box<dyn ExtractionObserver>,
}

impl PdfExtractor<LopdfOpener> {
    /// Create an extractor backed by lopdf.
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let opener = LopdfOpener::new(config.table_detection.clone());
        Self::with_opener(config, opener)
    }
}

impl<O: PdfOpener> PdfExtractor<O> {
    /// Create an extractor with a custom document opener.
    pub fn with_opener(config: ExtractorConfig, opener: O) -> Result<Self> {
        config.validate()?;
        log::info!("Initializing PDFExtractor");
        Ok(Self {
            config,
            opener,
            observer: Box::new(NoopObserver),
        })
    }

    /// Set the progress observer.
    pub fn with_observer(mut self, observer: impl ExtractionObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract into the default output directory, with at most one password attempt.
    pub fn extract(&self, path: impl AsRef<Path>, password: Option<&str>) -> Result<ExtractionReport> {
        let path = path.as_ref();
        let output_dir = self.config.output_dir_for(path);
        self.extract_to(path, output_dir, password)
    }

    /// Extract into `output_dir`, with at most one password attempt.
    pub fn extract_to(
        &self,
        path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        password: Option<&str>,
    ) -> Result<ExtractionReport> {
        self.run(path.as_ref(), output_dir.as_ref(), |doc| doc.unlock(password))
    }

    /// Extract into the default output directory, prompting for passwords.
    pub fn extract_interactive<P>(
        &self,
        path: impl AsRef<Path>,
        prompt: &mut P,
    ) -> Result<ExtractionReport>
    where
        P: PasswordPrompt + ?Sized,
    {
        let path = path.as_ref();
        let output_dir = self.config.output_dir_for(path);
        self.extract_interactive_to(path, output_dir, prompt)
    }

    /// Extract into `output_dir`, prompting up to the configured attempt limit.
    pub fn extract_interactive_to<P>(
        &self,
        path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        prompt: &mut P,
    ) -> Result<ExtractionReport>
    where
        P: PasswordPrompt + ?Sized,
    {
        let max_attempts = self.config.max_password_attempts;
        self.run(path.as_ref(), output_dir.as_ref(), |doc| {
            doc.unlock_interactive(prompt, max_attempts)
        })
    }

    fn run<F>(&self, path: &Path, output_dir: &Path, unlock: F) -> Result<ExtractionReport>
    where
        F: FnOnce(&mut OpenDocument<O::Source>) -> Result<()>,
    {
        log::info!("Starting PDF content extraction: {}", path.display());
        let mut state = ExtractionState::Unopened;
        let result = self.run_states(path, output_dir, unlock, &mut state);

        match &result {
            Ok(report) => log::info!(
                "Extraction complete! Results saved in: {}",
                report.output_dir.display()
            ),
            Err(e) => log::error!("Extraction failed ({:?}): {}", state, e),
        }
        self.observer.on_finished(&result);
        result
    }

    fn run_states<F>(
        &self,
        path: &Path,
        output_dir: &Path,
        unlock: F,
        state: &mut ExtractionState,
    ) -> Result<ExtractionReport>
    where
        F: FnOnce(&mut OpenDocument<O::Source>) -> Result<()>,
    {
        enter(state, ExtractionState::Unlocking);
        let source = self.opener.open(path).map_err(|e| {
            enter(state, ExtractionState::OpenFailed);
            match e {
                Error::Open { .. } => e,
                other => Error::open(path, other),
            }
        })?;

        // Dropping `doc` releases the handle on every path below
        let mut doc = OpenDocument::new(source, path);
        if let Err(e) = unlock(&mut doc) {
            let next = if e.is_recoverable() {
                ExtractionState::PasswordRequired
            } else {
                ExtractionState::OpenFailed
            };
            enter(state, next);
            return Err(e);
        }
        enter(state, ExtractionState::Unlocked);

        let page_count = doc.page_count();
        self.observer.on_unlocked(path, page_count);

        // Directories are created only once the document is readable
        let writer = ArtifactWriter::new(output_dir);
        if let Err(e) = writer.create_dirs() {
            enter(state, ExtractionState::Aborted);
            return Err(e);
        }

        enter(state, ExtractionState::ExtractingPages);
        let mut report = ExtractionReport::new(output_dir, page_count);
        for page in 0..page_count {
            let page_no = page + 1;
            self.observer.on_page_start(page_no, page_count);
            if let Err(e) = self.extract_page(&doc, &writer, page, &mut report) {
                enter(state, ExtractionState::Aborted);
                return Err(Error::RunAborted {
                    page: page_no,
                    source: Box::new(e),
                });
            }
        }

        let metadata = doc.metadata().and_then(|m| writer.write_metadata(&m));
        if let Err(e) = metadata {
            enter(state, ExtractionState::Aborted);
            return Err(e);
        }

        enter(state, ExtractionState::Completed);
        Ok(report)
    }

    /// Text, then tables, then images for one zero-based page.
    fn extract_page(
        &self,
        doc: &O::Source,
        writer: &ArtifactWriter,
        page: u32,
        report: &mut ExtractionReport,
    ) -> Result<()> {
        let page_no = page + 1;

        let text = doc.page_text(page)?;
        writer.write_page_text(page_no, &text)?;
        self.observer
            .on_artifact(page_no, ArtifactKind::Text, &ArtifactOutcome::Written(2));

        let tables = self.isolated(writer, page_no, ArtifactKind::Tables, report, || {
            let tables = doc.page_tables(page)?;
            writer.write_tables(page_no, &tables)
        })?;
        report.tables_written += tables;

        let images = self.isolated(writer, page_no, ArtifactKind::Images, report, || {
            let images = doc.page_images(page)?;
            writer.write_images(page_no, &images)
        })?;
        report.images_written += images;

        Ok(())
    }

    /// Run one table or image step, turning its failure into a sentinel.
    ///
    /// Errors clearing stale files or writing the sentinel itself escape.
    fn isolated<F>(
        &self,
        writer: &ArtifactWriter,
        page_no: u32,
        kind: ArtifactKind,
        report: &mut ExtractionReport,
        step: F,
    ) -> Result<usize>
    where
        F: FnOnce() -> Result<usize>,
    {
        writer.clear_page(kind, page_no)?;

        let outcome = match step() {
            Ok(0) => ArtifactOutcome::Empty,
            Ok(n) => ArtifactOutcome::Written(n),
            Err(e) if kind.isolates_failures() => {
                log::warn!("Page {}: {} extraction failed: {}", page_no, kind, e);
                writer.clear_page(kind, page_no)?;
                writer.write_error(kind, page_no, &e)?;
                report.page_failures.push(PageFailure {
                    page: page_no,
                    kind,
                    message: e.to_string(),
                });
                ArtifactOutcome::Failed(e.to_string())
            }
            Err(e) => return Err(e),
        };

        self.observer.on_artifact(page_no, kind, &outcome);
        Ok(match outcome {
            ArtifactOutcome::Written(n) => n,
            _ => 0,
        })
    }
}

fn enter(state: &mut ExtractionState, next: ExtractionState) {
    log::debug!("Extraction state: {:?} -> {:?}", state, next);
    *state = next;
}

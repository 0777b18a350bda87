//! Progress hooks for extraction runs.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use pdfsift::extract::ExtractionObserver;
//!
//! #[derive(Default)]
//! struct PageCounter(Cell<u32>);
//!
//! impl ExtractionObserver for PageCounter {
//!     fn on_page_start(&self, _page: u32, _total: u32) {
//!         self.0.set(self.0.get() + 1);
//!     }
//! }
//! ```

use std::path::Path;

use crate::error::Result;

use super::{ArtifactKind, ArtifactOutcome, ExtractionReport};

/// Receives lifecycle events from [`PdfExtractor`](super::PdfExtractor).
///
/// All methods do nothing by default. Page numbers are 1-based.
pub trait ExtractionObserver {
    /// The document is open and readable.
    fn on_unlocked(&self, path: &Path, page_count: u32) {
        let _ = (path, page_count);
    }

    /// Extraction of `page` (of `total`) is starting.
    fn on_page_start(&self, page: u32, total: u32) {
        let _ = (page, total);
    }

    /// One artifact kind of a page has been handled.
    fn on_artifact(&self, page: u32, kind: ArtifactKind, outcome: &ArtifactOutcome) {
        let _ = (page, kind, outcome);
    }

    /// The run ended, successfully or not.
    fn on_finished(&self, result: &Result<ExtractionReport>) {
        let _ = result;
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ExtractionObserver for NoopObserver {}

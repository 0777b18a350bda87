//! Extraction model types.
//!
//! These are the values that flow from the PDF backend to the artifact
//! writer. They carry no knowledge of the on-disk layout.

mod image;
mod metadata;
mod page;
mod table;

pub use image::{ExtractedImage, ImageEncoding};
pub use metadata::{parse_pdf_date, DocumentMetadata};
pub use page::PageText;
pub use table::{normalize_cell, DetectionStrategy, Rect, Table};

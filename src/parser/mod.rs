//! PDF parsing module.

pub mod backend;
mod images;
mod lattice;
mod layout;
mod pdf_parser;
mod security;
mod table_detector;

pub use backend::{ContentOp, PageId, PdfOpener, PdfSource, PdfValue, SimpleDecoder, TextDecoder};
pub use lattice::LatticeDetector;
pub use layout::{interpret, ContentInterpreter, Matrix, PageLayout, Segment, TextLine, TextSpan};
pub use pdf_parser::{LopdfDecoder, LopdfOpener, LopdfSource};
pub use table_detector::{
    detect_tables, DetectedTable, TableDetector, TableDetectorConfig, TableRowData,
};

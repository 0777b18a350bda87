//! PDF backend abstraction layer.
//!
//! [`PdfSource`] is the handle the extractor drives page by page and
//! [`PdfOpener`] turns a path into one. The concrete lopdf implementation
//! lives in `pdf_parser`; tests plug in their own. Content streams are
//! handed to the layout interpreter as [`ContentOp`] values so that
//! interpretation never touches library-specific types.

use std::path::Path;

use crate::error::Result;
use crate::model::{DocumentMetadata, ExtractedImage, PageText, Table};

/// Page identifier: (object number, generation number).
pub type PageId = (u32, u16);

/// A value from a PDF content stream operand.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Other,
}

impl PdfValue {
    /// Extract a number, accepting both integers and reals.
    pub fn as_number(&self) -> Option<f32> {
        get_number_from_value(self)
    }
}

/// A single operation from a PDF content stream.
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

impl ContentOp {
    pub fn new(operator: impl Into<String>, operands: Vec<PdfValue>) -> Self {
        Self {
            operator: operator.into(),
            operands,
        }
    }

    /// Numeric operand at `idx`, if present.
    pub fn number(&self, idx: usize) -> Option<f32> {
        self.operands.get(idx).and_then(PdfValue::as_number)
    }
}

/// Decodes shown strings into Unicode using the page's font resources.
pub trait TextDecoder {
    /// Decode `bytes` shown with the font resource named `font`.
    /// Falls back to simple decoding if the font or encoding is unavailable.
    fn decode(&self, font: &[u8], bytes: &[u8]) -> String;
}

/// An opened PDF document, owned by one extraction call.
///
/// Page indexes are zero-based throughout.
pub trait PdfSource {
    /// Number of pages.
    fn page_count(&self) -> u32;

    /// Whether the file is encrypted, regardless of unlock state.
    fn is_encrypted(&self) -> bool;

    /// Whether content is still locked behind a password.
    fn needs_password(&self) -> bool;

    /// Try to unlock with `password`.
    ///
    /// `Ok(false)` means the password was wrong. An error means no password
    /// can help, e.g. the security handler is not supported.
    fn authenticate(&mut self, password: &str) -> Result<bool>;

    /// Document metadata in source order.
    fn metadata(&self) -> Result<DocumentMetadata>;

    /// Raw and sorted text renderings of a page.
    fn page_text(&self, page: u32) -> Result<PageText>;

    /// Tables detected on a page, in detection order.
    fn page_tables(&self, page: u32) -> Result<Vec<Table>>;

    /// Images referenced by a page, in enumeration order.
    fn page_images(&self, page: u32) -> Result<Vec<ExtractedImage>>;
}

/// Opens a path into a [`PdfSource`].
pub trait PdfOpener {
    type Source: PdfSource;

    /// Open the file. Any failure here is an open failure.
    fn open(&self, path: &Path) -> Result<Self::Source>;
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    // Try UTF-16BE first (BOM marker)
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter_map(|c| {
                if c.len() == 2 {
                    Some(u16::from_be_bytes([c[0], c[1]]))
                } else {
                    None
                }
            })
            .collect();
        return String::from_utf16(&utf16).unwrap_or_default();
    }

    // Try UTF-8
    if let Ok(s) = String::from_utf8(bytes.to_vec()) {
        return s;
    }

    // Fallback: Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

/// Helper: extract a number from a [`PdfValue`].
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match val {
        PdfValue::Integer(i) => Some(*i as f32),
        PdfValue::Real(r) => Some(*r),
        _ => None,
    }
}

/// Decoder that ignores fonts and applies [`decode_text_simple`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleDecoder;

impl TextDecoder for SimpleDecoder {
    fn decode(&self, _font: &[u8], bytes: &[u8]) -> String {
        decode_text_simple(bytes)
    }
}

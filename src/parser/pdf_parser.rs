//! PDF document source backed by lopdf.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use lopdf::{Dictionary, Document as LopdfDocument, Object};

use crate::detect::detect_format_from_path;
use crate::error::{Error, Result};
use crate::model::{DocumentMetadata, ExtractedImage, PageText, Table};

use super::backend::{
    decode_text_simple, ContentOp, PageId, PdfOpener, PdfSource, PdfValue, TextDecoder,
};
use super::images::collect_page_images;
use super::layout::{interpret, PageLayout};
use super::security;
use super::table_detector::{detect_tables, TableDetectorConfig};

/// Opens files as [`LopdfSource`]s.
#[derive(Debug, Clone, Default)]
pub struct LopdfOpener {
    table_config: TableDetectorConfig,
}

impl LopdfOpener {
    /// Create an opener whose sources detect tables with `table_config`.
    pub fn new(table_config: TableDetectorConfig) -> Self {
        Self { table_config }
    }
}

impl PdfOpener for LopdfOpener {
    type Source = LopdfSource;

    fn open(&self, path: &Path) -> Result<LopdfSource> {
        LopdfSource::open(path, self.table_config.clone())
    }
}

/// An opened PDF document.
pub struct LopdfSource {
    doc: LopdfDocument,
    path: PathBuf,
    pages: Vec<PageId>,
    encrypted: bool,
    locked: bool,
    encryption: Option<String>,
    table_config: TableDetectorConfig,
    layout_cache: RefCell<Option<(u32, Rc<PageLayout>)>>,
}

impl LopdfSource {
    /// Open a PDF file.
    ///
    /// An encrypted file is tried with the empty user password, which is how
    /// documents with only an owner password are read. A security handler
    /// that cannot be decrypted at all fails the open.
    pub fn open<P: AsRef<Path>>(path: P, table_config: TableDetectorConfig) -> Result<Self> {
        let path = path.as_ref();

        // Verify it's a PDF
        detect_format_from_path(path).map_err(|e| Error::open(path, e))?;

        let doc = LopdfDocument::load(path).map_err(|e| Error::open(path, e))?;
        if doc.trailer.get(b"Root").is_err() {
            return Err(Error::open(path, "missing document catalog"));
        }
        let pages: Vec<PageId> = doc.get_pages().into_values().collect();
        let encrypted = doc.is_encrypted();
        let encryption = if encrypted {
            describe_encryption(&doc)
        } else {
            None
        };

        let mut source = Self {
            doc,
            path: path.to_path_buf(),
            pages,
            encrypted,
            locked: encrypted,
            encryption,
            table_config,
            layout_cache: RefCell::new(None),
        };

        if encrypted && source.authenticate("")? {
            log::debug!("Opened encrypted PDF with empty user password");
        }
        log::debug!(
            "Loaded {} ({} pages, encrypted: {})",
            path.display(),
            source.pages.len(),
            encrypted
        );
        Ok(source)
    }

    /// Get PDF version.
    pub fn version(&self) -> String {
        self.doc.version.to_string()
    }

    fn page_id(&self, page: u32) -> Result<PageId> {
        self.pages
            .get(page as usize)
            .copied()
            .ok_or(Error::PageOutOfRange(page, self.page_count()))
    }

    /// Interpret a page, reusing the last result for repeated calls on it.
    fn page_layout(&self, page: u32) -> Result<Rc<PageLayout>> {
        if let Some((cached_page, layout)) = self.layout_cache.borrow().as_ref() {
            if *cached_page == page {
                return Ok(Rc::clone(layout));
            }
        }

        let page_id = self.page_id(page)?;
        let ops = decode_content(&self.page_content(page_id)?)?;
        let decoder = LopdfDecoder::new(&self.doc, page_id);
        let layout = Rc::new(interpret(&ops, &decoder));

        *self.layout_cache.borrow_mut() = Some((page, Rc::clone(&layout)));
        Ok(layout)
    }

    /// Concatenated, decompressed content streams of a page.
    ///
    /// A page without `/Contents` is blank, not an error.
    fn page_content(&self, page_id: PageId) -> Result<Vec<u8>> {
        let page_dict = self.doc.get_dictionary(page_id)?;

        let contents = match page_dict.get(b"Contents") {
            Ok(contents) => contents,
            Err(_) => return Ok(Vec::new()),
        };

        let refs: Vec<&Object> = match contents {
            Object::Array(arr) => arr.iter().collect(),
            other => vec![other],
        };

        let mut content = Vec::new();
        for obj in refs {
            let stream = match obj {
                Object::Reference(r) => self.doc.get_object(*r)?.as_stream()?,
                Object::Stream(s) => s,
                _ => return Err(Error::PdfParse("Invalid content stream".to_string())),
            };
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            content.extend_from_slice(&data);
            content.push(b'\n');
        }
        Ok(content)
    }

    fn info_dictionary(&self) -> Option<&Dictionary> {
        match self.doc.trailer.get(b"Info").ok()? {
            Object::Reference(r) => self.doc.get_dictionary(*r).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }
}

impl PdfSource for LopdfSource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn needs_password(&self) -> bool {
        self.locked
    }

    fn authenticate(&mut self, password: &str) -> Result<bool> {
        if !self.locked {
            return Ok(true);
        }

        // Decrypt a copy so a wrong password leaves the handle untouched
        let mut candidate = self.doc.clone();
        match security::decrypt(&mut candidate, password).map_err(Error::from) {
            Ok(()) => {
                self.doc = candidate;
                self.locked = false;
                self.layout_cache.borrow_mut().take();
                Ok(true)
            }
            Err(Error::IncorrectPassword) => {
                log::debug!("Password rejected");
                Ok(false)
            }
            Err(e) => {
                let handler = self.encryption.as_deref().unwrap_or("unknown handler");
                log::error!("Cannot decrypt {}: {}", self.path.display(), e);
                Err(Error::open(&self.path, format!("{} ({})", e, handler)))
            }
        }
    }

    fn metadata(&self) -> Result<DocumentMetadata> {
        let mut metadata = DocumentMetadata::with_version(self.version());
        metadata.page_count = self.page_count();
        metadata.encrypted = self.encrypted;

        metadata.push("format", format!("PDF {}", self.version()));

        if let Some(info) = self.info_dictionary() {
            for (key, value) in info.iter() {
                if let Some(text) = object_to_string(&self.doc, value) {
                    metadata.push(String::from_utf8_lossy(key), text);
                }
            }
        }

        if let Some(encryption) = &self.encryption {
            metadata.push("encryption", encryption.clone());
        }

        Ok(metadata)
    }

    fn page_text(&self, page: u32) -> Result<PageText> {
        let layout = self
            .page_layout(page)
            .map_err(|e| Error::TextExtract(format!("page {}: {}", page + 1, e)))?;
        Ok(PageText::new(layout.raw_text(), layout.sorted_text()))
    }

    fn page_tables(&self, page: u32) -> Result<Vec<Table>> {
        let layout = self
            .page_layout(page)
            .map_err(|e| Error::TableExtract(e.to_string()))?;
        Ok(detect_tables(&layout, &self.table_config))
    }

    fn page_images(&self, page: u32) -> Result<Vec<ExtractedImage>> {
        let page_id = self.page_id(page)?;
        collect_page_images(&self.doc, page_id)
    }
}

/// Decodes shown strings through the page's font encodings.
pub struct LopdfDecoder<'a> {
    doc: &'a LopdfDocument,
    fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
}

impl<'a> LopdfDecoder<'a> {
    pub fn new(doc: &'a LopdfDocument, page_id: PageId) -> Self {
        let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
        Self { doc, fonts }
    }
}

impl TextDecoder for LopdfDecoder<'_> {
    fn decode(&self, font: &[u8], bytes: &[u8]) -> String {
        if let Some(font_dict) = self.fonts.get(font) {
            if let Ok(enc) = font_dict.get_font_encoding(self.doc) {
                if let Ok(text) = LopdfDocument::decode_text(&enc, bytes) {
                    return text;
                }
            }
        }
        decode_text_simple(bytes)
    }
}

/// Parse raw content stream bytes into a sequence of operations.
fn decode_content(data: &[u8]) -> Result<Vec<ContentOp>> {
    let content =
        lopdf::content::Content::decode(data).map_err(|e| Error::PdfParse(e.to_string()))?;

    Ok(content
        .operations
        .into_iter()
        .map(|op| ContentOp {
            operator: op.operator,
            operands: op.operands.iter().map(convert_object).collect(),
        })
        .collect())
}

/// Convert a `lopdf::Object` to [`PdfValue`].
fn convert_object(obj: &Object) -> PdfValue {
    match obj {
        Object::Integer(i) => PdfValue::Integer(*i),
        Object::Real(r) => PdfValue::Real(*r),
        Object::Name(n) => PdfValue::Name(n.clone()),
        Object::String(b, _) => PdfValue::Str(b.clone()),
        Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        _ => PdfValue::Other,
    }
}

/// Summarize the security handler, e.g. `Standard V2 R3`.
fn describe_encryption(doc: &LopdfDocument) -> Option<String> {
    let dict = match doc.trailer.get(b"Encrypt").ok()? {
        Object::Reference(r) => doc.get_dictionary(*r).ok()?,
        Object::Dictionary(d) => d,
        _ => return None,
    };
    let filter = dict
        .get(b"Filter")
        .and_then(Object::as_name_str)
        .unwrap_or("Unknown");
    let mut parts = vec![filter.to_string()];
    if let Ok(v) = dict.get(b"V").and_then(Object::as_i64) {
        parts.push(format!("V{}", v));
    }
    if let Ok(r) = dict.get(b"R").and_then(Object::as_i64) {
        parts.push(format!("R{}", r));
    }
    Some(parts.join(" "))
}

/// Stringify an Info dictionary value. References are followed once.
fn object_to_string(doc: &LopdfDocument, obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).to_string()),
        Object::Integer(i) => Some(i.to_string()),
        Object::Real(r) => Some(r.to_string()),
        Object::Boolean(b) => Some(b.to_string()),
        Object::Reference(r) => match doc.get_object(*r).ok()? {
            Object::Reference(_) => None,
            resolved => object_to_string(doc, resolved),
        },
        _ => None,
    }
}

/// Decode a text string: UTF-16BE with BOM, else UTF-8, else Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    decode_text_simple(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Stream};
    use tempfile::TempDir;

    fn write_pdf(dir: &TempDir, info: Option<Dictionary>) -> std::path::PathBuf {
        let mut doc = LopdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal("Hello")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(info) = info {
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }

        let path = dir.path().join("doc.pdf");
        doc.save(&path).unwrap();
        path
    }

    #[test]
    fn test_open_and_read_text() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(&dir, None);
        let source = LopdfSource::open(&path, TableDetectorConfig::default()).unwrap();

        assert_eq!(source.page_count(), 1);
        assert!(!source.is_encrypted());
        assert!(!source.needs_password());

        let text = source.page_text(0).unwrap();
        assert_eq!(text.raw, "Hello\n");
        assert_eq!(text.sorted, "Hello\n");
        assert!(source.page_tables(0).unwrap().is_empty());
        assert!(source.page_images(0).unwrap().is_empty());
    }

    #[test]
    fn test_metadata_in_dictionary_order() {
        let dir = TempDir::new().unwrap();
        let info = dictionary! {
            "Title" => Object::string_literal("Quarterly"),
            "Author" => Object::string_literal("Finance"),
            "Trapped" => "False",
        };
        let path = write_pdf(&dir, Some(info));
        let source = LopdfSource::open(&path, TableDetectorConfig::default()).unwrap();
        let meta = source.metadata().unwrap();

        let keys: Vec<&str> = meta.entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["format", "Title", "Author", "Trapped"]);
        assert_eq!(meta.get("format"), Some("PDF 1.5"));
        assert_eq!(meta.title(), Some("Quarterly"));
        assert_eq!(meta.page_count, 1);
        assert!(!meta.encrypted);
    }

    #[test]
    fn test_page_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = write_pdf(&dir, None);
        let source = LopdfSource::open(&path, TableDetectorConfig::default()).unwrap();
        assert!(matches!(
            source.page_images(3),
            Err(Error::PageOutOfRange(3, 1))
        ));
    }

    #[test]
    fn test_open_rejects_non_pdf() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, b"just some text").unwrap();

        let err = LopdfSource::open(&path, TableDetectorConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_open_missing_file() {
        let err = LopdfOpener::default()
            .open(Path::new("/nonexistent/file.pdf"))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_object_to_string_utf16() {
        let doc = LopdfDocument::with_version("1.5");
        let bytes = vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        let obj = Object::String(bytes, lopdf::StringFormat::Hexadecimal);
        assert_eq!(object_to_string(&doc, &obj), Some("Hi".to_string()));
        assert_eq!(
            object_to_string(&doc, &Object::Boolean(true)),
            Some("true".to_string())
        );
    }
}

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use lopdf::content::{Content, Operation};
use lopdf::encryption::{decrypt_object, get_encryption_key};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use md5::{Digest, Md5};
use rc4::consts::{U16, U5};
use rc4::{KeyInit, Rc4, StreamCipher};

use pdfsift::{
    DetectionStrategy, DocumentMetadata, Error, ExtractedImage, ImageEncoding, PageText,
    PdfOpener, PdfSource, Result, Table,
};

/// An image XObject placed on a generated page.
pub enum TestImage {
    /// DCT-encoded bytes, written through as JPEG
    Jpeg(Vec<u8>),
    /// Unfiltered 8-bit grayscale samples
    Gray { width: i64, height: i64, samples: Vec<u8> },
}

/// One page of a generated PDF.
#[derive(Default)]
pub struct TestPage {
    pub operations: Vec<Operation>,
    pub images: Vec<TestImage>,
}

impl TestPage {
    /// A page showing each `(x, y, text)` in 10pt Helvetica.
    pub fn text(lines: &[(i64, i64, &str)]) -> Self {
        let mut page = Self::default();
        page.push_text(lines);
        page
    }

    pub fn push_text(&mut self, lines: &[(i64, i64, &str)]) {
        for (x, y, text) in lines {
            self.operations.extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![(*x).into(), (*y).into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]);
        }
    }

    /// Stroke a straight line.
    pub fn push_line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64) {
        self.operations.extend([
            Operation::new("m", vec![x0.into(), y0.into()]),
            Operation::new("l", vec![x1.into(), y1.into()]),
            Operation::new("S", vec![]),
        ]);
    }

    /// A ruled 2x2 grid holding `A B / 1 2`.
    pub fn ruled_table() -> Self {
        let mut page = Self::default();
        for x in [100, 200, 300] {
            page.push_line(x, 660, x, 700);
        }
        for y in [700, 680, 660] {
            page.push_line(100, y, 300, y);
        }
        page.push_text(&[(110, 686, "A"), (210, 686, "B"), (110, 666, "1"), (210, 666, "2")]);
        page
    }
}

/// Write a PDF with the given pages and Info entries.
pub fn write_pdf(path: &Path, pages: Vec<TestPage>, info: &[(&str, &str)]) -> PathBuf {
    build_document(pages, info).save(path).unwrap();
    path.to_path_buf()
}

fn build_document(pages: Vec<TestPage>, info: &[(&str, &str)]) -> Document {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut xobjects = lopdf::Dictionary::new();
        let mut operations = page.operations;
        for (i, image) in page.images.into_iter().enumerate() {
            let name = format!("Im{}", i + 1);
            let stream = match image {
                TestImage::Jpeg(data) => Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => 1,
                        "Height" => 1,
                        "BitsPerComponent" => 8,
                        "ColorSpace" => "DeviceRGB",
                        "Filter" => "DCTDecode",
                    },
                    data,
                ),
                TestImage::Gray { width, height, samples } => Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => width,
                        "Height" => height,
                        "BitsPerComponent" => 8,
                        "ColorSpace" => "DeviceGray",
                    },
                    samples,
                ),
            };
            xobjects.set(name.as_bytes().to_vec(), doc.add_object(stream));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if !info.is_empty() {
        let mut dict = lopdf::Dictionary::new();
        for (key, value) in info {
            dict.set(key.as_bytes().to_vec(), Object::string_literal(*value));
        }
        let info_id = doc.add_object(dict);
        doc.trailer.set("Info", info_id);
    }
    doc
}

/// Standard security handler applied by [`write_encrypted_pdf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// 40-bit RC4, V1 R2
    Rc4,
    /// AES-128 crypt filter, V4 R4
    Aes128,
    /// AES-256, V5 R6. Only the dictionary is written; content stays plain.
    Aes256,
}

/// Password padding string of the standard security handler.
const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// Only the user password is exercised, so /O holds arbitrary bytes.
const OWNER_ENTRY: [u8; 32] = [0x4F; 32];

const FILE_ID: &[u8; 16] = b"pdfsift-fixture1";

const PERMISSIONS: i64 = -4;

/// Write a PDF whose strings and streams are encrypted for `user_password`.
pub fn write_encrypted_pdf(
    path: &Path,
    pages: Vec<TestPage>,
    info: &[(&str, &str)],
    user_password: &str,
    protection: Protection,
) -> PathBuf {
    let mut doc = build_document(pages, info);
    let file_id = hex(FILE_ID);
    doc.trailer.set("ID", vec![file_id.clone(), file_id]);

    // lopdf derives the file key from a V1/V2 dictionary; R4 derives it the same way
    let (version, revision, bits) = match protection {
        Protection::Rc4 => (1, 2, 40),
        Protection::Aes128 | Protection::Aes256 => (2, 3, 128),
    };
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => version,
        "R" => revision,
        "Length" => bits,
        "O" => hex(&OWNER_ENTRY),
        "P" => PERMISSIONS,
    });
    doc.trailer.set("Encrypt", encrypt_id);
    let key = get_encryption_key(&doc, user_password, false).unwrap();

    let dict = match protection {
        Protection::Rc4 => {
            seal_objects(&mut doc, encrypt_id, |id, data| {
                decrypt_object(&key, id, &Object::String(data.to_vec(), StringFormat::Literal))
                    .unwrap()
            });
            dictionary! {
                "Filter" => "Standard",
                "V" => 1,
                "R" => 2,
                "Length" => 40,
                "O" => hex(&OWNER_ENTRY),
                "U" => hex(&rc4(&key, &PASSWORD_PAD)),
                "P" => PERMISSIONS,
            }
        }
        Protection::Aes128 => {
            seal_objects(&mut doc, encrypt_id, |id, data| aes_seal(&key, id, data));
            dictionary! {
                "Filter" => "Standard",
                "V" => 4,
                "R" => 4,
                "Length" => 128,
                "CF" => crypt_filters("AESV2", 16),
                "StmF" => "StdCF",
                "StrF" => "StdCF",
                "O" => hex(&OWNER_ENTRY),
                "U" => hex(&user_entry_r3(&key)),
                "P" => PERMISSIONS,
            }
        }
        Protection::Aes256 => dictionary! {
            "Filter" => "Standard",
            "V" => 5,
            "R" => 6,
            "Length" => 256,
            "CF" => crypt_filters("AESV3", 32),
            "StmF" => "StdCF",
            "StrF" => "StdCF",
            "O" => hex(&[0x4F; 48]),
            "U" => hex(&[0x55; 48]),
            "OE" => hex(&[0; 32]),
            "UE" => hex(&[0; 32]),
            "Perms" => hex(&[0; 16]),
            "P" => PERMISSIONS,
        },
    };
    doc.objects.insert(encrypt_id, Object::Dictionary(dict));

    doc.save(path).unwrap();
    path.to_path_buf()
}

fn hex(bytes: &[u8]) -> Object {
    Object::String(bytes.to_vec(), StringFormat::Hexadecimal)
}

fn crypt_filters(method: &str, length: i64) -> Dictionary {
    dictionary! {
        "StdCF" => dictionary! {
            "CFM" => method,
            "AuthEvent" => "DocOpen",
            "Length" => length,
        },
    }
}

/// Encrypt every string and stream except the `/Encrypt` dictionary.
fn seal_objects(doc: &mut Document, skip: ObjectId, cipher: impl Fn(ObjectId, &[u8]) -> Vec<u8>) {
    for (&id, obj) in doc.objects.iter_mut() {
        if id != skip {
            seal(obj, &|data: &[u8]| cipher(id, data));
        }
    }
}

fn seal(obj: &mut Object, cipher: &dyn Fn(&[u8]) -> Vec<u8>) {
    match obj {
        Object::String(bytes, _) => {
            let sealed = cipher(bytes);
            *bytes = sealed;
        }
        Object::Array(items) => items.iter_mut().for_each(|item| seal(item, cipher)),
        Object::Dictionary(dict) => dict.iter_mut().for_each(|(_, value)| seal(value, cipher)),
        Object::Stream(stream) => {
            stream.dict.iter_mut().for_each(|(_, value)| seal(value, cipher));
            let sealed = cipher(&stream.content);
            stream.set_content(sealed);
        }
        _ => {}
    }
}

/// RC4 keystream for the two key sizes the fixtures use.
fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    match key.len() {
        5 => Rc4::<U5>::new_from_slice(key).unwrap().apply_keystream(&mut out),
        16 => Rc4::<U16>::new_from_slice(key).unwrap().apply_keystream(&mut out),
        n => panic!("no RC4 fixture for {}-byte keys", n),
    }
    out
}

/// /U for revisions 3 and 4.
fn user_entry_r3(key: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(PASSWORD_PAD);
    hasher.update(FILE_ID);
    let mut entry = rc4(key, &hasher.finalize());
    for round in 1..=19u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
        entry = rc4(&round_key, &entry);
    }
    entry.extend_from_slice(&[0u8; 16]);
    entry
}

/// AES-128-CBC under the salted object key, IV first.
fn aes_seal(key: &[u8], (num, gen): ObjectId, data: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(&num.to_le_bytes()[..3]);
    hasher.update(&gen.to_le_bytes()[..2]);
    hasher.update(b"sAlT");
    let object_key = hasher.finalize();

    let iv = [0x24u8; 16];
    let mut buf = vec![0u8; data.len() + 16];
    buf[..data.len()].copy_from_slice(data);
    let sealed = cbc::Encryptor::<Aes128>::new_from_slices(&object_key, &iv)
        .unwrap()
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .unwrap()
        .to_vec();
    [iv.to_vec(), sealed].concat()
}

/// What a [`FakeSource`] page does when asked for an artifact.
#[derive(Clone, Default)]
pub struct FakePage {
    pub text: &'static str,
    pub tables: Vec<Table>,
    pub images: Vec<ExtractedImage>,
    pub text_error: bool,
    pub table_error: bool,
    pub image_error: bool,
}

impl FakePage {
    pub fn text(text: &'static str) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

/// In-memory document with an optional password.
#[derive(Clone)]
pub struct FakeSource {
    pub pages: Vec<FakePage>,
    pub password: Option<&'static str>,
    pub unlocked: bool,
    pub metadata_error: bool,
    pub attempts: Arc<AtomicU32>,
    pub closed: Arc<AtomicBool>,
}

impl FakeSource {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages,
            password: None,
            unlocked: true,
            metadata_error: false,
            attempts: Arc::new(AtomicU32::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_password(mut self, password: &'static str) -> Self {
        self.password = Some(password);
        self.unlocked = false;
        self
    }

    fn page(&self, page: u32) -> Result<&FakePage> {
        self.pages
            .get(page as usize)
            .ok_or(Error::PageOutOfRange(page, self.pages.len() as u32))
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl PdfSource for FakeSource {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn is_encrypted(&self) -> bool {
        self.password.is_some()
    }

    fn needs_password(&self) -> bool {
        !self.unlocked
    }

    fn authenticate(&mut self, password: &str) -> Result<bool> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.password == Some(password) {
            self.unlocked = true;
        }
        Ok(self.unlocked)
    }

    fn metadata(&self) -> Result<DocumentMetadata> {
        if self.metadata_error {
            return Err(Error::PdfParse("broken Info dictionary".to_string()));
        }
        let mut meta = DocumentMetadata::with_version("1.7");
        meta.push("format", "PDF 1.7");
        meta.push("Title", "Fake");
        meta.page_count = self.page_count();
        meta.encrypted = self.is_encrypted();
        Ok(meta)
    }

    fn page_text(&self, page: u32) -> Result<PageText> {
        let p = self.page(page)?;
        if p.text_error {
            return Err(Error::TextExtract("unreadable content stream".to_string()));
        }
        Ok(PageText::new(p.text.to_string(), p.text.to_string()))
    }

    fn page_tables(&self, page: u32) -> Result<Vec<Table>> {
        let p = self.page(page)?;
        if p.table_error {
            return Err(Error::TableExtract("boom".to_string()));
        }
        Ok(p.tables.clone())
    }

    fn page_images(&self, page: u32) -> Result<Vec<ExtractedImage>> {
        let p = self.page(page)?;
        if p.image_error {
            return Err(Error::ImageExtract("bad stream".to_string()));
        }
        Ok(p.images.clone())
    }
}

/// Hands out clones of a template source; `fail` makes opening fail.
pub struct FakeOpener {
    pub template: FakeSource,
    pub fail: bool,
}

impl FakeOpener {
    pub fn new(template: FakeSource) -> Self {
        Self {
            template,
            fail: false,
        }
    }
}

impl PdfOpener for FakeOpener {
    type Source = FakeSource;

    fn open(&self, path: &Path) -> Result<FakeSource> {
        if self.fail {
            return Err(Error::open(path, "damaged xref table"));
        }
        Ok(self.template.clone())
    }
}

pub fn table(rows: &[&[&str]]) -> Table {
    let cells = rows
        .iter()
        .map(|row| row.iter().map(|c| Some(c.to_string())).collect())
        .collect();
    Table::new(cells, DetectionStrategy::Stream)
}

pub fn jpeg() -> ExtractedImage {
    ExtractedImage::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 1], ImageEncoding::Jpeg)
}

/// Sorted file names in `dir`.
pub fn list(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

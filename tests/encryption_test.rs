//! Encrypted documents through the lopdf source, end to end.

mod common;

use std::fs;
use std::path::PathBuf;

use common::{list, write_encrypted_pdf, Protection, TestImage, TestPage};
use pdfsift::{
    CandidatePasswords, Error, ExtractorConfig, LopdfSource, PdfExtractor, PdfSource,
    TableDetectorConfig,
};
use tempfile::TempDir;

const PASSWORD: &str = "secret";

fn extractor(dir: &TempDir) -> PdfExtractor {
    let config = ExtractorConfig::new().with_extractions_dir(dir.path().join("extractions"));
    PdfExtractor::new(config).unwrap()
}

fn locked_pdf(dir: &TempDir, protection: Protection) -> PathBuf {
    let mut first = TestPage::ruled_table();
    first.images.push(TestImage::Gray {
        width: 2,
        height: 2,
        samples: vec![0, 255, 255, 0],
    });
    write_encrypted_pdf(
        &dir.path().join("locked.pdf"),
        vec![first, TestPage::text(&[(72, 700, "Hello")])],
        &[("Title", "Quarterly"), ("Author", "Finance")],
        PASSWORD,
        protection,
    )
}

fn assert_complete_tree(dir: &TempDir) {
    let out = dir.path().join("extractions").join("locked_extracted");
    assert_eq!(
        list(&out.join("text")),
        vec![
            "metadata.txt",
            "page_1_text.txt",
            "page_1_text_sorted.txt",
            "page_2_text.txt",
            "page_2_text_sorted.txt",
        ]
    );
    assert_eq!(
        list(&out.join("tables")),
        vec!["page_1_table_1.csv", "page_2_no_tables.txt"]
    );
    assert_eq!(
        list(&out.join("images")),
        vec!["page_1_image_1.png", "page_2_no_images.txt"]
    );

    let text = fs::read_to_string(out.join("text/page_2_text.txt")).unwrap();
    assert_eq!(text, "Hello\n");
    let csv = fs::read_to_string(out.join("tables/page_1_table_1.csv")).unwrap();
    assert_eq!(csv, "A,B\n1,2\n");

    let metadata = fs::read_to_string(out.join("text/metadata.txt")).unwrap();
    assert!(metadata.contains("Title: Quarterly\n"));
    assert!(metadata.contains("Author: Finance\n"));
    assert!(metadata.contains("Total pages: 2\n"));
    assert!(metadata.contains("PDF is encrypted: true\n"));
}

#[test]
fn test_rc4_requires_password() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Rc4);

    let err = extractor(&dir).extract(&input, None).unwrap_err();
    assert!(matches!(err, Error::PasswordRequired));
    assert!(!dir.path().join("extractions").join("locked_extracted").exists());
}

#[test]
fn test_rc4_wrong_password() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Rc4);

    let err = extractor(&dir).extract(&input, Some("guess")).unwrap_err();
    assert!(matches!(err, Error::IncorrectPassword));
    assert!(!dir.path().join("extractions").join("locked_extracted").exists());
}

#[test]
fn test_rc4_correct_password_writes_complete_tree() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Rc4);

    let report = extractor(&dir).extract(&input, Some(PASSWORD)).unwrap();
    assert_eq!(report.page_count, 2);
    assert_eq!(report.tables_written, 1);
    assert_eq!(report.images_written, 1);
    assert!(report.is_clean());
    assert_complete_tree(&dir);

    let metadata = fs::read_to_string(report.output_dir.join("text/metadata.txt")).unwrap();
    assert!(metadata.contains("encryption: Standard V1 R2\n"));
}

#[test]
fn test_aes_correct_password_writes_complete_tree() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Aes128);

    let report = extractor(&dir).extract(&input, Some(PASSWORD)).unwrap();
    assert_eq!(report.page_count, 2);
    assert!(report.is_clean());
    assert_complete_tree(&dir);

    let metadata = fs::read_to_string(report.output_dir.join("text/metadata.txt")).unwrap();
    assert!(metadata.contains("encryption: Standard V4 R4\n"));
}

#[test]
fn test_aes_wrong_password() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Aes128);

    let err = extractor(&dir).extract(&input, Some("guess")).unwrap_err();
    assert!(matches!(err, Error::IncorrectPassword));
}

#[test]
fn test_aes_interactive_unlocks_on_second_attempt() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Aes128);

    let mut prompt = CandidatePasswords::new(["guess", PASSWORD]);
    let report = extractor(&dir)
        .extract_interactive(&input, &mut prompt)
        .unwrap();
    assert_eq!(report.page_count, 2);
    assert_complete_tree(&dir);
}

#[test]
fn test_aes_interactive_attempt_limit() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Aes128);

    let mut prompt = CandidatePasswords::new(["a", "b", "c", PASSWORD]);
    let err = extractor(&dir)
        .extract_interactive(&input, &mut prompt)
        .unwrap_err();
    assert!(matches!(err, Error::MaxAttemptsExceeded(3)));
}

#[test]
fn test_aes_256_is_an_open_failure() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Aes256);

    let err = extractor(&dir).extract(&input, Some(PASSWORD)).unwrap_err();
    match err {
        Error::Open { path, reason } => {
            assert_eq!(path, input);
            assert!(reason.contains("not supported"), "{}", reason);
            assert!(reason.contains("Standard V5 R6"), "{}", reason);
        }
        other => panic!("expected an open failure, got {:?}", other),
    }
    assert!(!dir.path().join("extractions").exists());
}

#[test]
fn test_source_keeps_handle_on_wrong_password() {
    let dir = TempDir::new().unwrap();
    let input = locked_pdf(&dir, Protection::Aes128);

    let mut source = LopdfSource::open(&input, TableDetectorConfig::default()).unwrap();
    assert!(source.is_encrypted());
    assert!(source.needs_password());

    assert!(!source.authenticate("guess").unwrap());
    assert!(source.needs_password());

    assert!(source.authenticate(PASSWORD).unwrap());
    assert!(!source.needs_password());
    assert_eq!(source.page_text(1).unwrap().raw, "Hello\n");

    let metadata = source.metadata().unwrap();
    assert!(metadata.encrypted);
    assert_eq!(metadata.title(), Some("Quarterly"));
}

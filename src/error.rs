//! Error types for pdfsift.

use std::io;
use std::path::PathBuf;

use lopdf::encryption::DecryptionError;
use thiserror::Error;

use crate::extract::ArtifactKind;

/// Result type alias for pdfsift operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during PDF extraction.
#[derive(Error, Debug)]
pub enum Error {
    /// The file is missing, unreadable, or not a valid PDF.
    #[error("Failed to open PDF {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// The document is encrypted and no usable password was supplied.
    #[error("Document is encrypted and requires a password")]
    PasswordRequired,

    /// The supplied password did not authenticate.
    #[error("Incorrect password")]
    IncorrectPassword,

    /// Interactive unlocking used up every allowed attempt.
    #[error("Maximum password attempts exceeded ({0})")]
    MaxAttemptsExceeded(u32),

    /// A table or image step failed on one page. Recorded as a sentinel file.
    #[error("Page {page}: {kind} extraction failed: {message}")]
    PageArtifact {
        page: u32,
        kind: ArtifactKind,
        message: String,
    },

    /// The page loop hit a structural failure and stopped.
    #[error("Extraction aborted on page {page}: {source}")]
    RunAborted {
        page: u32,
        #[source]
        source: Box<Error>,
    },

    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file format is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// Error extracting text content.
    #[error("Text extraction error: {0}")]
    TextExtract(String),

    /// Error detecting or extracting tables.
    #[error("Table extraction error: {0}")]
    TableExtract(String),

    /// Error extracting images from PDF.
    #[error("Image extraction error: {0}")]
    ImageExtract(String),

    /// The security handler could not decrypt the document.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Error serializing table rows.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error serializing a report or summary.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// Configuration value rejected by validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::Open`] for `path`.
    pub fn open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller can retry the same call with more input.
    ///
    /// Only [`Error::PasswordRequired`] qualifies: re-invoking with a
    /// password may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::PasswordRequired)
    }

    /// Whether this error came from the unlock phase.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::PasswordRequired | Error::IncorrectPassword | Error::MaxAttemptsExceeded(_)
        )
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(DecryptionError::IncorrectPassword) => Error::IncorrectPassword,
            lopdf::Error::Decryption(e) => Error::Decryption(e.to_string()),
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PasswordRequired;
        assert_eq!(
            err.to_string(),
            "Document is encrypted and requires a password"
        );

        let err = Error::MaxAttemptsExceeded(3);
        assert_eq!(err.to_string(), "Maximum password attempts exceeded (3)");

        let err = Error::PageOutOfRange(10, 5);
        assert_eq!(
            err.to_string(),
            "Page 10 is out of range (document has 5 pages)"
        );
    }

    #[test]
    fn test_run_aborted_wraps_source() {
        let err = Error::RunAborted {
            page: 2,
            source: Box::new(Error::TextExtract("bad stream".into())),
        };
        assert_eq!(
            err.to_string(),
            "Extraction aborted on page 2: Text extraction error: bad stream"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_recoverable_only_for_password_required() {
        assert!(Error::PasswordRequired.is_recoverable());
        assert!(!Error::IncorrectPassword.is_recoverable());
        assert!(!Error::open("a.pdf", "missing").is_recoverable());
        assert!(Error::MaxAttemptsExceeded(3).is_auth_failure());
        assert!(!Error::PdfParse("x".into()).is_auth_failure());
    }

    #[test]
    fn test_lopdf_decryption_errors() {
        let err: Error = lopdf::Error::Decryption(DecryptionError::IncorrectPassword).into();
        assert!(matches!(err, Error::IncorrectPassword));

        let err: Error = lopdf::Error::Decryption(DecryptionError::UnsupportedEncryption).into();
        match err {
            Error::Decryption(reason) => assert!(reason.contains("not supported")),
            other => panic!("unexpected {:?}", other),
        }

        let err: Error = lopdf::Error::Type.into();
        assert!(matches!(err, Error::PdfParse(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}

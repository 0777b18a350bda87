//! On-disk artifact layout.
//!
//! ```text
//! <root>/text/page_<N>_text.txt
//! <root>/text/page_<N>_text_sorted.txt
//! <root>/text/metadata.txt
//! <root>/tables/page_<N>_table_<M>.csv | page_<N>_no_tables.txt | page_<N>_table_error.txt
//! <root>/images/page_<N>_image_<K>.<ext> | page_<N>_no_images.txt | page_<N>_image_error.txt
//! ```
//!
//! Page, table and image numbers are 1-based.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{DocumentMetadata, ExtractedImage, PageText, Table};

use super::ArtifactKind;

pub const TEXT_DIR: &str = "text";
pub const TABLES_DIR: &str = "tables";
pub const IMAGES_DIR: &str = "images";
pub const METADATA_FILE: &str = "metadata.txt";

pub const NO_TABLES_MESSAGE: &str = "No tables detected on this page.";
pub const NO_IMAGES_MESSAGE: &str = "No images detected on this page.";

const BANNER_WIDTH: usize = 50;

/// Writes one extraction's artifacts under a root directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn text_dir(&self) -> PathBuf {
        self.root.join(TEXT_DIR)
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.root.join(TABLES_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    fn dir_for(&self, kind: ArtifactKind) -> PathBuf {
        match kind {
            ArtifactKind::Text => self.text_dir(),
            ArtifactKind::Tables => self.tables_dir(),
            ArtifactKind::Images => self.images_dir(),
        }
    }

    /// Create `text/`, `tables/` and `images/`.
    pub fn create_dirs(&self) -> Result<()> {
        for dir in [self.text_dir(), self.tables_dir(), self.images_dir()] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Write both text renderings of a page.
    pub fn write_page_text(&self, page_no: u32, text: &PageText) -> Result<()> {
        let dir = self.text_dir();
        fs::write(dir.join(format!("page_{}_text.txt", page_no)), &text.raw)?;
        fs::write(
            dir.join(format!("page_{}_text_sorted.txt", page_no)),
            &text.sorted,
        )?;
        Ok(())
    }

    /// Remove every file an earlier run left for this page and kind.
    pub fn clear_page(&self, kind: ArtifactKind, page_no: u32) -> Result<()> {
        let prefixes: Vec<String> = match kind {
            ArtifactKind::Text => return Ok(()),
            ArtifactKind::Tables => vec![
                format!("page_{}_table_", page_no),
                format!("page_{}_no_tables.txt", page_no),
            ],
            ArtifactKind::Images => vec![
                format!("page_{}_image_", page_no),
                format!("page_{}_no_images.txt", page_no),
            ],
        };

        let dir = self.dir_for(kind);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if prefixes.iter().any(|p| name.starts_with(p.as_str())) {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Write the page's tables as CSV, or the "no tables" sentinel.
    ///
    /// Tables without any non-empty cell are skipped before numbering.
    /// Returns the number of CSV files written.
    pub fn write_tables(&self, page_no: u32, tables: &[Table]) -> Result<usize> {
        let staged = tables
            .iter()
            .filter(|t| !t.is_empty())
            .map(table_to_csv)
            .collect::<Result<Vec<Vec<u8>>>>()?;

        if staged.is_empty() {
            fs::write(
                self.tables_dir().join(format!("page_{}_no_tables.txt", page_no)),
                NO_TABLES_MESSAGE,
            )?;
            return Ok(0);
        }

        let files = staged
            .into_iter()
            .enumerate()
            .map(|(i, data)| (format!("page_{}_table_{}.csv", page_no, i + 1), data))
            .collect();
        self.commit(&self.tables_dir(), files)
    }

    /// Write the page's images, or the "no images" sentinel.
    ///
    /// Returns the number of image files written.
    pub fn write_images(&self, page_no: u32, images: &[ExtractedImage]) -> Result<usize> {
        if images.is_empty() {
            fs::write(
                self.images_dir().join(format!("page_{}_no_images.txt", page_no)),
                NO_IMAGES_MESSAGE,
            )?;
            return Ok(0);
        }

        let files = images
            .iter()
            .enumerate()
            .map(|(i, image)| {
                (
                    format!("page_{}_image_{}.{}", page_no, i + 1, image.extension()),
                    image.data.clone(),
                )
            })
            .collect();
        self.commit(&self.images_dir(), files)
    }

    /// Write the error sentinel for a failed table or image step.
    pub fn write_error(&self, kind: ArtifactKind, page_no: u32, error: &Error) -> Result<()> {
        let (file, label) = match kind {
            ArtifactKind::Tables => (format!("page_{}_table_error.txt", page_no), "tables"),
            ArtifactKind::Images => (format!("page_{}_image_error.txt", page_no), "images"),
            ArtifactKind::Text => {
                return Err(Error::Other(
                    "text failures have no error sentinel".to_string(),
                ))
            }
        };
        fs::write(
            self.dir_for(kind).join(file),
            format!("Error extracting {}: {}", label, error),
        )?;
        Ok(())
    }

    /// Write `text/metadata.txt`.
    pub fn write_metadata(&self, metadata: &DocumentMetadata) -> Result<()> {
        fs::write(self.text_dir().join(METADATA_FILE), render_metadata(metadata))?;
        Ok(())
    }

    /// Write staged files; on failure remove the ones already written.
    fn commit(&self, dir: &Path, files: Vec<(String, Vec<u8>)>) -> Result<usize> {
        let mut written: Vec<PathBuf> = Vec::with_capacity(files.len());
        for (name, data) in files {
            let path = dir.join(name);
            if let Err(e) = fs::write(&path, data) {
                for done in &written {
                    let _ = fs::remove_file(done);
                }
                return Err(e.into());
            }
            written.push(path);
        }
        Ok(written.len())
    }
}

/// Serialize a table: comma-delimited, minimal quoting, `\n` line endings.
pub fn table_to_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .flexible(false)
        .from_writer(Vec::new());
    for row in table.normalized_rows() {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::TableExtract(e.to_string()))
}

/// Render the metadata summary file.
pub fn render_metadata(metadata: &DocumentMetadata) -> String {
    let banner = "=".repeat(BANNER_WIDTH);
    let mut out = String::new();
    out.push_str("PDF Metadata:\n");
    out.push_str(&banner);
    out.push('\n');
    for (key, value) in &metadata.entries {
        out.push_str(&format!("{}: {}\n", key, value));
    }
    out.push_str("\nDocument Properties:\n");
    out.push_str(&banner);
    out.push('\n');
    out.push_str(&format!("Total pages: {}\n", metadata.page_count));
    out.push_str(&format!("PDF is encrypted: {}\n", metadata.encrypted));
    out
}

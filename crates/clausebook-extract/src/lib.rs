//! Clausebook extract: document text extraction
//!
//! [`FileTextExtractor`] implements [`TextExtractor`] for the formats the
//! pipeline accepts. The format is chosen by file extension before the
//! file is opened, so unsupported inputs fail without any I/O.

mod docx;
mod pdf;

use std::path::Path;

use clausebook_core::{DocumentFormat, Result, TextExtractor};
use tracing::{debug, instrument};

pub use docx::{docx_text, document_xml_text};
pub use pdf::{pdf_text, PAGE_SEPARATOR};

/// Extracts text from `.pdf` and `.docx` files on disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTextExtractor;

impl FileTextExtractor {
    pub fn new() -> Self {
        FileTextExtractor
    }
}

impl TextExtractor for FileTextExtractor {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn extract(&self, path: &Path) -> Result<String> {
        let format = DocumentFormat::from_path(path)?;
        let bytes = std::fs::read(path)?;
        let text = match format {
            DocumentFormat::Pdf => pdf_text(&bytes)?,
            DocumentFormat::Docx => docx_text(&bytes)?,
        };
        debug!(format = ?format, chars = text.len(), "document text extracted");
        Ok(text)
    }
}

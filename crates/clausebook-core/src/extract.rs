//! Text extraction seam. The concrete file extractor lives in
//! `clausebook-extract`.

use std::path::Path;

use crate::error::{ClausebookError, Result};

/// Supported source document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Dispatch on the lower-cased file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("docx") => Ok(Self::Docx),
            _ => Err(ClausebookError::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }
}

/// Returns the full text of a stored document.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_case_insensitively() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/Contract.PDF")).unwrap(),
            DocumentFormat::Pdf
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("nda.docx")).unwrap(),
            DocumentFormat::Docx
        );
    }

    #[test]
    fn rejects_unknown_and_missing_extensions() {
        for name in ["notes.txt", "contract.doc", "README"] {
            let err = DocumentFormat::from_path(Path::new(name)).unwrap_err();
            assert_eq!(err.code(), "unsupported_format");
        }
    }
}

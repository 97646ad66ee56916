//! PDF text via `pdf-extract`.

use std::io;

use clausebook_core::Result;

/// Form feed between pages, so page boundaries survive into the text.
pub const PAGE_SEPARATOR: &str = "\x0c";

pub fn pdf_text(bytes: &[u8]) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("pdf: {e}")))?;
    Ok(pages.join(PAGE_SEPARATOR))
}

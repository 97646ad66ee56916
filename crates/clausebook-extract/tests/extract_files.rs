use std::io::Write;
use std::path::Path;

use clausebook_core::{ClausebookError, TextExtractor};
use clausebook_extract::FileTextExtractor;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p><w:r><w:t>Dienstleistungsvertrag</w:t></w:r></w:p>
<w:p><w:r><w:t>§1 Zahlung: Zahlung innerhalb von 30 Tagen.</w:t></w:r></w:p>
</w:body></w:document>"#;

fn write_docx(path: &Path, document_xml: &str) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(b"<Types/>").unwrap();
    zip.start_file("word/document.xml", options).unwrap();
    zip.write_all(document_xml.as_bytes()).unwrap();
    zip.finish().unwrap();
}

#[test]
fn docx_paragraphs_are_joined_by_newlines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Vertrag.DOCX");
    write_docx(&path, DOCUMENT_XML);

    let text = FileTextExtractor::new().extract(&path).unwrap();
    assert_eq!(
        text,
        "Dienstleistungsvertrag\n§1 Zahlung: Zahlung innerhalb von 30 Tagen."
    );
}

#[test]
fn txt_is_rejected_before_reading() {
    let dir = tempdir().unwrap();
    // the file does not exist: dispatch must fail first
    let path = dir.path().join("contract.txt");

    let err = FileTextExtractor::new().extract(&path).unwrap_err();
    assert!(matches!(err, ClausebookError::UnsupportedFormat { .. }));
    assert!(err.to_string().contains("contract.txt"));
}

#[test]
fn missing_pdf_is_io_error() {
    let dir = tempdir().unwrap();
    let err = FileTextExtractor::new()
        .extract(&dir.path().join("missing.pdf"))
        .unwrap_err();
    assert_eq!(err.code(), "io");
}

#[test]
fn docx_without_document_part_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.docx");
    let file = std::fs::File::create(&path).unwrap();
    let mut zip = ZipWriter::new(file);
    zip.start_file("other.xml", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"<x/>").unwrap();
    zip.finish().unwrap();

    let err = FileTextExtractor::new().extract(&path).unwrap_err();
    assert!(err.to_string().contains("docx"));
}

//! DOCX text: paragraphs of `word/document.xml`, one per line.

use std::io::{self, Cursor, Read};
use std::sync::OnceLock;

use clausebook_core::Result;
use regex::Regex;

fn paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:p(?:\s[^>]*?)?(?:/>|>(.*?)</w:p>)").expect("paragraph pattern")
    })
}

fn run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab/>|<w:br/>|<w:cr/>").expect("run pattern")
    })
}

pub fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(invalid)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(invalid)?
        .read_to_string(&mut xml)?;
    Ok(document_xml_text(&xml))
}

/// Paragraph texts of a WordprocessingML body joined with `\n`. Empty
/// paragraphs are kept as empty lines.
pub fn document_xml_text(xml: &str) -> String {
    paragraph_re()
        .captures_iter(xml)
        .map(|p| p.get(1).map(|body| paragraph_text(body.as_str())).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(body: &str) -> String {
    let mut out = String::new();
    for token in run_re().captures_iter(body) {
        match token.get(1) {
            Some(text) => out.push_str(&unescape(text.as_str())),
            None if token[0].starts_with("<w:tab") => out.push('\t'),
            None => out.push('\n'),
        }
    }
    out
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn invalid(err: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("docx: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_runs_and_entities() {
        let xml = r#"<w:document><w:body>
<w:p w:rsidR="001"><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>§1 Payment</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Payment due in </w:t></w:r><w:r><w:t>30 days &amp; net.</w:t></w:r></w:p>
<w:p w:rsidR="002"/>
<w:p><w:r><w:t>A</w:t><w:tab/><w:t>B</w:t><w:br/><w:t>&lt;C&gt;</w:t></w:r></w:p>
</w:body></w:document>"#;
        assert_eq!(
            document_xml_text(xml),
            "§1 Payment\nPayment due in 30 days & net.\n\nA\tB\n<C>"
        );
    }

    #[test]
    fn tables_do_not_confuse_text_runs() {
        let xml = "<w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>";
        assert_eq!(document_xml_text(xml), "cell");
    }

    #[test]
    fn not_a_zip_is_invalid_data() {
        let err = docx_text(b"plain bytes").unwrap_err();
        assert_eq!(err.code(), "io");
        assert!(err.to_string().contains("docx"));
    }
}

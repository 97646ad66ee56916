//! Playbook serialisation: XML for downstream tools, Markdown for review,
//! JSON for round-tripping.

use std::path::Path;

use crate::error::Result;
use crate::model::Playbook;

/// Render `Playbook → Section(title) → Clause → Variant(favorability) →
/// Text, Justification` as an XML document.
pub fn render_playbook_xml(playbook: &Playbook) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<Playbook id=\"{}\" generated_at=\"{}\">\n",
        playbook.id,
        playbook.generated_at.to_rfc3339()
    ));

    for section in &playbook.sections {
        out.push_str(&format!("  <Section title=\"{}\">\n", escape_xml(&section.title)));
        out.push_str("    <Clause>\n");
        for variant in &section.variants {
            out.push_str(&format!(
                "      <Variant favorability=\"{}\">\n",
                escape_xml(variant.favorability.label())
            ));
            out.push_str(&format!("        <Text>{}</Text>\n", escape_xml(&variant.text)));
            out.push_str(&format!(
                "        <Justification>{}</Justification>\n",
                escape_xml(&variant.justification)
            ));
            if let Some(external) = &variant.external_justification {
                out.push_str(&format!(
                    "        <ExternalJustification>{}</ExternalJustification>\n",
                    escape_xml(external)
                ));
            }
            out.push_str("      </Variant>\n");
        }
        out.push_str("    </Clause>\n");
        out.push_str("  </Section>\n");
    }

    out.push_str("</Playbook>\n");
    out
}

pub fn write_playbook_xml(path: &Path, playbook: &Playbook) -> Result<()> {
    std::fs::write(path, render_playbook_xml(playbook))?;
    Ok(())
}

/// Render a Markdown review document.
pub fn render_playbook_md(playbook: &Playbook) -> String {
    let mut out = String::new();
    out.push_str("# Playbook\n\n");
    out.push_str(&format!(
        "- id: `{}`\n- generated: {}\n- sections: {}\n\n",
        playbook.id,
        playbook.generated_at.to_rfc3339(),
        playbook.sections.len()
    ));

    for section in &playbook.sections {
        out.push_str(&format!("## {}\n\n", section.title));
        for variant in &section.variants {
            out.push_str(&format!(
                "### {} / {}\n\n",
                variant.favorability.label(),
                variant.favorability.german_label()
            ));
            for line in variant.text.lines() {
                out.push_str(&format!("> {line}\n"));
            }
            out.push('\n');
            out.push_str(&format!("{}\n\n", variant.justification));
        }
    }
    out
}

pub fn write_playbook_md(path: &Path, playbook: &Playbook) -> Result<()> {
    std::fs::write(path, render_playbook_md(playbook))?;
    Ok(())
}

/// Write pretty-printed JSON.
pub fn write_playbook_json(path: &Path, playbook: &Playbook) -> Result<()> {
    let content = serde_json::to_string_pretty(playbook)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

//! Negotiation playbook model.

use chrono::{DateTime, Utc};
use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Position of a clause variant on the favorability spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Favorability {
    MostFavorable,
    Balanced,
    Acceptable,
    Unacceptable,
}

impl Favorability {
    /// Every label, most favorable first.
    pub const ALL: [Favorability; 4] = [
        Favorability::MostFavorable,
        Favorability::Balanced,
        Favorability::Acceptable,
        Favorability::Unacceptable,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::MostFavorable => "Most Favorable",
            Self::Balanced => "Balanced",
            Self::Acceptable => "Acceptable",
            Self::Unacceptable => "Unacceptable",
        }
    }

    pub fn german_label(self) -> &'static str {
        match self {
            Self::MostFavorable => "Am Vorteilhaftesten",
            Self::Balanced => "Ausgewogen",
            Self::Acceptable => "Akzeptabel",
            Self::Unacceptable => "Inakzeptabel",
        }
    }

    /// Lenient label parsing.
    ///
    /// Accepts the English and German labels in any case or separator
    /// style, and bilingual forms such as `"Balanced / Ausgewogen"`.
    pub fn parse_label(raw: &str) -> Option<Self> {
        raw.split('/').find_map(|part| {
            let key: String = part
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            match key.as_str() {
                "mostfavorable" | "mostfavourable" | "amvorteilhaftesten" => {
                    Some(Self::MostFavorable)
                }
                "balanced" | "ausgewogen" => Some(Self::Balanced),
                "acceptable" | "akzeptabel" => Some(Self::Acceptable),
                "unacceptable" | "inakzeptabel" => Some(Self::Unacceptable),
                _ => None,
            }
        })
    }
}

impl std::fmt::Display for Favorability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Favorability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Favorability {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Favorability::parse_label(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown favorability `{raw}`")))
    }
}

impl JsonSchema for Favorability {
    fn schema_name() -> String {
        "Favorability".to_owned()
    }

    fn json_schema(_gen: &mut SchemaGenerator) -> Schema {
        SchemaObject {
            instance_type: Some(InstanceType::String.into()),
            enum_values: Some(
                Favorability::ALL
                    .iter()
                    .map(|f| serde_json::Value::from(f.label()))
                    .collect(),
            ),
            ..Default::default()
        }
        .into()
    }
}

/// One canonical clause variant with its negotiation rationale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookVariant {
    pub text: String,
    pub favorability: Favorability,
    pub justification: String,
    /// Counterparty-facing argument, present when the split justification
    /// schema was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookSection {
    pub title: String,
    pub variants: Vec<PlaybookVariant>,
}

/// Unique identifier assigned to each generated playbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybookId(pub Uuid);

impl PlaybookId {
    pub fn new() -> Self {
        PlaybookId(Uuid::new_v4())
    }
}

impl Default for PlaybookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlaybookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root aggregate: one section per non-noise clause cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub id: PlaybookId,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<PlaybookSection>,
}

impl Playbook {
    pub fn new(sections: Vec<PlaybookSection>) -> Self {
        Self {
            id: PlaybookId::new(),
            generated_at: Utc::now(),
            sections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Variant as requested with a single justification field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VariantDraft {
    pub text: String,
    pub favorability: Favorability,
    pub justification: String,
}

/// Variant as requested with separate internal and external justifications.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SplitVariantDraft {
    pub text: String,
    pub favorability: Favorability,
    pub internal_justification: String,
    pub external_justification: String,
}

/// LLM-facing shape of a playbook section.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SectionDraft<V> {
    pub title: String,
    pub variants: Vec<V>,
}

impl From<VariantDraft> for PlaybookVariant {
    fn from(draft: VariantDraft) -> Self {
        Self {
            text: draft.text,
            favorability: draft.favorability,
            justification: draft.justification,
            external_justification: None,
        }
    }
}

impl From<SplitVariantDraft> for PlaybookVariant {
    fn from(draft: SplitVariantDraft) -> Self {
        Self {
            text: draft.text,
            favorability: draft.favorability,
            justification: format!(
                "{}\n\n{}",
                draft.internal_justification, draft.external_justification
            ),
            external_justification: Some(draft.external_justification),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_english_german_and_bilingual_labels() {
        assert_eq!(
            Favorability::parse_label("Most Favorable"),
            Some(Favorability::MostFavorable)
        );
        assert_eq!(
            Favorability::parse_label("most_favorable"),
            Some(Favorability::MostFavorable)
        );
        assert_eq!(
            Favorability::parse_label("Am Vorteilhaftesten"),
            Some(Favorability::MostFavorable)
        );
        assert_eq!(
            Favorability::parse_label("Acceptable / Akzeptabel"),
            Some(Favorability::Acceptable)
        );
        assert_eq!(
            Favorability::parse_label("INAKZEPTABEL"),
            Some(Favorability::Unacceptable)
        );
        assert_eq!(Favorability::parse_label("Great"), None);
    }

    #[test]
    fn favorability_serializes_as_canonical_label() {
        let v = serde_json::to_value(Favorability::Balanced).unwrap();
        assert_eq!(v, serde_json::json!("Balanced"));
        let back: Favorability = serde_json::from_value(serde_json::json!("Ausgewogen")).unwrap();
        assert_eq!(back, Favorability::Balanced);
    }

    #[test]
    fn favorability_schema_lists_all_labels() {
        let schema = serde_json::to_value(schemars::schema_for!(Favorability)).unwrap();
        let labels = schema["enum"].as_array().unwrap();
        assert_eq!(labels.len(), 4);
        assert!(labels.contains(&serde_json::json!("Most Favorable")));
    }

    #[test]
    fn split_variant_keeps_both_justifications() {
        let v: PlaybookVariant = SplitVariantDraft {
            text: "Payment within 60 days".into(),
            favorability: Favorability::MostFavorable,
            internal_justification: "improves cash flow".into(),
            external_justification: "aligns with industry terms".into(),
        }
        .into();
        assert!(v.justification.contains("improves cash flow"));
        assert!(v.justification.contains("aligns with industry terms"));
        assert_eq!(
            v.external_justification.as_deref(),
            Some("aligns with industry terms")
        );
    }
}

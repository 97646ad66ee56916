//! Playbook synthesis from clause clusters.
//!
//! One LLM call per non-noise cluster produces a section title and four
//! clause variants spanning the favorability spectrum. Responses are
//! validated before they become a [`PlaybookSection`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::cluster::ClusterMap;
use crate::config::{ClausebookConfig, FailurePolicy, PlaybookSettings, VariantSchema};
use crate::error::{ClausebookError, Result};
use crate::llm::{invoke_structured, CallPolicy, PromptMessage, StructuredLlm};
use crate::metrics::METRICS;
use crate::model::{
    Favorability, Playbook, PlaybookSection, PlaybookVariant, SectionDraft, SplitVariantDraft,
    VariantDraft,
};
use crate::obs;

/// Variants per playbook section, one per favorability label.
pub const VARIANTS_PER_SECTION: usize = Favorability::ALL.len();

/// A cluster left out of the playbook under [`FailurePolicy::Skip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCluster {
    pub cluster_id: i32,
    pub clauses: usize,
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookReport {
    pub playbook: Playbook,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedCluster>,
}

pub struct PlaybookGenerator {
    llm: Arc<dyn StructuredLlm>,
    settings: PlaybookSettings,
    policy: CallPolicy,
    output_language: String,
}

impl PlaybookGenerator {
    pub fn new(
        llm: Arc<dyn StructuredLlm>,
        settings: PlaybookSettings,
        policy: CallPolicy,
        output_language: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            settings,
            policy,
            output_language: output_language.into(),
        }
    }

    pub fn from_config(llm: Arc<dyn StructuredLlm>, config: &ClausebookConfig) -> Self {
        let policy = CallPolicy::new(config.llm.timeout()).with_retry(config.retry);
        Self::new(llm, config.playbook, policy, config.llm.output_language.clone())
    }

    /// Build a playbook; see [`PlaybookGenerator::generate_report`] for what
    /// happens to clusters that fail validation.
    pub async fn generate(&self, clusters: &ClusterMap) -> Result<Playbook> {
        Ok(self.generate_report(clusters).await?.playbook)
    }

    /// One section per non-noise cluster, in ascending cluster id order.
    ///
    /// Under [`FailurePolicy::Abort`] the first failing cluster ends the
    /// run. Under [`FailurePolicy::Skip`] clusters whose response fails
    /// validation are recorded in the report and generation continues;
    /// upstream and timeout errors still abort.
    #[instrument(skip(self, clusters), fields(clusters = clusters.cluster_count(), policy = ?self.settings.failure_policy))]
    pub async fn generate_report(&self, clusters: &ClusterMap) -> Result<PlaybookReport> {
        let mut sections = Vec::with_capacity(clusters.cluster_count());
        let mut skipped = Vec::new();

        for (cluster_id, clauses) in clusters.clusters() {
            if clauses.is_empty() {
                debug!(cluster_id, "empty cluster, nothing to generate");
                continue;
            }

            match self.generate_section(cluster_id, clauses).await {
                Ok(section) => sections.push(section),
                Err(err)
                    if self.settings.failure_policy == FailurePolicy::Skip
                        && err.is_schema_validation() =>
                {
                    METRICS.inc_clusters_skipped();
                    obs::emit_cluster_skipped(cluster_id, &err);
                    skipped.push(SkippedCluster {
                        cluster_id,
                        clauses: clauses.len(),
                        code: err.code().to_string(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            sections = sections.len(),
            skipped = skipped.len(),
            "playbook generated"
        );
        Ok(PlaybookReport {
            playbook: Playbook::new(sections),
            skipped,
        })
    }

    /// Synthesize the section for one cluster of clause texts.
    pub async fn generate_section(&self, cluster_id: i32, clauses: &[String]) -> Result<PlaybookSection> {
        let context = format!("playbook cluster {cluster_id}");
        let messages = [
            PromptMessage::system(section_prompt(
                self.settings.variant_schema,
                &self.output_language,
            )),
            PromptMessage::user(format!("Clauses:\n{}", clauses.join("\n\n"))),
        ];

        let (title, variants): (String, Vec<PlaybookVariant>) = match self.settings.variant_schema {
            VariantSchema::Single => {
                let draft: SectionDraft<VariantDraft> =
                    invoke_structured(self.llm.as_ref(), &messages, &context, &self.policy).await?;
                (draft.title, draft.variants.into_iter().map(Into::into).collect())
            }
            VariantSchema::Split => {
                let draft: SectionDraft<SplitVariantDraft> =
                    invoke_structured(self.llm.as_ref(), &messages, &context, &self.policy).await?;
                (draft.title, draft.variants.into_iter().map(Into::into).collect())
            }
        };

        let section = validate_section(title, variants).map_err(|reason| {
            METRICS.inc_schema_failures();
            ClausebookError::schema(&context, reason)
        })?;
        obs::emit_section_generated(cluster_id, clauses.len(), &section.title);
        Ok(section)
    }
}

/// Enforce the section contract: a title and exactly one variant per
/// favorability label with distinct texts. Variants come back ordered
/// most favorable first.
pub fn validate_section(
    title: String,
    mut variants: Vec<PlaybookVariant>,
) -> std::result::Result<PlaybookSection, String> {
    let title = title.trim().to_string();
    if title.is_empty() {
        return Err("section title is empty".into());
    }
    if variants.len() != VARIANTS_PER_SECTION {
        return Err(format!(
            "expected {VARIANTS_PER_SECTION} variants, got {}",
            variants.len()
        ));
    }

    let labels: HashSet<Favorability> = variants.iter().map(|v| v.favorability).collect();
    if labels.len() != VARIANTS_PER_SECTION {
        let missing: Vec<&str> = Favorability::ALL
            .iter()
            .filter(|f| !labels.contains(f))
            .map(|f| f.label())
            .collect();
        return Err(format!("favorability labels missing: {}", missing.join(", ")));
    }

    let mut texts = HashSet::new();
    for variant in &mut variants {
        variant.text = variant.text.trim().to_string();
        if variant.text.is_empty() {
            return Err(format!("{} variant has empty text", variant.favorability));
        }
        if !texts.insert(variant.text.clone()) {
            return Err(format!("duplicate variant text: {}", variant.text));
        }
    }

    variants.sort_by_key(|v| v.favorability);
    Ok(PlaybookSection { title, variants })
}

fn section_prompt(schema: VariantSchema, language: &str) -> String {
    let labels = Favorability::ALL
        .iter()
        .map(|f| format!("{} / {}", f.label(), f.german_label()))
        .collect::<Vec<_>>()
        .join(", ");
    let (fields, shape) = match schema {
        VariantSchema::Single => (
            "text (no duplicates), favorability, justification",
            r#"{"text": "...", "favorability": "...", "justification": "..."}"#,
        ),
        VariantSchema::Split => (
            "text (no duplicates), favorability, internal_justification (for our own \
             negotiators), external_justification (an argument to present to the counterparty)",
            r#"{"text": "...", "favorability": "...", "internal_justification": "...", "external_justification": "..."}"#,
        ),
    };

    format!(
        "You are a legal AI. You are given a cluster of legal clauses belonging to the same \
         overall legal topic.\n\
         Your tasks are:\n\
         1. Summarize the cluster into one section title.\n\
         2. Generate exactly {VARIANTS_PER_SECTION} playbook variants, one for each favorability \
         label: {labels}.\n\
         Each variant must have: {fields}.\n\
         Output strictly as JSON with a field 'title' and a field 'variants'. \
         For JSON values use the {language} language.\n\n\
         {{\"title\": \"...\", \"variants\": [{shape}]}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(text: &str, favorability: Favorability) -> PlaybookVariant {
        PlaybookVariant {
            text: text.into(),
            favorability,
            justification: "because".into(),
            external_justification: None,
        }
    }

    fn full_set() -> Vec<PlaybookVariant> {
        vec![
            variant("d", Favorability::Unacceptable),
            variant("b", Favorability::Balanced),
            variant("a", Favorability::MostFavorable),
            variant("c", Favorability::Acceptable),
        ]
    }

    #[test]
    fn validation_sorts_by_favorability() {
        let section = validate_section(" Zahlung ".into(), full_set()).unwrap();
        assert_eq!(section.title, "Zahlung");
        let order: Vec<Favorability> = section.variants.iter().map(|v| v.favorability).collect();
        assert_eq!(order, Favorability::ALL.to_vec());
    }

    #[test]
    fn validation_rejects_wrong_count() {
        let mut variants = full_set();
        variants.pop();
        let err = validate_section("t".into(), variants).unwrap_err();
        assert!(err.contains("expected 4 variants, got 3"));
    }

    #[test]
    fn validation_rejects_repeated_label() {
        let mut variants = full_set();
        variants[0].favorability = Favorability::Balanced;
        let err = validate_section("t".into(), variants).unwrap_err();
        assert!(err.contains("Unacceptable"));
    }

    #[test]
    fn validation_rejects_duplicate_text_and_blank_title() {
        let mut variants = full_set();
        variants[1].text = " a ".into();
        assert!(validate_section("t".into(), variants)
            .unwrap_err()
            .contains("duplicate"));
        assert!(validate_section("  ".into(), full_set()).is_err());
    }

    #[test]
    fn prompt_names_labels_language_and_shape() {
        let single = section_prompt(VariantSchema::Single, "German");
        assert!(single.contains("Most Favorable / Am Vorteilhaftesten"));
        assert!(single.contains("Unacceptable / Inakzeptabel"));
        assert!(single.contains("use the German language"));
        assert!(single.contains(r#""justification": "...""#));

        let split = section_prompt(VariantSchema::Split, "English");
        assert!(split.contains("external_justification"));
        assert!(split.contains("use the English language"));
    }
}

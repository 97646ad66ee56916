//! Contract document tree.
//!
//! `ContractDraft`, `ContractRaw` and `SectionRaw` are the shapes the LLM is
//! asked to produce. A [`Contract`] is only ever built from a validated
//! draft and carries an identifier the LLM never sees.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Atomic unit of negotiable contract language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Clause {
    pub text: String,
}

impl Clause {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Subsection {
    pub title: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
}

/// A top-level contract section.
///
/// A clause sits either directly under the section or under exactly one of
/// its subsections, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
}

impl Section {
    /// Direct clauses plus every subsection clause.
    pub fn clause_count(&self) -> usize {
        self.clauses.len()
            + self
                .subsections
                .iter()
                .map(|s| s.clauses.len())
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Party {
    pub name: String,
}

/// Coarse section produced by the first pass of the multi-call strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SectionRaw {
    pub title: String,
    pub text: String,
}

/// Coarse contract produced by the first pass of the multi-call strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContractRaw {
    pub title: String,
    #[serde(default)]
    pub parties: Vec<Party>,
    #[serde(default)]
    pub sections: Vec<SectionRaw>,
}

/// Full document tree as returned by a single-pass parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ContractDraft {
    pub title: String,
    #[serde(default)]
    pub parties: Vec<Party>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// Unique identifier assigned to each parsed contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractId(pub Uuid);

impl ContractId {
    pub fn new() -> Self {
        ContractId(Uuid::new_v4())
    }
}

impl Default for ContractId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root aggregate of a parsed contract. Re-parsing yields a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub title: String,
    #[serde(default)]
    pub parties: Vec<Party>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Contract {
    /// Assemble a contract with a fresh identifier, dropping duplicate
    /// parties while keeping first-seen order.
    pub fn new(title: impl Into<String>, parties: Vec<Party>, sections: Vec<Section>) -> Self {
        let mut unique: Vec<Party> = Vec::with_capacity(parties.len());
        for party in parties {
            if !unique.contains(&party) {
                unique.push(party);
            }
        }
        Self {
            id: ContractId::new(),
            title: title.into(),
            parties: unique,
            sections,
        }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn clause_count(&self) -> usize {
        self.sections.iter().map(Section::clause_count).sum()
    }
}

impl From<ContractDraft> for Contract {
    fn from(draft: ContractDraft) -> Self {
        Contract::new(draft.title, draft.parties, draft.sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(direct: usize, nested: &[usize]) -> Section {
        Section {
            title: "s".into(),
            clauses: (0..direct).map(|i| Clause::new(format!("c{i}"))).collect(),
            subsections: nested
                .iter()
                .map(|n| Subsection {
                    title: "sub".into(),
                    clauses: (0..*n).map(|i| Clause::new(format!("n{i}"))).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn clause_count_includes_subsections() {
        let contract = Contract::new("c", vec![], vec![section(2, &[1, 3]), section(0, &[2])]);
        assert_eq!(contract.section_count(), 2);
        assert_eq!(contract.clause_count(), 8);
    }

    #[test]
    fn duplicate_parties_are_collapsed() {
        let p = |n: &str| Party { name: n.into() };
        let contract = Contract::new("c", vec![p("Acme"), p("Globex"), p("Acme")], vec![]);
        assert_eq!(contract.parties, vec![p("Acme"), p("Globex")]);
    }

    #[test]
    fn draft_tolerates_missing_collections() {
        let draft: ContractDraft = serde_json::from_value(serde_json::json!({
            "title": "Supply Agreement",
            "sections": [{"title": "Payment"}]
        }))
        .unwrap();
        assert!(draft.parties.is_empty());
        assert!(draft.sections[0].clauses.is_empty());
        assert!(draft.sections[0].subsections.is_empty());
    }

    #[test]
    fn each_contract_gets_a_fresh_id() {
        let a = Contract::new("c", vec![], vec![]);
        let b = Contract::new("c", vec![], vec![]);
        assert_ne!(a.id, b.id);
    }
}

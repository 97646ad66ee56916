//! LLM-driven contract parsing into a typed document tree.
//!
//! Two strategies share the same primitive (prompt + output schema):
//!
//! - **Single**: one call returns the whole tree. Fewest calls, largest
//!   request. Default.
//! - **Multi**: one call splits the text into coarse [`SectionRaw`]s, then
//!   one call per section fills in clauses and subsections. Per-section
//!   calls run strictly one after another, paced by a shared
//!   [`RateLimiter`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::config::{ClausebookConfig, ParseStrategy};
use crate::error::{ClausebookError, Result};
use crate::llm::{invoke_structured, CallPolicy, PromptMessage, StructuredLlm};
use crate::model::{Clause, Contract, ContractDraft, ContractRaw, Section, SectionRaw};
use crate::obs;
use crate::ratelimit::RateLimiter;

const RAW_SECTIONS_PROMPT: &str = "You are a legal AI. You are given the text of a contract \
extracted from a PDF or Word document. A contract consists of a title, the contracting parties \
and multiple sections. Split the contract into its sections carefully. For every section return \
its heading as `title` and its complete, unmodified wording as `text`. Do not summarise.";

const SECTION_PROMPT: &str = "You are a legal AI. You are given a single contract section. \
A section consists of clauses and optional subsections, each subsection holding its own clauses. \
Parse the section accurately into a structured format. Copy clause wording verbatim. A clause \
belongs either directly to the section or to exactly one subsection, never both.";

const FULL_PROMPT: &str = "You are a legal AI. You are given the full text of a contract. \
Extract the contract title, all contracting parties and every section. Each section has a title, \
clauses and optional subsections with their own clauses. Copy clause wording verbatim. A clause \
belongs either directly to a section or to exactly one of its subsections, never both. Output the \
structured result for all sections in document order.";

/// Turns raw contract text into a [`Contract`].
pub struct StructuredParser {
    llm: Arc<dyn StructuredLlm>,
    policy: CallPolicy,
    section_limiter: RateLimiter,
}

impl StructuredParser {
    /// Per-section calls of the multi strategy are paced at one call per
    /// second until [`StructuredParser::with_section_limiter`] says otherwise.
    pub fn new(llm: Arc<dyn StructuredLlm>, policy: CallPolicy) -> Self {
        let section_limiter = RateLimiter::new(1.0, 1).unwrap_or_else(|_| RateLimiter::unlimited());
        Self {
            llm,
            policy,
            section_limiter,
        }
    }

    /// Build from configuration: LLM timeout, retry policy and the
    /// parser's request rate.
    pub fn from_config(llm: Arc<dyn StructuredLlm>, config: &ClausebookConfig) -> Result<Self> {
        let policy = CallPolicy::new(config.llm.timeout()).with_retry(config.retry);
        let limiter = RateLimiter::new(config.parser.requests_per_second, config.parser.burst)?;
        Ok(Self::new(llm, policy).with_section_limiter(limiter))
    }

    /// Share a limiter with other components calling the same upstream.
    pub fn with_section_limiter(mut self, limiter: RateLimiter) -> Self {
        self.section_limiter = limiter;
        self
    }

    #[instrument(skip(self, text), fields(strategy = ?strategy, text_len = text.len()))]
    pub async fn parse(&self, text: &str, strategy: ParseStrategy) -> Result<Contract> {
        if text.trim().is_empty() {
            return Err(ClausebookError::schema(
                "contract text",
                "document text is empty",
            ));
        }

        let label = strategy_label(strategy);
        obs::emit_parse_started(label, text.len());
        let started = Instant::now();

        let contract = match strategy {
            ParseStrategy::Single => self.parse_single(text).await?,
            ParseStrategy::Multi => self.parse_multi(text).await?,
        };

        obs::emit_parse_finished(
            label,
            contract.section_count(),
            contract.clause_count(),
            started.elapsed().as_millis() as u64,
        );
        Ok(contract)
    }

    /// One call for the entire document tree.
    pub async fn parse_single(&self, text: &str) -> Result<Contract> {
        let messages = [
            PromptMessage::system(FULL_PROMPT),
            PromptMessage::user(format!("Contract:\n{text}")),
        ];
        let draft: ContractDraft =
            invoke_structured(self.llm.as_ref(), &messages, "parse_single", &self.policy).await?;

        let sections = draft.sections.into_iter().map(normalize_section).collect();
        Ok(Contract::new(draft.title, draft.parties, sections))
    }

    /// First pass of the multi strategy: title, parties and coarse sections.
    pub async fn parse_raw_sections(&self, text: &str) -> Result<ContractRaw> {
        let messages = [
            PromptMessage::system(RAW_SECTIONS_PROMPT),
            PromptMessage::user(format!("Contract:\n{text}")),
        ];
        let raw: ContractRaw =
            invoke_structured(self.llm.as_ref(), &messages, "parse_raw_sections", &self.policy)
                .await?;
        debug!(sections = raw.sections.len(), "raw sections parsed");
        Ok(raw)
    }

    /// Second pass of the multi strategy for one coarse section.
    pub async fn parse_section(&self, raw: &SectionRaw) -> Result<Section> {
        self.refine_section(0, raw).await
    }

    /// Multi strategy: coarse split, then one paced call per section.
    pub async fn parse_multi(&self, text: &str) -> Result<Contract> {
        let raw = self.parse_raw_sections(text).await?;

        let mut sections = Vec::with_capacity(raw.sections.len());
        for (index, section_raw) in raw.sections.iter().enumerate() {
            self.section_limiter.acquire().await;
            sections.push(self.refine_section(index, section_raw).await?);
        }

        info!(sections = sections.len(), "multi-call parse complete");
        Ok(Contract::new(raw.title, raw.parties, sections))
    }

    async fn refine_section(&self, index: usize, raw: &SectionRaw) -> Result<Section> {
        let context = format!("parse_section[{index}] '{}'", raw.title);
        let messages = [
            PromptMessage::system(SECTION_PROMPT),
            PromptMessage::user(format!("Section title: {}\nSection Text:\n{}", raw.title, raw.text)),
        ];
        let mut section: Section =
            invoke_structured(self.llm.as_ref(), &messages, &context, &self.policy).await?;
        if section.title.trim().is_empty() {
            section.title = raw.title.clone();
        }
        Ok(normalize_section(section))
    }
}

fn strategy_label(strategy: ParseStrategy) -> &'static str {
    match strategy {
        ParseStrategy::Single => "single",
        ParseStrategy::Multi => "multi",
    }
}

/// Trim clause text, drop empty clauses, and drop direct clauses that the
/// LLM also placed under one of the section's subsections.
pub fn normalize_section(section: Section) -> Section {
    let clean = |clauses: Vec<Clause>| -> Vec<Clause> {
        clauses
            .into_iter()
            .map(|c| Clause::new(c.text.trim()))
            .filter(|c| !c.text.is_empty())
            .collect()
    };

    let subsections: Vec<_> = section
        .subsections
        .into_iter()
        .map(|mut s| {
            s.clauses = clean(s.clauses);
            s
        })
        .collect();

    let before = section.clauses.len();
    let clauses: Vec<Clause> = clean(section.clauses)
        .into_iter()
        .filter(|c| !subsections.iter().any(|s| s.clauses.contains(c)))
        .collect();
    if clauses.len() != before {
        debug!(
            section = %section.title,
            dropped = before - clauses.len(),
            "dropped empty or duplicated direct clauses"
        );
    }

    Section {
        title: section.title,
        clauses,
        subsections,
    }
}

//! Contract and playbook data model.

pub mod contract;
pub mod playbook;

pub use contract::{
    Clause, Contract, ContractDraft, ContractId, ContractRaw, Party, Section, SectionRaw,
    Subsection,
};
pub use playbook::{
    Favorability, Playbook, PlaybookId, PlaybookSection, PlaybookVariant, SectionDraft,
    SplitVariantDraft, VariantDraft,
};

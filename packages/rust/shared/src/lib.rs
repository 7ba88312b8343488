//! Shared types, error model, configuration, and capability contracts for docqa.
//!
//! This crate is the foundation depended on by all other docqa crates.
//! It provides:
//! - [`DocQaError`] — the unified error type
//! - Domain types ([`Turn`], [`DomainEntry`], [`SearchResult`], [`LoopOutcome`], ...)
//! - Configuration ([`AppConfig`], [`AgentConfig`], config loading)
//! - Capability traits ([`ReasoningCapability`], [`SearchCapability`], [`ScrapeCapability`])

pub mod capability;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use capability::{
    Observation, RawSearchHit, ReasoningCapability, ReasoningDecision, ReasoningRequest,
    ScrapeCapability, SearchAction, SearchCapability, SearchRequest,
};
pub use config::{
    AgentConfig, AgentSection, AppConfig, DomainsSection, OpenRouterConfig, ScrapeSection,
    SearchSection, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_api_keys,
};
pub use error::{Capability, DocQaError, Result};
pub use types::{
    DomainEntry, LoopOutcome, Role, ScrapedPage, SearchDepth, SearchResult, SessionId,
    TerminationReason, Turn,
};

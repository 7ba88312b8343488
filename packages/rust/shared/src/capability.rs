//! Contracts for the external capabilities the orchestration loop drives.
//!
//! Implementations are thin I/O wrappers (HTTP clients); all decision logic
//! lives in `docqa-core`. The traits are object-safe so the loop can hold
//! `Arc<dyn ...>` and tests can substitute scripted doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Result;
use crate::types::{ScrapedPage, SearchDepth, SearchResult, Turn};

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

/// Tool output collected during the current request, shown to the reasoning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
    /// In-domain hits for a search, in provider order.
    SearchResults {
        query: String,
        results: Vec<SearchResult>,
    },
    /// The search ran but nothing survived domain filtering.
    NoRelevantSources { query: String },
    /// Search could not run (provider failure or empty allow-list).
    SearchUnavailable { query: String, reason: String },
    /// Budgeted page content.
    PageContent { page: ScrapedPage },
    /// The page could not be retrieved.
    PageUnavailable { url: String, reason: String },
    /// The URL was never surfaced by a search in this request.
    FetchRejected { url: String },
    /// The previous decision could not be carried out as given.
    InvalidRequest { reason: String },
}

/// Everything the reasoning capability sees for one decision.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub system_prompt: String,
    pub history: Vec<Turn>,
    pub question: String,
    pub observations: Vec<Observation>,
}

/// What the reasoning capability wants to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReasoningDecision {
    FinalAnswer(String),
    Search(SearchAction),
    Fetch { url: String },
    /// The response could not be classified.
    Malformed { raw: String, reason: String },
}

/// A search the reasoning step asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchAction {
    pub query: String,
    /// Optionally narrows the allow-listed hosts.
    pub sites: Vec<String>,
    /// Overrides the configured depth.
    pub depth: Option<SearchDepth>,
    /// Capped at the configured maximum.
    pub max_results: Option<u32>,
}

impl SearchAction {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sites: Vec::new(),
            depth: None,
            max_results: None,
        }
    }
}

#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    async fn decide(&self, request: &ReasoningRequest) -> Result<ReasoningDecision>;
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,
    pub depth: SearchDepth,
    /// Hostnames the provider should restrict itself to.
    pub include_hosts: Vec<String>,
}

/// An unfiltered search hit, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[async_trait]
pub trait SearchCapability: Send + Sync {
    /// Hits in provider order. An empty vector is a successful response.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawSearchHit>>;
}

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ScrapeCapability: Send + Sync {
    /// Text content of the page at `url`.
    async fn scrape(&self, url: &Url) -> Result<String>;
}

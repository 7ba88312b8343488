//! Tavily-backed web search.
//!
//! A thin HTTP wrapper implementing [`SearchCapability`]: it forwards the
//! query with the allow-listed hosts as `include_domains` and maps the
//! response to [`RawSearchHit`]s in provider order. Domain filtering and
//! budgeting happen in the orchestration loop, not here.

use std::time::Duration;

use async_trait::async_trait;
use docqa_shared::{
    Capability, DocQaError, RawSearchHit, Result, SearchCapability, SearchDepth, SearchRequest,
    SearchSection,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Path of the search endpoint under the configured base URL.
const SEARCH_PATH: &str = "/search";

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("docqa/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    search_depth: &'static str,
    include_domains: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

fn depth_param(depth: SearchDepth) -> &'static str {
    match depth {
        SearchDepth::Shallow => "basic",
        SearchDepth::Thorough => "advanced",
    }
}

// ---------------------------------------------------------------------------
// TavilySearch
// ---------------------------------------------------------------------------

/// Search capability backed by the Tavily API.
pub struct TavilySearch {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl TavilySearch {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DocQaError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Build from the `[search]` config section, reading the key from its env var.
    pub fn from_config(section: &SearchSection) -> Result<Self> {
        let api_key = std::env::var(&section.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DocQaError::config(format!(
                    "search API key not found. Set the {} environment variable.",
                    section.api_key_env
                ))
            })?;

        Self::new(
            section.base_url.clone(),
            api_key,
            Duration::from_secs(section.timeout_secs),
        )
    }

    fn map_transport_error(&self, e: reqwest::Error) -> DocQaError {
        if e.is_timeout() {
            DocQaError::CapabilityTimeout {
                capability: Capability::Search,
                timeout: self.timeout,
            }
        } else {
            DocQaError::unavailable(Capability::Search, e.to_string())
        }
    }
}

#[async_trait]
impl SearchCapability for TavilySearch {
    #[instrument(skip_all, fields(query = %request.query, depth = ?request.depth))]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RawSearchHit>> {
        let body = TavilyRequest {
            api_key: &self.api_key,
            query: &request.query,
            max_results: request.max_results,
            search_depth: depth_param(request.depth),
            include_domains: &request.include_hosts,
        };

        let url = format!("{}{SEARCH_PATH}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DocQaError::unavailable(
                Capability::Search,
                format!("HTTP {status}: {}", detail.chars().take(200).collect::<String>()),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let parsed: TavilyResponse = serde_json::from_str(&text)
            .map_err(|e| DocQaError::malformed(Capability::Search, format!("invalid JSON: {e}")))?;

        let hits: Vec<RawSearchHit> = parsed
            .results
            .into_iter()
            .take(request.max_results as usize)
            .map(|r| RawSearchHit {
                url: r.url,
                title: r
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Untitled".into()),
                snippet: r.content.unwrap_or_default(),
            })
            .collect();

        info!(hits = hits.len(), "search returned");
        for (i, hit) in hits.iter().enumerate() {
            debug!(rank = i + 1, url = %hit.url, "search hit");
        }

        Ok(hits)
    }
}

//! The per-request decide → search → fetch → decide loop.
//!
//! Every external call is bounded by `min(per-call timeout, remaining
//! request deadline)`; dropping the call future on expiry cancels it.
//! Search and scrape failures are absorbed into observations. A malformed
//! or failing reasoning step, the iteration cap, and the request deadline
//! end the request with a best-effort answer. [`OrchestrationLoop::run`]
//! always returns an outcome.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use docqa_domains::{DomainAllowList, normalize_hostname};
use docqa_shared::{
    AgentConfig, Capability, DocQaError, LoopOutcome, Observation, ReasoningCapability,
    ReasoningDecision, ReasoningRequest, Result, ScrapeCapability, ScrapedPage, SearchAction,
    SearchCapability, SearchRequest, SearchResult, TerminationReason, Turn,
};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::budget::ContentBudget;
use crate::reasoning::build_system_prompt;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The external collaborators the loop drives.
#[derive(Clone)]
pub struct Capabilities {
    pub reasoning: Arc<dyn ReasoningCapability>,
    pub search: Arc<dyn SearchCapability>,
    pub scrape: Arc<dyn ScrapeCapability>,
}

/// The request deadline passed while a call was in flight.
#[derive(Debug)]
struct DeadlineExceeded;

type Bounded<T> = std::result::Result<Result<T>, DeadlineExceeded>;

/// `timeout` from now, saturating far in the future instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

/// Run `call` until it finishes, its own timeout fires, or the request deadline passes.
async fn bounded<T>(
    call: impl Future<Output = Result<T>>,
    capability: Capability,
    per_call: Duration,
    deadline: Instant,
) -> Bounded<T> {
    let call_deadline = deadline.min(deadline_after(per_call));
    match tokio::time::timeout_at(call_deadline, call).await {
        Ok(result) => Ok(result),
        Err(_) if call_deadline >= deadline => Err(DeadlineExceeded),
        Err(_) => Ok(Err(DocQaError::CapabilityTimeout {
            capability,
            timeout: per_call,
        })),
    }
}

// ---------------------------------------------------------------------------
// Per-request state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RunState {
    iterations: u32,
    observations: Vec<Observation>,
    /// Normalised URLs surfaced by filtered search results; the only fetchable set.
    discovered: HashSet<String>,
    /// (title, url) of in-domain material seen so far, in order.
    gathered: Vec<(String, String)>,
    used_sources: Vec<String>,
    caveats: Vec<String>,
}

impl RunState {
    fn use_source(&mut self, title: &str, url: &str) {
        if !self.used_sources.iter().any(|u| u == url) {
            self.used_sources.push(url.to_string());
            self.gathered.push((title.to_string(), url.to_string()));
        }
    }

    fn caveat(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.caveats.contains(&text) {
            self.caveats.push(text);
        }
    }

    fn finish(self, answer: String, reason: TerminationReason) -> LoopOutcome {
        LoopOutcome {
            answer,
            used_sources: self.used_sources,
            iterations: self.iterations,
            termination_reason: reason,
            caveats: self.caveats,
        }
    }

    /// Best-available answer when the loop stops without a final answer.
    fn fallback_answer(&self, headline: &str) -> String {
        if self.gathered.is_empty() {
            return format!(
                "{headline} I could not find sufficient information in the configured documentation to answer this question."
            );
        }

        let mut answer = format!("{headline} These sources looked relevant:\n");
        for (title, url) in &self.gathered {
            answer.push_str(&format!("\n- {title}: {url}"));
        }
        answer
    }
}

/// Fetch key: the URL without its fragment.
fn fetch_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

// ---------------------------------------------------------------------------
// OrchestrationLoop
// ---------------------------------------------------------------------------

/// Drives one question to a [`LoopOutcome`].
pub struct OrchestrationLoop {
    capabilities: Capabilities,
    allow_list: Arc<DomainAllowList>,
    budget: ContentBudget,
    config: AgentConfig,
    system_prompt: String,
}

impl OrchestrationLoop {
    pub fn new(
        capabilities: Capabilities,
        allow_list: Arc<DomainAllowList>,
        config: AgentConfig,
    ) -> Self {
        if allow_list.is_empty() {
            warn!("{}; search is disabled", DocQaError::NoAllowedDomainsConfigured);
        }

        Self {
            budget: ContentBudget::new(config.search_content_ceiling, config.scrape_content_ceiling),
            system_prompt: build_system_prompt(&allow_list),
            capabilities,
            allow_list,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn allow_list(&self) -> &DomainAllowList {
        &self.allow_list
    }

    /// Answer `question` given the prior `history`.
    #[instrument(skip_all, fields(history = history.len()))]
    pub async fn run(&self, history: &[Turn], question: &str) -> LoopOutcome {
        let deadline = deadline_after(self.config.request_deadline);
        let mut state = RunState::default();
        info!(max_iterations = self.config.max_iterations, "loop started");

        let outcome = loop {
            // Deadline before cap: when both are hit in the same step the request timed out.
            if Instant::now() >= deadline {
                break self.timed_out(state);
            }
            if state.iterations >= self.config.max_iterations {
                break self.iterations_exhausted(state);
            }

            state.iterations += 1;
            let decision = match self.think(history, question, &state, deadline).await {
                Ok(Ok(decision)) => decision,
                Ok(Err(e)) => break self.capability_failed(state, e),
                Err(DeadlineExceeded) => break self.timed_out(state),
            };

            let tool_step = match decision {
                ReasoningDecision::FinalAnswer(answer) => {
                    break state.finish(answer, TerminationReason::Answered);
                }
                ReasoningDecision::Malformed { raw, reason } => {
                    debug!(%raw, "unclassifiable reasoning reply");
                    let e = DocQaError::malformed(Capability::Reasoning, reason);
                    break self.capability_failed(state, e);
                }
                _ if Instant::now() >= deadline => break self.timed_out(state),
                // A tool result after the last iteration could never be read.
                _ if state.iterations >= self.config.max_iterations => {
                    break self.iterations_exhausted(state);
                }
                ReasoningDecision::Search(action) => self.search(&mut state, action, deadline).await,
                ReasoningDecision::Fetch { url } => self.fetch(&mut state, &url, deadline).await,
            };

            if tool_step.is_err() {
                break self.timed_out(state);
            }
        };

        info!(
            reason = %outcome.termination_reason,
            iterations = outcome.iterations,
            sources = outcome.used_sources.len(),
            "loop finished"
        );
        outcome
    }

    // -----------------------------------------------------------------------
    // THINKING
    // -----------------------------------------------------------------------

    async fn think(
        &self,
        history: &[Turn],
        question: &str,
        state: &RunState,
        deadline: Instant,
    ) -> Bounded<ReasoningDecision> {
        let request = ReasoningRequest {
            system_prompt: self.system_prompt.clone(),
            history: history.to_vec(),
            question: question.to_string(),
            observations: state.observations.clone(),
        };

        let mut attempt = 0;
        loop {
            let call = self.capabilities.reasoning.decide(&request);
            match bounded(call, Capability::Reasoning, self.config.reasoning_timeout, deadline)
                .await?
            {
                Err(e) if e.is_transient() && attempt < self.config.reasoning_retries => {
                    attempt += 1;
                    warn!(error = %e, attempt, "reasoning call failed, retrying");
                }
                result => return Ok(result),
            }
        }
    }

    // -----------------------------------------------------------------------
    // SEARCHING
    // -----------------------------------------------------------------------

    /// Hosts to pass to the provider: the requested sites that are allowed,
    /// or every allowed host when none of them are.
    fn include_hosts(&self, sites: &[String]) -> Vec<String> {
        let mut hosts: Vec<String> = sites
            .iter()
            .filter_map(|s| normalize_hostname(s))
            .filter(|h| self.allow_list.is_allowed(h))
            .collect();
        hosts.dedup();

        if hosts.is_empty() {
            self.allow_list.hostnames()
        } else {
            hosts
        }
    }

    #[instrument(skip_all, fields(query = %action.query))]
    async fn search(
        &self,
        state: &mut RunState,
        action: SearchAction,
        deadline: Instant,
    ) -> std::result::Result<(), DeadlineExceeded> {
        let SearchAction {
            query,
            sites,
            depth,
            max_results,
        } = action;
        if self.allow_list.is_empty() {
            let reason = DocQaError::NoAllowedDomainsConfigured.to_string();
            state.caveat(format!("Search was skipped: {reason}."));
            state
                .observations
                .push(Observation::SearchUnavailable { query, reason });
            return Ok(());
        }

        let request = SearchRequest {
            query,
            max_results: max_results.map_or(self.config.max_search_results, |n| {
                n.min(self.config.max_search_results)
            }),
            depth: depth.unwrap_or(self.config.search_depth),
            include_hosts: self.include_hosts(&sites),
        };
        info!(hosts = request.include_hosts.len(), "search issued");

        let call = self.capabilities.search.search(&request);
        let hits = match bounded(call, Capability::Search, self.config.search_timeout, deadline)
            .await?
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "search failed, continuing without results");
                state.caveat(format!("Search was unavailable: {e}."));
                state.observations.push(Observation::SearchUnavailable {
                    query: request.query,
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        let total = hits.len();
        let mut results = Vec::new();
        for hit in hits {
            if results.len() >= request.max_results as usize {
                break;
            }
            let Some(entry) = self.allow_list.match_url(&hit.url) else {
                debug!(url = %hit.url, "dropping out-of-domain result");
                continue;
            };
            let Ok(parsed) = Url::parse(&hit.url) else {
                continue;
            };

            let (snippet, truncated) = self.budget.truncate_search_text(&hit.snippet);
            if truncated {
                state.caveat("Some search snippets were truncated.");
            }
            state.discovered.insert(fetch_key(&parsed));
            state.use_source(&hit.title, &hit.url);
            results.push(SearchResult {
                url: hit.url,
                title: hit.title,
                snippet,
                domain_key: entry.key.clone(),
                truncated,
            });
        }
        debug!(total, kept = results.len(), "search results filtered");

        if results.is_empty() {
            state.caveat("No domain-specific sources were found for this question.");
            state
                .observations
                .push(Observation::NoRelevantSources { query: request.query });
        } else {
            state.observations.push(Observation::SearchResults {
                query: request.query,
                results,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // SCRAPING
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(url = %raw_url))]
    async fn fetch(
        &self,
        state: &mut RunState,
        raw_url: &str,
        deadline: Instant,
    ) -> std::result::Result<(), DeadlineExceeded> {
        let mut url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                state.observations.push(Observation::InvalidRequest {
                    reason: format!("'{raw_url}' is not a valid URL: {e}"),
                });
                return Ok(());
            }
        };

        url.set_fragment(None);
        if !state.discovered.contains(url.as_str()) {
            warn!("fetch rejected, URL was not surfaced by a search result");
            state.caveat(format!("A request to read {raw_url} was refused."));
            state.observations.push(Observation::FetchRejected {
                url: raw_url.to_string(),
            });
            return Ok(());
        }

        let call = self.capabilities.scrape.scrape(&url);
        match bounded(call, Capability::Scrape, self.config.scrape_timeout, deadline).await? {
            Ok(text) => {
                let (content, truncated) = self.budget.truncate_scrape_text(&text);
                if truncated {
                    state.caveat(format!("The content of {url} was truncated."));
                }
                info!(bytes = content.len(), truncated, "page scraped");
                state.use_source(url.as_str(), url.as_str());
                state.observations.push(Observation::PageContent {
                    page: ScrapedPage {
                        url: url.to_string(),
                        content,
                        truncated,
                    },
                });
            }
            Err(e) => {
                warn!(error = %e, "scrape failed, continuing without the page");
                state.caveat(format!("The page {url} was unavailable."));
                state.observations.push(Observation::PageUnavailable {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Terminal outcomes
    // -----------------------------------------------------------------------

    fn timed_out(&self, mut state: RunState) -> LoopOutcome {
        let e = DocQaError::RequestDeadlineExceeded {
            deadline: self.config.request_deadline,
        };
        warn!(error = %e, iterations = state.iterations, "request timed out");
        state.caveat(format!("The answer is incomplete: {e}."));
        let answer = state.fallback_answer("The request timed out before an answer was ready.");
        state.finish(answer, TerminationReason::TimedOut)
    }

    fn iterations_exhausted(&self, mut state: RunState) -> LoopOutcome {
        let e = DocQaError::LoopIterationExceeded {
            max: self.config.max_iterations,
        };
        warn!(error = %e, "iteration cap reached");
        state.caveat(format!("The answer is incomplete: {e}."));
        let answer =
            state.fallback_answer("I could not finish researching this question within the step limit.");
        state.finish(answer, TerminationReason::MaxIterationsReached)
    }

    fn capability_failed(&self, mut state: RunState, e: DocQaError) -> LoopOutcome {
        error!(error = %e, iterations = state.iterations, "request failed");
        state.caveat(format!("The assistant failed: {e}."));
        let answer = state.fallback_answer("I could not complete this request because the reasoning service failed.");
        state.finish(answer, TerminationReason::CapabilityFailed)
    }
}

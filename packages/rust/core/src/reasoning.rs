//! Reasoning capability backed by an OpenAI-compatible chat-completions API
//! (OpenRouter by default).
//!
//! The model is prompted to reply with a single JSON action blob:
//!
//! ```text
//! {"action": "search_documentation", "action_input": {"query": "...", "sites": ["..."], "depth": "advanced", "max_results": 5}}
//! {"action": "scrape_website", "action_input": "https://..."}
//! {"action": "Final Answer", "action_input": "..."}
//! ```
//!
//! [`parse_decision`] classifies the reply into a [`ReasoningDecision`].

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use docqa_domains::DomainAllowList;
use docqa_shared::{
    Capability, DocQaError, Observation, OpenRouterConfig, ReasoningCapability, ReasoningDecision,
    ReasoningRequest, Result, SearchAction,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

const COMPLETIONS_PATH: &str = "/chat/completions";

/// User-Agent string for reasoning requests.
const USER_AGENT: &str = concat!("docqa/", env!("CARGO_PKG_VERSION"));

pub const SEARCH_TOOL: &str = "search_documentation";
pub const SCRAPE_TOOL: &str = "scrape_website";
pub const FINAL_ANSWER: &str = "Final Answer";

const ACTION_REMINDER: &str = "Reminder: respond with exactly one JSON blob containing \
\"action\" and \"action_input\". Use a tool if necessary; otherwise give the Final Answer.";

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// System prompt listing the allowed knowledge sources and the action protocol.
pub fn build_system_prompt(allow_list: &DomainAllowList) -> String {
    let sources = if allow_list.is_empty() {
        "(no documentation sites are configured)\n".to_string()
    } else {
        allow_list.render_markdown()
    };
    let keys: Vec<&str> = allow_list.entries().iter().map(|e| e.key.as_str()).collect();

    format!(
        r#"You are a specialized Q&A assistant that answers only from specific documentation websites.

AVAILABLE KNOWLEDGE SOURCES, grouped by topic, with each website and its description:

{sources}
INSTRUCTIONS:
1. Start with the {SEARCH_TOOL} tool for any question about the knowledge sources.
2. Pick the sites relevant to the technologies or topics in the question.
3. If the search results are not enough to answer completely, use {SCRAPE_TOOL} on the most relevant URL from the search results. Only URLs returned by a search may be scraped.
4. Only answer questions about these topics: [{keys}]. For anything else, say so and suggest the topics you can help with.
5. If content is marked as truncated, do not claim it is complete.
6. If no relevant sources were found, say that no domain-specific information is available.
7. Cite the source URLs you used.

TOOLS:
- {SEARCH_TOOL}: search the allowed documentation sites. action_input is a query string, or {{"query": "...", "sites": ["hostname", ...], "depth": "basic" | "advanced", "max_results": n}}. Only "query" is required.
- {SCRAPE_TOOL}: fetch the full text of one page. action_input is a URL from earlier search results.

Respond with exactly ONE JSON blob per reply, as shown:
```
{{
  "action": "{SEARCH_TOOL}" | "{SCRAPE_TOOL}" | "{FINAL_ANSWER}",
  "action_input": ...
}}
```
"#,
        keys = keys.join(", ")
    )
}

/// Render tool results for the reasoning step.
pub fn render_observations(observations: &[Observation]) -> String {
    let mut out = String::new();

    for (i, obs) in observations.iter().enumerate() {
        let _ = write!(out, "Observation {}: ", i + 1);
        match obs {
            Observation::SearchResults { query, results } => {
                let _ = writeln!(out, "search results for \"{query}\"");
                for (rank, r) in results.iter().enumerate() {
                    let _ = writeln!(out, "{}. {} [{}]", rank + 1, r.title, r.domain_key);
                    let _ = writeln!(out, "   URL: {}", r.url);
                    let _ = writeln!(out, "   {}", r.snippet.replace('\n', "\n   "));
                    if r.truncated {
                        let _ = writeln!(out, "   (snippet truncated)");
                    }
                }
            }
            Observation::NoRelevantSources { query } => {
                let _ = writeln!(
                    out,
                    "search for \"{query}\" found no relevant sources on the allowed sites."
                );
            }
            Observation::SearchUnavailable { query, reason } => {
                let _ = writeln!(out, "search for \"{query}\" was unavailable: {reason}");
            }
            Observation::PageContent { page } => {
                let partial = if page.truncated { " (partial, truncated)" } else { "" };
                let _ = writeln!(out, "content of {}{partial}:\n{}", page.url, page.content);
            }
            Observation::PageUnavailable { url, reason } => {
                let _ = writeln!(out, "page {url} was unavailable: {reason}");
            }
            Observation::FetchRejected { url } => {
                let _ = writeln!(
                    out,
                    "fetch of {url} rejected: only URLs from search results in this conversation turn may be scraped."
                );
            }
            Observation::InvalidRequest { reason } => {
                let _ = writeln!(out, "the previous action was invalid: {reason}");
            }
        }
        out.push('\n');
    }

    out
}

fn user_message(request: &ReasoningRequest) -> String {
    let mut msg = format!("Question: {}\n\n", request.question);
    if !request.observations.is_empty() {
        msg.push_str("Tool results so far:\n\n");
        msg.push_str(&render_observations(&request.observations));
    }
    msg.push_str(ACTION_REMINDER);
    msg
}

// ---------------------------------------------------------------------------
// Decision parsing
// ---------------------------------------------------------------------------

/// Classify a raw model reply. Never fails; unusable replies are `Malformed`.
pub fn parse_decision(raw: &str) -> ReasoningDecision {
    let malformed = |reason: &str| ReasoningDecision::Malformed {
        raw: raw.to_string(),
        reason: reason.to_string(),
    };

    let value = match find_action_blob(raw) {
        Ok(value) => value,
        Err(reason) => return malformed(reason),
    };
    let Some(action) = value.get("action").and_then(Value::as_str) else {
        return malformed("missing \"action\" field");
    };
    let input = value.get("action_input").unwrap_or(&Value::Null);

    match action.trim().to_ascii_lowercase().as_str() {
        "final answer" | "final_answer" => match input {
            Value::String(s) if !s.trim().is_empty() => ReasoningDecision::FinalAnswer(s.clone()),
            Value::Null | Value::String(_) => malformed("empty final answer"),
            other => ReasoningDecision::FinalAnswer(other.to_string()),
        },
        SEARCH_TOOL => {
            let mut search = SearchAction::new("");
            match input {
                Value::String(q) => search.query = q.trim().to_string(),
                Value::Object(map) => {
                    search.query = map
                        .get("query")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    search.sites = string_list(map.get("sites"));
                    search.depth = map
                        .get("depth")
                        .and_then(Value::as_str)
                        .and_then(|d| d.parse().ok());
                    search.max_results = map
                        .get("max_results")
                        .and_then(Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .filter(|&n| n > 0);
                }
                _ => {}
            }
            if search.query.is_empty() {
                return malformed("search request without a query");
            }
            ReasoningDecision::Search(search)
        }
        SCRAPE_TOOL => {
            let url = match input {
                Value::String(u) => u.trim(),
                Value::Object(map) => map.get("url").and_then(Value::as_str).unwrap_or("").trim(),
                _ => "",
            };
            if url.is_empty() {
                return malformed("scrape request without a URL");
            }
            ReasoningDecision::Fetch {
                url: url.to_string(),
            }
        }
        _ => malformed(&format!("unknown action '{action}'")),
    }
}

/// `["a", "b"]` or `"a, b"`.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// The first JSON object carrying an `"action"`, preferring fenced code blocks.
fn find_action_blob(text: &str) -> std::result::Result<Value, &'static str> {
    let mut failure = "no JSON action blob found";

    for span in fenced_blocks(text)
        .into_iter()
        .flat_map(json_objects)
        .chain(json_objects(text))
    {
        match serde_json::from_str::<Value>(span) {
            Ok(value) if value.get("action").and_then(Value::as_str).is_some() => return Ok(value),
            Ok(_) => failure = "missing \"action\" field",
            Err(_) if failure == "no JSON action blob found" => {
                failure = "action blob is not valid JSON";
            }
            Err(_) => {}
        }
    }
    Err(failure)
}

/// Bodies of ``` fenced blocks, without the info string line.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let body_start = after.find('\n').map_or(after.len(), |i| i + 1);
        let body = &after[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(&body[..close]);
        rest = &body[close + 3..];
    }
    blocks
}

/// Every balanced `{...}` span, one per opening brace, in order.
fn json_objects(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(move |(start, _)| balanced_object(&text[start..]))
}

/// The balanced span opening at the start of `text`, skipping braces inside JSON strings.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenRouterReasoner
// ---------------------------------------------------------------------------

/// Reasoning capability calling a chat-completions endpoint.
pub struct OpenRouterReasoner {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenRouterReasoner {
    pub fn new(config: &OpenRouterConfig, api_key: impl Into<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DocQaError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    /// Build from config, reading the key from the configured env var.
    pub fn from_config(config: &OpenRouterConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                DocQaError::config(format!(
                    "reasoning API key not found. Set the {} environment variable.",
                    config.api_key_env
                ))
            })?;
        Self::new(config, api_key)
    }

    fn map_transport_error(&self, e: reqwest::Error) -> DocQaError {
        if e.is_timeout() {
            DocQaError::CapabilityTimeout {
                capability: Capability::Reasoning,
                timeout: self.timeout,
            }
        } else {
            DocQaError::unavailable(Capability::Reasoning, e.to_string())
        }
    }
}

#[async_trait]
impl ReasoningCapability for OpenRouterReasoner {
    #[instrument(skip_all, fields(model = %self.model, observations = request.observations.len()))]
    async fn decide(&self, request: &ReasoningRequest) -> Result<ReasoningDecision> {
        let user = user_message(request);

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
        for turn in &request.history {
            messages.push(ChatMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &user,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let url = format!("{}{COMPLETIONS_PATH}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DocQaError::unavailable(
                Capability::Reasoning,
                format!("HTTP {status}: {}", detail.chars().take(200).collect::<String>()),
            ));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            DocQaError::malformed(Capability::Reasoning, format!("invalid JSON: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DocQaError::malformed(Capability::Reasoning, "no completion choices"))?;

        let decision = parse_decision(&content);
        debug!(?decision, "reasoning decision");
        Ok(decision)
    }
}

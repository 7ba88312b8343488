//! Core domain types shared by every docqa crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Opaque session key supplied by the transport layer.
///
/// The core never interprets it; `generate` exists for callers that have
/// no identifier yet (first request from a client).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Issue a fresh, time-sortable identifier.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name as used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of conversation memory. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Domains and sources
// ---------------------------------------------------------------------------

/// A documentation site the assistant is allowed to draw from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Topic key (e.g. `langchain`), unique within the allow-list.
    pub key: String,
    /// Normalised hostname (lowercase, no scheme, no path).
    pub hostname: String,
    /// Human-readable description shown to the reasoning step.
    pub description: String,
}

/// A search hit that survived domain filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    /// Snippet after budgeting; may end with the truncation marker.
    pub snippet: String,
    /// Key of the allow-list entry the host matched.
    pub domain_key: String,
    pub truncated: bool,
}

/// Page text retrieved by the scrape capability, after budgeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPage {
    pub url: String,
    pub content: String,
    pub truncated: bool,
}

/// How thorough a search should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Shallow,
    Thorough,
}

impl std::str::FromStr for SearchDepth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shallow" | "basic" => Ok(Self::Shallow),
            "thorough" | "advanced" => Ok(Self::Thorough),
            other => Err(format!("unknown search depth '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// LoopOutcome
// ---------------------------------------------------------------------------

/// Why the orchestration loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Answered,
    MaxIterationsReached,
    TimedOut,
    CapabilityFailed,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::MaxIterationsReached => "max_iterations_reached",
            Self::TimedOut => "timed_out",
            Self::CapabilityFailed => "capability_failed",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one run of the orchestration loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub answer: String,
    /// URLs of in-domain results and pages the reasoning step saw.
    pub used_sources: Vec<String>,
    /// Number of reasoning calls made.
    pub iterations: u32,
    pub termination_reason: TerminationReason,
    /// Limitations the caller should show next to the answer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caveats: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn search_depth_accepts_provider_names() {
        assert_eq!("basic".parse::<SearchDepth>().unwrap(), SearchDepth::Shallow);
        assert_eq!("Thorough".parse::<SearchDepth>().unwrap(), SearchDepth::Thorough);
        assert_eq!("advanced".parse::<SearchDepth>().unwrap(), SearchDepth::Thorough);
        assert!("deep".parse::<SearchDepth>().is_err());
    }

    #[test]
    fn outcome_serialization() {
        let outcome = LoopOutcome {
            answer: "LangChain is a framework.".into(),
            used_sources: vec!["https://docs.langchain.com/intro".into()],
            iterations: 2,
            termination_reason: TerminationReason::Answered,
            caveats: vec![],
        };

        let json = serde_json::to_string(&outcome).expect("serialize");
        assert!(json.contains(r#""termination_reason":"answered""#));
        assert!(!json.contains("caveats"));

        let parsed: LoopOutcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn turn_constructors_set_role() {
        assert_eq!(Turn::user("hi").role, Role::User);
        assert_eq!(Turn::assistant("hello").role.as_str(), "assistant");
    }
}

//! Conversational orchestration engine for docqa.
//!
//! This crate ties the domain allow-list, content budgeting, bounded session
//! memory, and the reasoning/search/scrape capabilities into the per-request
//! decide → search → fetch → decide loop.

pub mod assistant;
pub mod budget;
pub mod orchestrator;
pub mod reasoning;
pub mod session;

pub use assistant::Assistant;
pub use budget::{ContentBudget, TRUNCATION_MARKER, is_truncated, truncate_to};
pub use orchestrator::{Capabilities, OrchestrationLoop};
pub use reasoning::{OpenRouterReasoner, build_system_prompt, parse_decision, render_observations};
pub use session::{Session, SessionGuard, SessionStore};

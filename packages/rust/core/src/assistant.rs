//! Request-level entry point tying sessions to the orchestration loop.

use std::sync::Arc;
use std::time::Duration;

use docqa_domains::DomainAllowList;
use docqa_scrape::PageScraper;
use docqa_search::TavilySearch;
use docqa_shared::{
    AgentConfig, AppConfig, DocQaError, LoopOutcome, Result, SessionId, TerminationReason, Turn,
};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::orchestrator::{Capabilities, OrchestrationLoop};
use crate::reasoning::OpenRouterReasoner;
use crate::session::SessionStore;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Answers questions within per-client sessions.
pub struct Assistant {
    store: Arc<SessionStore>,
    engine: OrchestrationLoop,
}

impl Assistant {
    pub fn new(store: Arc<SessionStore>, engine: OrchestrationLoop) -> Self {
        Self { store, engine }
    }

    /// Wire the HTTP-backed capabilities from configuration.
    ///
    /// Fails if an API key variable is unset or an HTTP client cannot be built.
    pub fn from_config(config: &AppConfig, allow_list: Arc<DomainAllowList>) -> Result<Self> {
        config.validate()?;
        let agent = AgentConfig::from(config);
        let capabilities = Capabilities {
            reasoning: Arc::new(OpenRouterReasoner::from_config(&config.openrouter)?),
            search: Arc::new(TavilySearch::from_config(&config.search)?),
            scrape: Arc::new(PageScraper::from_config(&config.scrape, Arc::clone(&allow_list))?),
        };

        let store = Arc::new(SessionStore::new(agent.max_turns, agent.session_ttl));
        Ok(Self::new(
            store,
            OrchestrationLoop::new(capabilities, allow_list, agent),
        ))
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn allow_list(&self) -> &DomainAllowList {
        self.engine.allow_list()
    }

    /// Answer `question` in the context of session `session_id`.
    pub async fn ask(&self, session_id: &SessionId, question: &str) -> Result<LoopOutcome> {
        self.ask_with_reset(session_id, question, false).await
    }

    /// Like [`ask`](Self::ask), optionally clearing the session's memory first.
    ///
    /// Requests for the same session run one at a time; a request that
    /// cannot start within the request deadline fails with `SessionBusy`.
    #[instrument(skip_all, fields(session = %session_id, reset))]
    pub async fn ask_with_reset(
        &self,
        session_id: &SessionId,
        question: &str,
        reset: bool,
    ) -> Result<LoopOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocQaError::validation("question must not be empty"));
        }

        let _turn = self
            .store
            .acquire(session_id, self.engine.config().request_deadline)
            .await?;

        if reset {
            self.store.reset(session_id);
        }
        let session = self.store.get_or_create(session_id);
        let outcome = self.engine.run(&session.history(), question).await;

        // Only completed loops become conversation memory.
        if matches!(
            outcome.termination_reason,
            TerminationReason::Answered | TerminationReason::MaxIterationsReached
        ) {
            self.store.append_turn(session_id, Turn::user(question));
            self.store
                .append_turn(session_id, Turn::assistant(outcome.answer.clone()));
        } else {
            debug!(reason = %outcome.termination_reason, "turn not recorded");
        }

        Ok(outcome)
    }

    /// Clear the memory of `session_id`.
    pub fn reset(&self, session_id: &SessionId) {
        self.store.reset(session_id);
    }

    /// Run the expiry sweep every `sweep_interval` until the handle is aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let period = self.engine.config().sweep_interval.max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.sweep_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use docqa_shared::{
        RawSearchHit, ReasoningCapability, ReasoningDecision, ReasoningRequest, ScrapeCapability,
        SearchCapability, SearchRequest,
    };
    use url::Url;

    use super::*;

    /// Answers every question with `answer: <question>` after `delay`.
    struct EchoReasoner {
        delay: Duration,
        histories: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ReasoningCapability for EchoReasoner {
        async fn decide(&self, request: &ReasoningRequest) -> Result<ReasoningDecision> {
            self.histories
                .lock()
                .unwrap()
                .push(request.history.iter().map(|t| t.content.clone()).collect());
            tokio::time::sleep(self.delay).await;
            Ok(ReasoningDecision::FinalAnswer(format!("answer: {}", request.question)))
        }
    }

    struct NoSearch;

    #[async_trait]
    impl SearchCapability for NoSearch {
        async fn search(&self, _request: &SearchRequest) -> Result<Vec<RawSearchHit>> {
            Ok(vec![])
        }
    }

    struct NoScrape;

    #[async_trait]
    impl ScrapeCapability for NoScrape {
        async fn scrape(&self, url: &Url) -> Result<String> {
            Err(DocQaError::unavailable(docqa_shared::Capability::Scrape, url.to_string()))
        }
    }

    fn assistant(delay: Duration, request_deadline: Duration) -> (Assistant, Arc<EchoReasoner>) {
        let config = AgentConfig {
            request_deadline,
            reasoning_timeout: Duration::from_secs(3600),
            ..AgentConfig::default()
        };
        assistant_with(delay, config)
    }

    fn assistant_with(delay: Duration, config: AgentConfig) -> (Assistant, Arc<EchoReasoner>) {
        let reasoner = Arc::new(EchoReasoner {
            delay,
            histories: Mutex::new(Vec::new()),
        });
        let engine = OrchestrationLoop::new(
            Capabilities {
                reasoning: reasoner.clone(),
                search: Arc::new(NoSearch),
                scrape: Arc::new(NoScrape),
            },
            Arc::new(DomainAllowList::empty()),
            config.clone(),
        );
        let store = Arc::new(SessionStore::new(config.max_turns, config.session_ttl));
        (Assistant::new(store, engine), reasoner)
    }

    fn turns(assistant: &Assistant, id: &SessionId) -> Vec<String> {
        assistant
            .store()
            .get_or_create(id)
            .history()
            .into_iter()
            .map(|t| t.content)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn ask_records_question_and_answer() {
        let (assistant, reasoner) = assistant(Duration::ZERO, Duration::from_secs(60));
        let id = SessionId::from("s1");

        let first = assistant.ask(&id, "What is LangChain?").await.unwrap();
        assert_eq!(first.termination_reason, TerminationReason::Answered);
        assistant.ask(&id, "And agents?").await.unwrap();

        assert_eq!(
            turns(&assistant, &id),
            ["What is LangChain?", "answer: What is LangChain?", "And agents?", "answer: And agents?"]
        );
        let histories = reasoner.histories.lock().unwrap();
        assert!(histories[0].is_empty());
        assert_eq!(histories[1].len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_flag_clears_memory_first() {
        let (assistant, reasoner) = assistant(Duration::ZERO, Duration::from_secs(60));
        let id = SessionId::from("s1");

        assistant.ask(&id, "one").await.unwrap();
        assistant.ask_with_reset(&id, "two", true).await.unwrap();

        assert_eq!(turns(&assistant, &id), ["two", "answer: two"]);
        assert!(reasoner.histories.lock().unwrap()[1].is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn same_session_requests_are_serialized() {
        let (assistant, reasoner) = assistant(Duration::from_secs(2), Duration::from_secs(60));
        let id = SessionId::from("s1");

        let (a, b) = tokio::join!(assistant.ask(&id, "one"), assistant.ask(&id, "two"));
        assert!(a.is_ok() && b.is_ok());

        assert_eq!(turns(&assistant, &id), ["one", "answer: one", "two", "answer: two"]);
        // The queued request saw the first exchange
        assert_eq!(reasoner.histories.lock().unwrap()[1], ["one", "answer: one"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_request_is_not_remembered() {
        let (assistant, _) = assistant(Duration::from_secs(30), Duration::from_secs(5));
        let id = SessionId::from("s1");

        let outcome = assistant.ask(&id, "slow").await.unwrap();
        assert_eq!(outcome.termination_reason, TerminationReason::TimedOut);
        assert!(turns(&assistant, &id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_question_is_rejected() {
        let (assistant, _) = assistant(Duration::ZERO, Duration::from_secs(60));
        let err = assistant.ask(&SessionId::from("s1"), "   ").await.unwrap_err();
        assert!(matches!(err, DocQaError::Validation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_idle_sessions() {
        let (assistant, _) = assistant(Duration::ZERO, Duration::from_secs(60));
        assistant.ask(&SessionId::from("idle"), "hi").await.unwrap();
        assert_eq!(assistant.store().len(), 1);

        let handle = assistant.spawn_sweeper();
        let ttl = assistant.store().ttl();
        tokio::time::sleep(ttl + Duration::from_secs(120)).await;
        assert!(assistant.store().is_empty());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_sweep_interval_keeps_sweeping() {
        let config = AgentConfig {
            sweep_interval: Duration::ZERO,
            session_ttl: Duration::from_secs(10),
            ..AgentConfig::default()
        };
        let (assistant, _) = assistant_with(Duration::ZERO, config);
        assistant.ask(&SessionId::from("idle"), "hi").await.unwrap();

        let handle = assistant.spawn_sweeper();
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(!handle.is_finished());
        assert!(assistant.store().is_empty());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_limits_do_not_overflow_deadlines() {
        let config = AgentConfig {
            request_deadline: Duration::MAX,
            reasoning_timeout: Duration::MAX,
            ..AgentConfig::default()
        };
        let (assistant, _) = assistant_with(Duration::ZERO, config);

        let outcome = assistant.ask(&SessionId::from("s1"), "hi").await.unwrap();
        assert_eq!(outcome.termination_reason, TerminationReason::Answered);
    }

    #[test]
    fn from_config_rejects_invalid_limits() {
        let mut config = AppConfig::default();
        config.agent.sweep_interval_secs = 0;
        let err = Assistant::from_config(&config, Arc::new(DomainAllowList::empty())).err();
        assert!(matches!(err, Some(DocQaError::Config { .. })));
    }
}

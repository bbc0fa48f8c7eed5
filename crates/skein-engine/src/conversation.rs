use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use skein_context::{ContextStrategy, NoopStrategy, StrategyRequest};
use skein_core::backend::{ChatBackend, MessageChunk};
use skein_core::errors::{BackendError, ConfigError, ContextError};
use skein_core::messages::{Message, Role};

/// A turn that could not complete. A `Context` failure commits nothing: the
/// log is exactly what it was before the send, so retrying is idempotent.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("context strategy failed")]
    Context(#[from] ContextError),
    #[error("backend `{backend}` failed")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },
}

/// Owns one message log and drives the per-turn loop: append the user turn,
/// reprocess the log through the context strategy, transmit the send view,
/// append the reply. Strictly sequential: one turn runs to completion
/// (including any summarizer call) before the next is accepted.
pub struct Conversation {
    backend: Arc<dyn ChatBackend>,
    strategy: Box<dyn ContextStrategy>,
    messages: Vec<Message>,
    initial_system: Option<Message>,
}

impl Conversation {
    /// Connect to the backend named by the model URI, with the pass-through
    /// strategy until one is configured.
    pub fn connect(model_uri: &str, api_key: &str) -> Result<Self, ConfigError> {
        Ok(Self::with_backend(skein_llm::connect(model_uri, api_key)?))
    }

    pub fn with_backend(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            strategy: Box::new(NoopStrategy),
            messages: Vec::new(),
            initial_system: None,
        }
    }

    pub fn with_system_prompt(mut self, text: impl Into<String>) -> Self {
        let message = Message::system(text);
        self.initial_system = Some(message.clone());
        self.messages.push(message);
        self
    }

    pub fn with_strategy(mut self, strategy: Box<dyn ContextStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// The full audit log, markers included.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append previously recorded messages, e.g. to restore an earlier
    /// conversation. Plain construction; no strategy runs here.
    pub fn restore(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Send a user turn and wait for the complete reply.
    pub async fn send(&mut self, text: &str) -> Result<Message, ConversationError> {
        self.send_as(Role::Human, text).await
    }

    /// Send a turn under an explicit role. Only `human` messages open new
    /// turns for the segmenter; other roles attach to the current one.
    pub async fn send_as(&mut self, role: Role, text: &str) -> Result<Message, ConversationError> {
        let outbound = self.run_strategy(role, text).await?;

        let reply = self
            .backend
            .complete(&outbound)
            .await
            .map_err(|source| self.backend_error(source))?;

        self.messages.push(reply.clone());
        debug!(log_len = self.messages.len(), "turn complete");
        Ok(reply)
    }

    /// Send a user turn, handing each incremental chunk to `on_chunk`.
    /// Returns the assembled reply after the stream ends.
    pub async fn send_stream<F>(
        &mut self,
        text: &str,
        mut on_chunk: F,
    ) -> Result<Message, ConversationError>
    where
        F: FnMut(&MessageChunk),
    {
        let outbound = self.run_strategy(Role::Human, text).await?;

        let mut stream = self
            .backend
            .stream(&outbound)
            .await
            .map_err(|source| self.backend_error(source))?;

        let mut content = String::new();
        let mut final_message = None;
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(|source| self.backend_error(source))?;
            on_chunk(&chunk);
            content.push_str(&chunk.content);
            if chunk.is_final && chunk.final_message.is_some() {
                final_message = chunk.final_message;
            }
        }

        if content.is_empty() && final_message.is_none() {
            return Err(self.backend_error(BackendError::EmptyResponse(
                self.backend.name().to_string(),
            )));
        }

        let reply = final_message.unwrap_or_else(|| Message::ai(content));
        self.messages.push(reply.clone());
        Ok(reply)
    }

    /// Run the strategy over the candidate log (current log + the new turn
    /// message). Committed only on success: a compaction failure leaves the
    /// log byte-for-byte unchanged.
    async fn run_strategy(
        &mut self,
        role: Role,
        text: &str,
    ) -> Result<Vec<Message>, ConversationError> {
        let mut candidate = self.messages.clone();
        candidate.push(Message::from_role(role, text));

        let response = self
            .strategy
            .process(StrategyRequest::new(candidate))
            .await?;

        self.messages = response.messages;
        debug!(
            strategy = self.strategy.name(),
            log_len = self.messages.len(),
            send_len = response.messages_to_send.len(),
            "strategy applied"
        );
        Ok(prepare_for_backend(&response.messages_to_send))
    }

    fn backend_error(&self, source: BackendError) -> ConversationError {
        ConversationError::Backend {
            backend: self.backend.name().to_string(),
            source,
        }
    }

    /// Drop everything, including the initial system prompt.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Back to the initial state: only the configured system prompt remains,
    /// and the strategy gets its reset hook.
    pub fn reset(&mut self) {
        self.messages.clear();
        if let Some(system) = &self.initial_system {
            self.messages.push(system.clone());
        }
        self.strategy.reset();
        info!("conversation reset");
    }

    pub fn stats(&self) -> ConversationStats {
        let mut stats = ConversationStats {
            total_messages: self.messages.len(),
            ..ConversationStats::default()
        };
        for message in &self.messages {
            *stats
                .by_role
                .entry(message.role().as_str().to_string())
                .or_default() += 1;

            if let Some(usage) = message.metadata().get("usage") {
                stats.input_tokens += read_counter(usage, &["prompt_tokens", "input_tokens"]);
                stats.output_tokens +=
                    read_counter(usage, &["completion_tokens", "output_tokens"]);
                stats.total_tokens += read_counter(usage, &["total_tokens"]);
            }
        }
        stats
    }
}

/// Backends do not understand the marker role: markers travel as system
/// messages carrying their decorated content.
fn prepare_for_backend(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .map(|message| match message {
            Message::Marker(body) => Message::system(body.content.clone().unwrap_or_default()),
            other => other.clone(),
        })
        .collect()
}

fn read_counter(usage: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|k| usage.get(k).and_then(Value::as_u64))
        .unwrap_or(0)
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversationStats {
    pub total_messages: usize,
    pub by_role: BTreeMap<String, usize>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl ConversationStats {
    /// Render a counter the way humans read it: `12.5K` past a thousand.
    pub fn format_tokens(tokens: u64) -> String {
        if tokens >= 1000 {
            format!("{:.1}K", tokens as f64 / 1000.0)
        } else {
            tokens.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use skein_context::{FifoConfig, FifoStrategy, StrategyResponse};
    use skein_llm::{MockBackend, MockReply};

    struct FailingStrategy;

    #[async_trait]
    impl ContextStrategy for FailingStrategy {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn process(
            &self,
            _request: StrategyRequest,
        ) -> Result<StrategyResponse, ContextError> {
            Err(ContextError::EmptySummary)
        }
    }

    #[tokio::test]
    async fn send_appends_turn_and_reply() {
        let backend = Arc::new(MockBackend::new(vec![MockReply::text("hi there")]));
        let mut conv = Conversation::with_backend(backend.clone());

        let reply = conv.send("hello").await.unwrap();
        assert_eq!(reply.content(), Some("hi there"));
        assert_eq!(conv.messages().len(), 2);
        assert_eq!(conv.messages()[0].role(), Role::Human);
        assert_eq!(conv.messages()[1].role(), Role::Ai);
    }

    #[tokio::test]
    async fn system_prompt_travels_every_turn() {
        let backend = Arc::new(MockBackend::new(vec![
            MockReply::text("one"),
            MockReply::text("two"),
        ]));
        let mut conv =
            Conversation::with_backend(backend.clone()).with_system_prompt("be helpful");

        conv.send("first").await.unwrap();
        conv.send("second").await.unwrap();

        for request in backend.requests() {
            assert!(request[0].is_system());
            assert_eq!(request[0].content(), Some("be helpful"));
        }
    }

    #[tokio::test]
    async fn markers_reach_the_backend_as_system_messages() {
        let backend = Arc::new(MockBackend::new(vec![MockReply::text("ok")]));
        let mut conv = Conversation::with_backend(backend.clone());
        conv.restore([
            Message::human("old question"),
            Message::ai("old answer"),
            Message::summary_marker("what came before", 2),
        ]);

        conv.send("new question").await.unwrap();

        let request = &backend.requests()[0];
        assert!(request.iter().all(|m| !m.is_marker()));
        let converted = request
            .iter()
            .find(|m| m.content() == Some("[Conversation Summary] what came before"))
            .expect("marker converted");
        assert!(converted.is_system());
        // The log itself still holds the real marker.
        assert!(conv.messages().iter().any(|m| m.is_marker()));
    }

    #[tokio::test]
    async fn compaction_failure_commits_nothing() {
        let backend = Arc::new(MockBackend::new(vec![MockReply::text("never sent")]));
        let mut conv = Conversation::with_backend(backend.clone())
            .with_system_prompt("sys")
            .with_strategy(Box::new(FailingStrategy));

        let before = conv.messages().len();
        let err = conv.send("doomed").await.unwrap_err();
        assert!(matches!(err, ConversationError::Context(_)));
        assert_eq!(conv.messages().len(), before, "log unchanged");
        assert_eq!(backend.call_count(), 0, "nothing transmitted");
    }

    #[tokio::test]
    async fn backend_failure_keeps_the_user_turn() {
        let backend = Arc::new(MockBackend::new(vec![MockReply::Error(
            BackendError::Overloaded,
        )]));
        let mut conv = Conversation::with_backend(backend);

        let err = conv.send("question").await.unwrap_err();
        assert!(matches!(
            err,
            ConversationError::Backend { source: BackendError::Overloaded, .. }
        ));
        // The turn stays in the log; no reply was appended.
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].role(), Role::Human);
    }

    #[tokio::test]
    async fn fifo_strategy_bounds_what_is_transmitted() {
        let mut replies = Vec::new();
        for i in 1..=4 {
            replies.push(MockReply::text(&format!("answer {i}")));
        }
        let backend = Arc::new(MockBackend::new(replies));
        let strategy = FifoStrategy::new(FifoConfig {
            keep_recent_turns: Some(1),
            ..FifoConfig::default()
        })
        .unwrap();
        let mut conv = Conversation::with_backend(backend.clone())
            .with_system_prompt("sys")
            .with_strategy(Box::new(strategy));

        for i in 1..=4 {
            conv.send(&format!("question {i}")).await.unwrap();
        }

        // Last request: system + current turn only.
        let last = backend.requests().pop().unwrap();
        let contents: Vec<_> = last.iter().map(|m| m.content().unwrap()).collect();
        assert_eq!(contents, vec!["sys", "question 4"]);

        // Full audit log unharmed: 1 system + 4 turns of 2.
        assert_eq!(conv.messages().len(), 9);
    }

    #[tokio::test]
    async fn send_stream_assembles_chunks() {
        let backend = Arc::new(MockBackend::new(vec![MockReply::streamed_text(
            "streamed reply here",
        )]));
        let mut conv = Conversation::with_backend(backend);

        let mut seen = Vec::new();
        let reply = conv
            .send_stream("question", |chunk| seen.push(chunk.content.clone()))
            .await
            .unwrap();

        assert_eq!(reply.content(), Some("streamed reply here"));
        assert!(seen.len() > 1);
        assert_eq!(conv.messages().len(), 2);
    }

    #[tokio::test]
    async fn reset_restores_initial_system_prompt() {
        let backend = Arc::new(MockBackend::new(vec![MockReply::text("r")]));
        let mut conv = Conversation::with_backend(backend).with_system_prompt("keep me");

        conv.send("hello").await.unwrap();
        assert_eq!(conv.messages().len(), 3);

        conv.reset();
        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].content(), Some("keep me"));

        conv.clear();
        assert!(conv.messages().is_empty());
    }

    #[tokio::test]
    async fn stats_aggregate_usage_counters() {
        let backend = Arc::new(MockBackend::new(vec![]));
        let mut conv = Conversation::with_backend(backend);

        let mut body = skein_core::messages::MessageBody::text("reply");
        body.metadata.insert(
            "usage".into(),
            serde_json::json!({"prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150}),
        );
        conv.restore([Message::human("q"), Message::Ai(body)]);

        let stats = conv.stats();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.by_role["user"], 1);
        assert_eq!(stats.by_role["assistant"], 1);
        assert_eq!(stats.input_tokens, 120);
        assert_eq!(stats.output_tokens, 30);
        assert_eq!(stats.total_tokens, 150);
    }

    #[test]
    fn token_formatting() {
        assert_eq!(ConversationStats::format_tokens(999), "999");
        assert_eq!(ConversationStats::format_tokens(12_500), "12.5K");
    }
}

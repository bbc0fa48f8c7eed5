use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use skein_core::backend::Summarizer;
use skein_core::errors::{ConfigError, ContextError};
use skein_core::messages::{MarkerKind, Message};
use skein_core::tokens::{CostModel, HeuristicCounter, TokenCounter};
use skein_llm::summarizer::RemoteSummarizer;

use crate::strategy::{
    render_transcript, send_view, ContextStrategy, StrategyRequest, StrategyResponse,
};
use crate::turns::segment_refs;

/// Instruction for the cumulative summary call. Previous rounds are copied
/// verbatim so summaries compose across markers; only the new rounds are
/// condensed.
pub(crate) const SUMMARY_INSTRUCTION: &str = "\
You are a conversation summarizer. Produce a CUMULATIVE summary that keeps \
every previously summarized round and appends the new rounds.

Output structure (mandatory):
[Summary]
One block per round, each with:
  - Topic: what the round discussed
  - User Intent: what the user wanted
  - Summary: 3-5 concise bullet points

Rules:
1. If the input contains a 'Previous Summary' section, copy ALL of its rounds
   word-for-word, then append the new rounds after them. Never shorten,
   merge, or rewrite previous rounds.
2. For each NEW round, extract only the most important 3-5 points. One or two
   sentences per bullet. Drop examples, tables, formulas, and long
   explanations; keep core concepts, conclusions, and key differences.
3. Write in the same language as the input messages.";

/// Parameters for [`SummarizeStrategy`]. The summarizer model URI and API
/// key are required; construction fails without them.
#[derive(Clone, Debug)]
pub struct SummarizeConfig {
    /// Context window limit of the chat model being protected.
    pub max_input_tokens: usize,
    /// Fraction of the budget at which compaction triggers, leaving headroom
    /// for the reply.
    pub summarize_threshold: f64,
    /// Recent turns preferred verbatim over summarization.
    pub prefer_recent_turns: usize,
    pub summarizer_model_uri: String,
    pub summarizer_api_key: String,
    pub cost: CostModel,
}

impl SummarizeConfig {
    pub fn new(
        max_input_tokens: usize,
        summarizer_model_uri: impl Into<String>,
        summarizer_api_key: impl Into<String>,
    ) -> Self {
        Self {
            max_input_tokens,
            summarize_threshold: 0.75,
            prefer_recent_turns: 2,
            summarizer_model_uri: summarizer_model_uri.into(),
            summarizer_api_key: summarizer_api_key.into(),
            cost: CostModel::default(),
        }
    }
}

/// Compresses old history into summary markers instead of deleting it. Each
/// marker condenses everything from the previous marker (inclusive) up to
/// the preserve boundary; the send view then starts at the newest marker.
pub struct SummarizeStrategy {
    config: SummarizeConfig,
    trigger_tokens: usize,
    counter: Arc<dyn TokenCounter>,
    client: Arc<dyn Summarizer>,
}

impl SummarizeStrategy {
    /// Build with a remote summarizer resolved from the configured URI.
    pub fn new(config: SummarizeConfig) -> Result<Self, ConfigError> {
        validate(&config)?;
        let client = RemoteSummarizer::from_uri(
            &config.summarizer_model_uri,
            &config.summarizer_api_key,
        )?;
        Ok(Self::assemble(config, Arc::new(client)))
    }

    /// Build with an injected summarizer client.
    pub fn with_client(
        config: SummarizeConfig,
        client: Arc<dyn Summarizer>,
    ) -> Result<Self, ConfigError> {
        validate(&config)?;
        Ok(Self::assemble(config, client))
    }

    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    fn assemble(config: SummarizeConfig, client: Arc<dyn Summarizer>) -> Self {
        let trigger_tokens =
            (config.max_input_tokens as f64 * config.summarize_threshold) as usize;
        Self {
            config,
            trigger_tokens,
            counter: Arc::new(HeuristicCounter),
            client,
        }
    }

    pub(crate) fn client(&self) -> Arc<dyn Summarizer> {
        Arc::clone(&self.client)
    }

    /// Token cost of what this turn would transmit: system messages plus the
    /// tail from the last summary marker (inclusive) to the end, or all
    /// conversational messages when no marker exists yet.
    fn send_cost(&self, messages: &[Message], last_marker: Option<usize>) -> usize {
        let system = messages.iter().filter(|m| m.is_system());
        match last_marker {
            Some(idx) => self.config.cost.sequence_cost(
                self.counter.as_ref(),
                system.chain(messages[idx..].iter().filter(|m| !m.is_system())),
            ),
            None => self.config.cost.sequence_cost(
                self.counter.as_ref(),
                system.chain(messages.iter().filter(|m| m.is_conversational())),
            ),
        }
    }
}

fn validate(config: &SummarizeConfig) -> Result<(), ConfigError> {
    if config.max_input_tokens == 0 {
        return Err(ConfigError::NonPositiveBudget);
    }
    if !(config.summarize_threshold > 0.0 && config.summarize_threshold <= 1.0) {
        return Err(ConfigError::InvalidThreshold(config.summarize_threshold));
    }
    if config.summarizer_model_uri.is_empty() {
        return Err(ConfigError::MissingField("summarizer_model_uri"));
    }
    if config.summarizer_api_key.is_empty() {
        return Err(ConfigError::MissingField("summarizer_api_key"));
    }
    Ok(())
}

#[async_trait]
impl ContextStrategy for SummarizeStrategy {
    fn name(&self) -> &'static str {
        "summarize"
    }

    async fn process(&self, request: StrategyRequest) -> Result<StrategyResponse, ContextError> {
        let messages = request.messages;
        if messages.is_empty() {
            return Ok(StrategyResponse {
                messages: Vec::new(),
                messages_to_send: Vec::new(),
            });
        }

        let last_marker = messages
            .iter()
            .rposition(|m| m.marker_kind() == Some(MarkerKind::Summary));

        let total = self.send_cost(&messages, last_marker);
        if total <= self.trigger_tokens {
            debug!(
                total,
                trigger = self.trigger_tokens,
                "below threshold, no compaction"
            );
            return Ok(StrategyResponse {
                messages_to_send: send_view(&messages),
                messages,
            });
        }
        debug!(
            total,
            trigger = self.trigger_tokens,
            budget = self.config.max_input_tokens,
            "compaction triggered"
        );

        // Conversational messages after the marker define the turn structure
        // still held verbatim.
        let conv: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(i, m)| m.is_conversational() && last_marker.is_none_or(|l| *i > l))
            .map(|(i, _)| i)
            .collect();
        let view: Vec<&Message> = conv.iter().map(|&i| &messages[i]).collect();
        let spans = segment_refs(&view);

        if spans.len() <= 1 {
            // A single turn is never summarized away.
            debug!("only one turn since last marker, skipping");
            return Ok(StrategyResponse {
                messages_to_send: send_view(&messages),
                messages,
            });
        }

        let turns_to_keep = self.config.prefer_recent_turns.min(spans.len() - 1);
        let boundary_turn = spans.len() - (turns_to_keep + 1);
        if spans[boundary_turn].start == 0 && last_marker.is_none() {
            debug!("nothing precedes the preserve boundary, skipping");
            return Ok(StrategyResponse {
                messages_to_send: send_view(&messages),
                messages,
            });
        }

        let boundary = conv[spans[boundary_turn].start];
        let start = last_marker.unwrap_or(0);
        let to_summarize = &messages[start..boundary];

        let transcript = render_transcript(to_summarize);
        if transcript.is_empty() {
            return Err(ContextError::EmptyTranscript);
        }

        debug!(
            interval_start = start,
            interval_end = boundary,
            count = to_summarize.len(),
            kept_turns = turns_to_keep,
            "requesting summary"
        );

        let summary = self
            .client
            .summarize(SUMMARY_INSTRUCTION, &transcript)
            .await
            .map_err(ContextError::Summarizer)?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(ContextError::EmptySummary);
        }

        let summarized_count = to_summarize.iter().filter(|m| !m.is_system()).count();
        let marker = Message::summary_marker(summary, summarized_count);
        let mut updated = messages;
        updated.insert(boundary, marker);

        Ok(StrategyResponse {
            messages_to_send: send_view(&updated),
            messages: updated,
        })
    }
}

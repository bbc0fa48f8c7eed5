use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use skein_core::errors::{ConfigError, ContextError};
use skein_core::messages::Message;
use skein_core::tokens::{CostModel, HeuristicCounter, TokenCounter};

use crate::strategy::{
    conversational_indices, ContextStrategy, StrategyRequest, StrategyResponse,
};
use crate::turns::{segment_refs, TurnSpan};

/// Limits for [`FifoStrategy`]. At least one of the two must be set.
#[derive(Clone, Debug, Default)]
pub struct FifoConfig {
    /// Keep only the last N turns. Zero behaves as one: the most recent turn
    /// is never dropped wholesale.
    pub keep_recent_turns: Option<usize>,
    /// Upper bound on the token cost of system messages plus retained turns.
    pub max_input_tokens: Option<usize>,
    pub cost: CostModel,
}

/// Drop-oldest view strategy. The full log is returned untouched: FIFO
/// computes which tail fits, it does not edit history.
pub struct FifoStrategy {
    config: FifoConfig,
    counter: Arc<dyn TokenCounter>,
}

impl FifoStrategy {
    pub fn new(config: FifoConfig) -> Result<Self, ConfigError> {
        Self::with_counter(config, Arc::new(HeuristicCounter))
    }

    pub fn with_counter(
        config: FifoConfig,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, ConfigError> {
        if config.keep_recent_turns.is_none() && config.max_input_tokens.is_none() {
            return Err(ConfigError::MissingLimit);
        }
        Ok(Self { config, counter })
    }
}

#[async_trait]
impl ContextStrategy for FifoStrategy {
    fn name(&self) -> &'static str {
        "fifo"
    }

    async fn process(&self, request: StrategyRequest) -> Result<StrategyResponse, ContextError> {
        let messages = request.messages;
        if messages.is_empty() {
            return Ok(StrategyResponse {
                messages: Vec::new(),
                messages_to_send: Vec::new(),
            });
        }

        let conv = conversational_indices(&messages);
        if conv.is_empty() {
            // Nothing to segment; send the log as-is.
            return Ok(StrategyResponse {
                messages_to_send: messages.clone(),
                messages,
            });
        }

        let view: Vec<&Message> = conv.iter().map(|&i| &messages[i]).collect();
        let mut spans = segment_refs(&view);
        let total_turns = spans.len();

        if let Some(keep) = self.config.keep_recent_turns {
            let keep = keep.max(1);
            if spans.len() > keep {
                spans.drain(..spans.len() - keep);
            }
        }

        let system: Vec<&Message> = messages.iter().filter(|m| m.is_system()).collect();
        let mut trimmed_span: Option<TurnSpan> = None;

        if let Some(budget) = self.config.max_input_tokens {
            let cost_of = |spans: &[TurnSpan]| {
                self.config.cost.sequence_cost(
                    self.counter.as_ref(),
                    system.iter().copied().chain(
                        spans
                            .iter()
                            .flat_map(|s| view[s.start..s.end].iter().copied()),
                    ),
                )
            };

            while spans.len() > 1 && cost_of(&spans) > budget {
                spans.remove(0);
            }

            if cost_of(&spans) > budget {
                // Down to the most recent turn and still over: trim it from
                // the oldest side, but its last message always survives.
                let mut span = spans.pop().expect("at least one turn");
                while span.len() > 1 && cost_of(&[span]) > budget {
                    span.start += 1;
                }
                trimmed_span = Some(span);
            }
        }

        let surviving: Vec<usize> = match trimmed_span {
            Some(span) => conv[span.start..span.end].to_vec(),
            None => spans
                .iter()
                .flat_map(|s| conv[s.start..s.end].iter().copied())
                .collect(),
        };

        debug!(
            total_turns,
            surviving_messages = surviving.len(),
            "fifo view computed"
        );

        let messages_to_send: Vec<Message> = messages
            .iter()
            .filter(|m| m.is_system())
            .cloned()
            .chain(surviving.iter().map(|&i| messages[i].clone()))
            .collect();

        Ok(StrategyResponse {
            messages,
            messages_to_send,
        })
    }
}

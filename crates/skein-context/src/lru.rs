use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use skein_core::backend::Summarizer;
use skein_core::errors::{ConfigError, ContextError};
use skein_core::messages::{MarkerKind, Message};

use crate::strategy::{
    marker_indices, render_transcript, send_view, ContextStrategy, StrategyRequest,
    StrategyResponse,
};
use crate::summarize::{SummarizeConfig, SummarizeStrategy};

/// How many of the newest summary markers define "recent context". Pruning
/// only starts once more than this many markers have accumulated.
const RECENT_MARKERS: usize = 5;

fn pruning_instruction(recent_context: &str) -> String {
    format!(
        "You are a conversation summarizer. Produce a CUMULATIVE summary, but \
keep ONLY rounds related to the recent hot topics.\n\n\
## Recent Context (latest summaries)\n{recent_context}\n\n\
Output structure (mandatory):\n\
[Summary]\n\
One block per kept round, each with:\n\
  - Topic: what the round discussed\n\
  - User Intent: what the user wanted\n\
  - Summary: 3-5 concise bullet points\n\n\
Rules:\n\
1. Compare every round (including rounds inside a 'Previous Summary') with \
the recent context above. A round unrelated to the recent topics is dropped \
completely; do not mention it.\n\
2. Rounds related to the recent topics are kept and refined.\n\
3. Kept rounds stay concise: one or two sentences per bullet, no examples, \
tables, or long explanations.\n\
4. Write in the same language as the input messages."
    )
}

/// Wraps [`SummarizeStrategy`] and additionally forgets cold topics: once
/// summary markers pile up, the span behind the newest marker is re-condensed
/// keeping only content related to the recent markers' topics. The result is
/// recorded as a separate `lru` marker inserted after the summary marker it
/// supersedes. The original stays, so both remain inspectable.
pub struct LruStrategy {
    inner: SummarizeStrategy,
    client: Arc<dyn Summarizer>,
}

impl LruStrategy {
    pub fn new(config: SummarizeConfig) -> Result<Self, ConfigError> {
        let inner = SummarizeStrategy::new(config)?;
        let client = inner.client();
        Ok(Self { inner, client })
    }

    pub fn with_client(
        config: SummarizeConfig,
        client: Arc<dyn Summarizer>,
    ) -> Result<Self, ConfigError> {
        let inner = SummarizeStrategy::with_client(config, Arc::clone(&client))?;
        Ok(Self { inner, client })
    }
}

#[async_trait]
impl ContextStrategy for LruStrategy {
    fn name(&self) -> &'static str {
        "lru"
    }

    fn reset(&self) {
        self.inner.reset();
    }

    async fn process(&self, request: StrategyRequest) -> Result<StrategyResponse, ContextError> {
        let delegated = self.inner.process(request).await?;

        let summaries = marker_indices(&delegated.messages, MarkerKind::Summary);
        if summaries.len() <= RECENT_MARKERS {
            debug!(markers = summaries.len(), "not enough markers to prune");
            return Ok(delegated);
        }

        let messages = delegated.messages;
        let last = *summaries.last().expect("non-empty");

        // Idempotent re-entry: the newest marker has already been pruned.
        if messages
            .get(last + 1)
            .is_some_and(|m| m.marker_kind() == Some(MarkerKind::Lru))
        {
            debug!("newest summary marker already pruned");
            return Ok(StrategyResponse {
                messages_to_send: send_view(&messages),
                messages,
            });
        }

        let recent_context = summaries[summaries.len() - RECENT_MARKERS..]
            .iter()
            .filter_map(|&i| messages[i].marker_summary())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        // Re-condense the span covering the two newest markers.
        let start = summaries[summaries.len() - 2];
        let span = &messages[start..last];
        let transcript = render_transcript(span);
        if transcript.is_empty() {
            return Err(ContextError::EmptyTranscript);
        }

        debug!(
            markers = summaries.len(),
            span_start = start,
            span_end = last,
            "pruning cold topics"
        );

        let summary = self
            .client
            .summarize(&pruning_instruction(&recent_context), &transcript)
            .await
            .map_err(ContextError::Summarizer)?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(ContextError::EmptySummary);
        }

        let pruned_count = span.iter().filter(|m| !m.is_system()).count();
        let marker = Message::lru_marker(summary, pruned_count, last);
        let mut updated = messages;
        updated.insert(last + 1, marker);

        Ok(StrategyResponse {
            messages_to_send: send_view(&updated),
            messages: updated,
        })
    }
}

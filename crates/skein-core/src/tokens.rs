use crate::messages::Message;

/// Pluggable token counting. Must be deterministic for a given text;
/// strategies assume roughly length-proportional behavior but never an exact
/// tokenizer.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Default estimator: one token per four characters, rounded up.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

/// Per-message and per-request overhead added on top of raw content tokens.
/// The defaults approximate one chat-format convention; they are knobs, not
/// facts about any particular backend's tokenizer.
#[derive(Clone, Copy, Debug)]
pub struct CostModel {
    pub per_message: usize,
    pub per_request: usize,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            per_message: 4,
            per_request: 2,
        }
    }
}

impl CostModel {
    pub fn message_cost(&self, counter: &dyn TokenCounter, message: &Message) -> usize {
        self.per_message + message.content().map_or(0, |text| counter.count(text))
    }

    /// Total cost of a message set: per-message overhead plus content, plus
    /// the per-request overhead once.
    pub fn sequence_cost<'a, I>(&self, counter: &dyn TokenCounter, messages: I) -> usize
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages
            .into_iter()
            .map(|m| self.message_cost(counter, m))
            .sum::<usize>()
            + self.per_request
    }
}

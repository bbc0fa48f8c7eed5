use async_trait::async_trait;

use skein_core::errors::ContextError;
use skein_core::messages::{MarkerKind, Message, Role};

/// Read view of the full message log handed to a strategy for one turn.
#[derive(Clone, Debug)]
pub struct StrategyRequest {
    pub messages: Vec<Message>,
}

impl StrategyRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// What a strategy hands back: the full log (possibly with freshly inserted
/// markers, never with anything removed) and the subsequence to actually
/// transmit this turn.
#[derive(Clone, Debug)]
pub struct StrategyResponse {
    pub messages: Vec<Message>,
    pub messages_to_send: Vec<Message>,
}

/// One member of the compaction strategy family. Constructed once per
/// conversation, invoked once per turn. `process` may suspend on a
/// summarizer call; everything else is pure. A strategy must never return an
/// empty send view while the log holds a non-system message.
#[async_trait]
pub trait ContextStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, request: StrategyRequest) -> Result<StrategyResponse, ContextError>;

    /// Called when the owning conversation is reset.
    fn reset(&self) {}
}

/// The extraction rule shared by marker-based strategies: all system
/// messages in original order, then the tail from the last marker of any
/// kind (inclusive) to the end, or every conversational message when no
/// marker exists. System messages are never duplicated into the tail.
pub fn send_view(messages: &[Message]) -> Vec<Message> {
    let system = messages.iter().filter(|m| m.is_system()).cloned();

    let tail: Vec<Message> = match messages.iter().rposition(|m| m.is_marker()) {
        Some(idx) => messages[idx..]
            .iter()
            .filter(|m| !m.is_system())
            .cloned()
            .collect(),
        None => messages
            .iter()
            .filter(|m| m.is_conversational())
            .cloned()
            .collect(),
    };

    system.chain(tail).collect()
}

/// Positions of conversational (human/ai/tool) messages within the full log.
pub(crate) fn conversational_indices(messages: &[Message]) -> Vec<usize> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_conversational())
        .map(|(i, _)| i)
        .collect()
}

/// Positions of markers of one kind.
pub(crate) fn marker_indices(messages: &[Message], kind: MarkerKind) -> Vec<usize> {
    messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.marker_kind() == Some(kind))
        .map(|(i, _)| i)
        .collect()
}

/// Render a log interval as the role-labeled transcript handed to the
/// summarizer. A marker contributes its raw metadata summary under the
/// "Previous Summary" label, never its decorated content, so successive
/// summaries compose losslessly. System messages are skipped: they travel
/// with every send view and must not leak into summaries.
pub(crate) fn render_transcript(messages: &[Message]) -> String {
    let mut segments = Vec::new();
    for message in messages {
        let (label, text) = match message.role() {
            Role::Human => ("User", message.content().unwrap_or("")),
            Role::Ai => ("Assistant", message.content().unwrap_or("")),
            Role::System => continue,
            Role::Tool => ("Tool", message.content().unwrap_or("")),
            Role::Marker => ("Previous Summary", message.marker_summary().unwrap_or("")),
        };
        let text = text.trim();
        if !text.is_empty() {
            segments.push(format!("{label}: {text}"));
        }
    }
    segments.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_view_without_marker_is_all_conversational_plus_system() {
        let messages = vec![
            Message::system("sys"),
            Message::human("h1"),
            Message::ai("a1"),
        ];
        let view = send_view(&messages);
        assert_eq!(view.len(), 3);
        assert!(view[0].is_system());
        assert_eq!(view[1].content(), Some("h1"));
    }

    #[test]
    fn send_view_starts_at_last_marker() {
        let messages = vec![
            Message::system("sys"),
            Message::human("h1"),
            Message::ai("a1"),
            Message::summary_marker("old stuff", 2),
            Message::human("h2"),
            Message::ai("a2"),
        ];
        let view = send_view(&messages);
        let contents: Vec<_> = view.iter().map(|m| m.content().unwrap()).collect();
        assert_eq!(
            contents,
            vec!["sys", "[Conversation Summary] old stuff", "h2", "a2"]
        );
    }

    #[test]
    fn send_view_never_duplicates_system_in_tail() {
        let messages = vec![
            Message::human("h1"),
            Message::summary_marker("s", 1),
            Message::system("late system"),
            Message::human("h2"),
        ];
        let view = send_view(&messages);
        let system_count = view.iter().filter(|m| m.is_system()).count();
        assert_eq!(system_count, 1);
    }

    #[test]
    fn send_view_nonempty_for_nonempty_conversation() {
        let messages = vec![Message::human("only one")];
        let view = send_view(&messages);
        assert!(view.iter().any(|m| !m.is_system()));
    }

    #[test]
    fn transcript_substitutes_raw_marker_summary() {
        let messages = vec![
            Message::summary_marker("the raw gist", 3),
            Message::human("next question"),
        ];
        let transcript = render_transcript(&messages);
        assert_eq!(
            transcript,
            "Previous Summary: the raw gist\nUser: next question"
        );
        assert!(!transcript.contains("[Conversation Summary]"));
    }

    #[test]
    fn transcript_skips_empty_content() {
        let messages = vec![
            Message::human("  "),
            Message::ai("answer"),
        ];
        assert_eq!(render_transcript(&messages), "Assistant: answer");
    }

    #[test]
    fn marker_indices_filters_by_kind() {
        let messages = vec![
            Message::summary_marker("a", 1),
            Message::human("h"),
            Message::lru_marker("b", 1, 0),
            Message::summary_marker("c", 1),
        ];
        assert_eq!(marker_indices(&messages, MarkerKind::Summary), vec![0, 3]);
        assert_eq!(marker_indices(&messages, MarkerKind::Lru), vec![2]);
    }
}

use skein_core::messages::{Message, Role};

/// Half-open index range of one turn within the slice handed to `segment`.
/// Working with positions instead of message identity keeps insertion points
/// unambiguous when duplicate-content messages exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnSpan {
    pub start: usize,
    pub end: usize,
}

impl TurnSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Partition conversational messages into turns. A turn starts at each
/// human message and runs up to (excluding) the next one. Input is expected
/// to exclude system and marker messages; a leading run of non-human
/// messages is tolerated and emitted as an initial partial turn.
pub fn segment(messages: &[Message]) -> Vec<TurnSpan> {
    segment_roles(messages.iter().map(|m| m.role()), messages.len())
}

/// Same partition over a borrowed view, as strategies hold `Vec<&Message>`
/// filtered out of the full log.
pub fn segment_refs(messages: &[&Message]) -> Vec<TurnSpan> {
    segment_roles(messages.iter().map(|m| m.role()), messages.len())
}

fn segment_roles(roles: impl Iterator<Item = Role>, len: usize) -> Vec<TurnSpan> {
    let mut spans = Vec::new();
    if len == 0 {
        return spans;
    }

    let mut start = 0;
    for (i, role) in roles.enumerate() {
        if role == Role::Human && i > start {
            spans.push(TurnSpan { start, end: i });
            start = i;
        }
    }
    spans.push(TurnSpan { start, end: len });
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(messages: &[Message], span: TurnSpan) -> Vec<Role> {
        messages[span.start..span.end].iter().map(|m| m.role()).collect()
    }

    #[test]
    fn splits_at_human_boundaries() {
        let messages = vec![
            Message::human("h1"),
            Message::ai("a1"),
            Message::human("h2"),
            Message::ai("a2"),
            Message::tool("t2"),
        ];
        let spans = segment(&messages);
        assert_eq!(spans.len(), 2);
        assert_eq!(roles(&messages, spans[0]), vec![Role::Human, Role::Ai]);
        assert_eq!(roles(&messages, spans[1]), vec![Role::Human, Role::Ai, Role::Tool]);
    }

    #[test]
    fn single_turn() {
        let messages = vec![Message::human("h"), Message::ai("a"), Message::ai("b")];
        let spans = segment(&messages);
        assert_eq!(spans, vec![TurnSpan { start: 0, end: 3 }]);
    }

    #[test]
    fn leading_partial_turn_tolerated() {
        let messages = vec![
            Message::ai("orphan"),
            Message::human("h1"),
            Message::ai("a1"),
        ];
        let spans = segment(&messages);
        assert_eq!(spans.len(), 2);
        assert_eq!(roles(&messages, spans[0]), vec![Role::Ai]);
        assert_eq!(roles(&messages, spans[1]), vec![Role::Human, Role::Ai]);
    }

    #[test]
    fn consecutive_humans_each_start_a_turn() {
        let messages = vec![
            Message::human("h1"),
            Message::human("h2"),
            Message::ai("a2"),
        ];
        let spans = segment(&messages);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], TurnSpan { start: 0, end: 1 });
        assert_eq!(spans[1], TurnSpan { start: 1, end: 3 });
    }

    #[test]
    fn empty_input_yields_no_turns() {
        assert!(segment(&[]).is_empty());
    }

    #[test]
    fn never_empty_for_nonempty_input() {
        let messages = vec![Message::tool("only tools")];
        let spans = segment(&messages);
        assert_eq!(spans, vec![TurnSpan { start: 0, end: 1 }]);
    }

    #[test]
    fn order_and_coverage_preserved() {
        let messages = vec![
            Message::human("h1"),
            Message::ai("a1"),
            Message::human("h2"),
            Message::human("h3"),
            Message::tool("t3"),
        ];
        let spans = segment(&messages);
        // Spans tile the input exactly.
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().unwrap().end, messages.len());
        for w in spans.windows(2) {
            assert_eq!(w[0].end, w[1].start);
        }
    }
}

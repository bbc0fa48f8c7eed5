use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single entry in a conversation log. The role tag is fixed at
/// construction; strategies never edit a message in place, they build new
/// ones and new sequences.
///
/// Wire names follow the chat-completions convention (`user`, `assistant`,
/// `system`, `tool`) plus `context` for compaction markers, so restored
/// histories round-trip through serde.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "user")]
    Human(MessageBody),
    #[serde(rename = "assistant")]
    Ai(MessageBody),
    #[serde(rename = "system")]
    System(MessageBody),
    #[serde(rename = "tool")]
    Tool(MessageBody),
    #[serde(rename = "context")]
    Marker(MessageBody),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Default for MessageBody {
    fn default() -> Self {
        Self {
            content: None,
            reasoning: None,
            tool_calls: None,
            refusal: None,
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }
}

/// A tool invocation recorded on an assistant message. `arguments` is the
/// provider's JSON-encoded argument string, kept verbatim.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(rename = "user")]
    Human,
    #[serde(rename = "assistant")]
    Ai,
    System,
    Tool,
    #[serde(rename = "context")]
    Marker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "user",
            Role::Ai => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
            Role::Marker => "context",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" | "human" => Some(Role::Human),
            "assistant" | "ai" => Some(Role::Ai),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            "context" | "marker" => Some(Role::Marker),
            _ => None,
        }
    }
}

/// What a marker records having done to the history before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerKind {
    Truncate,
    Summary,
    Lru,
}

impl MarkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Truncate => "truncate",
            MarkerKind::Summary => "summary",
            MarkerKind::Lru => "lru",
        }
    }

    pub fn parse(s: &str) -> Option<MarkerKind> {
        match s {
            "truncate" => Some(MarkerKind::Truncate),
            "summary" => Some(MarkerKind::Summary),
            "lru" => Some(MarkerKind::Lru),
            _ => None,
        }
    }
}

impl Message {
    pub fn human(text: impl Into<String>) -> Self {
        Message::Human(MessageBody::text(text))
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Message::Ai(MessageBody::text(text))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Message::System(MessageBody::text(text))
    }

    pub fn tool(text: impl Into<String>) -> Self {
        Message::Tool(MessageBody::text(text))
    }

    pub fn from_role(role: Role, text: impl Into<String>) -> Self {
        match role {
            Role::Human => Message::human(text),
            Role::Ai => Message::ai(text),
            Role::System => Message::system(text),
            Role::Tool => Message::tool(text),
            Role::Marker => Message::Marker(MessageBody::text(text)),
        }
    }

    /// Checkpoint recording that everything from the previous summary marker
    /// (or the log start) up to this marker has been condensed into `summary`.
    /// The raw summary lives in metadata; `content` is a decorated rendering
    /// for backends that see the marker as a system message.
    pub fn summary_marker(summary: &str, summarized_count: usize) -> Self {
        let mut metadata = Map::new();
        metadata.insert("type".into(), MarkerKind::Summary.as_str().into());
        metadata.insert("summarized_count".into(), summarized_count.into());
        metadata.insert("summary".into(), summary.into());
        Message::Marker(MessageBody {
            content: Some(format!("[Conversation Summary] {summary}")),
            metadata,
            ..MessageBody::default()
        })
    }

    /// Checkpoint carrying a hot-topic-only recondensation of the span behind
    /// `pruned_from_marker`. The superseded summary marker is kept in the log;
    /// this marker sits right after it.
    pub fn lru_marker(summary: &str, summarized_count: usize, pruned_from_marker: usize) -> Self {
        let mut metadata = Map::new();
        metadata.insert("type".into(), MarkerKind::Lru.as_str().into());
        metadata.insert("summarized_count".into(), summarized_count.into());
        metadata.insert("summary".into(), summary.into());
        metadata.insert("pruned_from_marker".into(), pruned_from_marker.into());
        Message::Marker(MessageBody {
            content: Some(format!("[Pruned Summary] {summary}")),
            metadata,
            ..MessageBody::default()
        })
    }

    pub fn truncate_marker(truncated_count: usize, reason: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("type".into(), MarkerKind::Truncate.as_str().into());
        metadata.insert("truncated_count".into(), truncated_count.into());
        metadata.insert("reason".into(), reason.into());
        Message::Marker(MessageBody {
            content: Some(format!("[Truncated {truncated_count} messages]")),
            metadata,
            ..MessageBody::default()
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Message::Human(_) => Role::Human,
            Message::Ai(_) => Role::Ai,
            Message::System(_) => Role::System,
            Message::Tool(_) => Role::Tool,
            Message::Marker(_) => Role::Marker,
        }
    }

    pub fn body(&self) -> &MessageBody {
        match self {
            Message::Human(b)
            | Message::Ai(b)
            | Message::System(b)
            | Message::Tool(b)
            | Message::Marker(b) => b,
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.body().content.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.body().metadata
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Message::System(_))
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Message::Marker(_))
    }

    /// True for messages that belong to the turn structure: human, ai, tool.
    pub fn is_conversational(&self) -> bool {
        !self.is_system() && !self.is_marker()
    }

    pub fn marker_kind(&self) -> Option<MarkerKind> {
        if !self.is_marker() {
            return None;
        }
        self.metadata()
            .get("type")
            .and_then(Value::as_str)
            .and_then(MarkerKind::parse)
    }

    /// The raw summary text a marker carries, undecorated.
    pub fn marker_summary(&self) -> Option<&str> {
        if !self.is_marker() {
            return None;
        }
        self.metadata().get("summary").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_and_wire_names() {
        let msg = Message::human("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");

        let msg = Message::ai("world");
        assert_eq!(serde_json::to_value(&msg).unwrap()["role"], "assistant");

        let marker = Message::summary_marker("gist", 4);
        assert_eq!(serde_json::to_value(&marker).unwrap()["role"], "context");
    }

    #[test]
    fn summary_marker_metadata() {
        let marker = Message::summary_marker("the gist", 7);
        assert_eq!(marker.marker_kind(), Some(MarkerKind::Summary));
        assert_eq!(marker.marker_summary(), Some("the gist"));
        assert_eq!(
            marker.metadata().get("summarized_count").and_then(Value::as_u64),
            Some(7)
        );
        // Content is decorated, metadata is raw.
        assert_eq!(marker.content(), Some("[Conversation Summary] the gist"));
    }

    #[test]
    fn lru_marker_back_reference() {
        let marker = Message::lru_marker("hot topics only", 12, 9);
        assert_eq!(marker.marker_kind(), Some(MarkerKind::Lru));
        assert_eq!(
            marker.metadata().get("pruned_from_marker").and_then(Value::as_u64),
            Some(9)
        );
    }

    #[test]
    fn conversational_classification() {
        assert!(Message::human("a").is_conversational());
        assert!(Message::ai("b").is_conversational());
        assert!(Message::tool("c").is_conversational());
        assert!(!Message::system("d").is_conversational());
        assert!(!Message::summary_marker("e", 1).is_conversational());
    }

    #[test]
    fn role_parse_aliases() {
        assert_eq!(Role::parse("user"), Some(Role::Human));
        assert_eq!(Role::parse("human"), Some(Role::Human));
        assert_eq!(Role::parse("assistant"), Some(Role::Ai));
        assert_eq!(Role::parse("context"), Some(Role::Marker));
        assert_eq!(Role::parse("nope"), None);
    }

    #[test]
    fn serde_roundtrip_all_variants() {
        let messages = vec![
            Message::human("hi"),
            Message::ai("hello"),
            Message::system("rules"),
            Message::tool("result"),
            Message::summary_marker("gist", 3),
            Message::lru_marker("hot", 5, 2),
            Message::truncate_marker(10, "keep_recent_turns=2"),
        ];
        for msg in &messages {
            let json = serde_json::to_string(msg).unwrap();
            let parsed: Message = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.role(), msg.role());
            assert_eq!(parsed.content(), msg.content());
            assert_eq!(parsed.marker_kind(), msg.marker_kind());
        }
    }

    #[test]
    fn tool_calls_survive_roundtrip() {
        let mut body = MessageBody::text("calling");
        body.tool_calls = Some(vec![ToolCallRecord {
            id: "call_1".into(),
            name: "lookup".into(),
            arguments: r#"{"q":"rust"}"#.into(),
        }]);
        let msg = Message::Ai(body);
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.body().tool_calls.as_ref().unwrap()[0].name, "lookup");
    }

    #[test]
    fn marker_kind_requires_marker_role() {
        let msg = Message::ai("not a marker");
        assert_eq!(msg.marker_kind(), None);
        assert_eq!(msg.marker_summary(), None);
    }
}

use serde_json::{json, Map, Value};

use skein_core::backend::MessageChunk;
use skein_core::errors::BackendError;
use skein_core::messages::{Message, MessageBody, Role, ToolCallRecord};

/// Shape the uniform message list into a chat-completions request body.
/// Marker messages are mapped to `system` defensively; the controller
/// normally converts them before they reach an adapter.
pub fn build_request_body(
    model: &str,
    messages: &[Message],
    stream: bool,
    temperature: Option<f64>,
) -> Value {
    let wire: Vec<Value> = messages.iter().map(message_to_wire).collect();
    let mut body = json!({
        "model": model,
        "messages": wire,
        "stream": stream,
    });
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    body
}

fn message_to_wire(message: &Message) -> Value {
    let role = match message.role() {
        Role::Human => "user",
        Role::Ai => "assistant",
        Role::System | Role::Marker => "system",
        Role::Tool => "tool",
    };
    let mut wire = json!({
        "role": role,
        "content": message.content().unwrap_or(""),
    });
    if let Some(calls) = &message.body().tool_calls {
        wire["tool_calls"] = Value::Array(
            calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {"name": c.name, "arguments": c.arguments},
                    })
                })
                .collect(),
        );
    }
    wire
}

/// Convert a non-streaming chat-completions response into an `ai` message.
/// Provider identity, model, usage counters, and finish reason land in
/// metadata.
pub fn reply_from_response(provider: &str, body: &Value) -> Result<Message, BackendError> {
    let choice = body["choices"]
        .get(0)
        .ok_or_else(|| BackendError::MalformedResponse {
            provider: provider.to_string(),
            detail: "response has no choices".to_string(),
        })?;
    let wire = &choice["message"];

    let mut metadata = Map::new();
    metadata.insert("provider".into(), provider.into());
    if let Some(model) = body["model"].as_str() {
        metadata.insert("model".into(), model.into());
    }
    if body["usage"].is_object() {
        metadata.insert("usage".into(), body["usage"].clone());
    }
    if let Some(reason) = choice["finish_reason"].as_str() {
        metadata.insert("finish_reason".into(), reason.into());
    }

    let tool_calls = wire["tool_calls"].as_array().map(|calls| {
        calls
            .iter()
            .map(|c| ToolCallRecord {
                id: c["id"].as_str().unwrap_or("").to_string(),
                name: c["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: c["function"]["arguments"].as_str().unwrap_or("").to_string(),
            })
            .collect::<Vec<_>>()
    });

    Ok(Message::Ai(MessageBody {
        content: wire["content"].as_str().map(ToOwned::to_owned),
        reasoning: wire["reasoning_content"].as_str().map(ToOwned::to_owned),
        tool_calls,
        refusal: wire["refusal"].as_str().map(ToOwned::to_owned),
        metadata,
        ..MessageBody::default()
    }))
}

/// Convert one streamed chat-completions chunk. Returns None for chunks that
/// carry neither content nor a finish reason (role announcements, usage-only
/// frames).
pub fn chunk_from_json(body: &Value) -> Option<MessageChunk> {
    let choice = body["choices"].get(0)?;
    let content = choice["delta"]["content"].as_str().unwrap_or("");
    let is_final = !choice["finish_reason"].is_null();
    if content.is_empty() && !is_final {
        return None;
    }
    Some(MessageChunk {
        content: content.to_string(),
        is_final,
        final_message: None,
    })
}

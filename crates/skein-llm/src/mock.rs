use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use serde_json::Map;

use skein_core::backend::{ChatBackend, ChunkStream, MessageChunk};
use skein_core::errors::BackendError;
use skein_core::messages::{Message, MessageBody};

/// Pre-programmed replies for deterministic testing without API calls.
pub enum MockReply {
    Message(Message),
    Error(BackendError),
    Chunks(Vec<MessageChunk>),
}

impl MockReply {
    /// An `ai` reply with mock provenance metadata, the way a real adapter
    /// would tag it.
    pub fn text(text: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("provider".into(), "mock".into());
        metadata.insert("model".into(), "mock-model".into());
        Self::Message(Message::Ai(MessageBody {
            content: Some(text.to_string()),
            metadata,
            ..MessageBody::default()
        }))
    }

    /// A reply streamed as one chunk per word plus a final frame.
    pub fn streamed_text(text: &str) -> Self {
        let mut chunks: Vec<MessageChunk> = text
            .split_inclusive(' ')
            .map(|word| MessageChunk {
                content: word.to_string(),
                is_final: false,
                final_message: None,
            })
            .collect();
        chunks.push(MessageChunk {
            content: String::new(),
            is_final: true,
            final_message: None,
        });
        Self::Chunks(chunks)
    }
}

/// Scripted backend that replays replies in order and records every request
/// it sees.
#[derive(Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockBackend {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every message list this backend has been handed, in call order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, request: &[Message]) -> Result<MockReply, BackendError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.to_vec());
            requests.len()
        };
        self.replies.lock().unwrap().pop_front().ok_or_else(|| {
            BackendError::InvalidRequest(format!("MockBackend: no reply configured for call {call}"))
        })
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, messages: &[Message]) -> Result<Message, BackendError> {
        match self.next_reply(messages)? {
            MockReply::Message(message) => Ok(message),
            MockReply::Error(error) => Err(error),
            MockReply::Chunks(chunks) => {
                let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
                Ok(Message::ai(text))
            }
        }
    }

    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream, BackendError> {
        match self.next_reply(messages)? {
            MockReply::Chunks(chunks) => {
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
            }
            MockReply::Message(message) => {
                let content = message.content().unwrap_or("").to_string();
                let chunks = vec![
                    Ok(MessageChunk {
                        content,
                        is_final: false,
                        final_message: None,
                    }),
                    Ok(MessageChunk {
                        content: String::new(),
                        is_final: true,
                        final_message: Some(message),
                    }),
                ];
                Ok(Box::pin(stream::iter(chunks)))
            }
            MockReply::Error(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn replays_replies_in_order() {
        let mock = MockBackend::new(vec![MockReply::text("first"), MockReply::text("second")]);
        let first = mock.complete(&[Message::human("a")]).await.unwrap();
        let second = mock.complete(&[Message::human("b")]).await.unwrap();
        assert_eq!(first.content(), Some("first"));
        assert_eq!(second.content(), Some("second"));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn records_requests() {
        let mock = MockBackend::new(vec![MockReply::text("r")]);
        mock.complete(&[Message::system("s"), Message::human("q")])
            .await
            .unwrap();
        let requests = mock.requests();
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[0][1].content(), Some("q"));
    }

    #[tokio::test]
    async fn exhausted_replies_error() {
        let mock = MockBackend::new(vec![]);
        let err = mock.complete(&[Message::human("q")]).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn streamed_text_reassembles() {
        let mock = MockBackend::new(vec![MockReply::streamed_text("hello streaming world")]);
        let mut stream = mock.stream(&[Message::human("q")]).await.unwrap();

        let mut content = String::new();
        let mut saw_final = false;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            content.push_str(&chunk.content);
            saw_final |= chunk.is_final;
        }
        assert_eq!(content, "hello streaming world");
        assert!(saw_final);
    }

    #[tokio::test]
    async fn error_reply_from_stream_call() {
        let mock = MockBackend::new(vec![MockReply::Error(BackendError::Overloaded)]);
        let err = mock.stream(&[Message::human("q")]).await.err().unwrap();
        assert!(matches!(err, BackendError::Overloaded));
    }
}

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::messages::Message;

/// One increment of a streamed reply. The terminal chunk sets `is_final` and
/// may carry the assembled message when the backend provides one.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageChunk {
    pub content: String,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_message: Option<Message>,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, BackendError>> + Send>>;

/// A remote chat backend. Implementations shape the uniform message list
/// into provider JSON and back; they never see `marker`-role messages (the
/// controller converts those to `system` first).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[Message]) -> Result<Message, BackendError>;

    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream, BackendError>;
}

/// Condenses a role-labeled transcript under a given instruction. Callers
/// treat an empty successful response as a failure, never as "nothing to
/// summarize".
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, instruction: &str, transcript: &str)
        -> Result<String, BackendError>;
}

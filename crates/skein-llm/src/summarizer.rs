use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use skein_core::backend::{ChatBackend, Summarizer};
use skein_core::errors::{BackendError, ConfigError};
use skein_core::uri::ModelUri;

use crate::registry;

/// Low temperature keeps summaries stable across retries.
const SUMMARY_TEMPERATURE: f64 = 0.2;

/// Summarizer backed by a remote chat model: the instruction travels as the
/// system message, the transcript as a single human message.
pub struct RemoteSummarizer {
    backend: Arc<dyn ChatBackend>,
}

impl RemoteSummarizer {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Resolve a backend from the model URI. Unless the URI pins its own
    /// temperature, summaries run at a fixed low one.
    pub fn from_uri(uri: &str, api_key: &str) -> Result<Self, ConfigError> {
        let parsed = ModelUri::parse(uri)?;
        let mut backend = registry::backend_for(&parsed, api_key)?;
        if backend.temperature().is_none() {
            backend = backend.with_temperature(SUMMARY_TEMPERATURE);
        }
        Ok(Self::new(Arc::new(backend)))
    }
}

#[async_trait]
impl Summarizer for RemoteSummarizer {
    async fn summarize(
        &self,
        instruction: &str,
        transcript: &str,
    ) -> Result<String, BackendError> {
        use skein_core::messages::Message;

        let messages = [Message::system(instruction), Message::human(transcript)];
        let reply = self.backend.complete(&messages).await?;
        let text = reply.content().unwrap_or("").trim().to_string();
        if text.is_empty() {
            return Err(BackendError::EmptyResponse(self.backend.name().to_string()));
        }
        debug!(chars = text.len(), "summary generated");
        Ok(text)
    }
}

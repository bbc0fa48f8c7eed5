use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, instrument};

use skein_core::backend::{ChatBackend, ChunkStream, MessageChunk};
use skein_core::errors::BackendError;
use skein_core::messages::Message;

use crate::converter;
use crate::sse::{SseEvent, SseFramer};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter for chat-completions-style HTTP APIs. Most hosted providers
/// (OpenAI, DeepSeek, Moonshot, Zhipu, SiliconFlow, xAI, local Ollama and
/// vLLM) expose this shape; only the base URL differs.
pub struct OpenAiCompatBackend {
    client: Client,
    provider: String,
    model: String,
    base_url: String,
    api_key: SecretString,
    temperature: Option<f64>,
}

impl OpenAiCompatBackend {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            provider: provider.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key: SecretString::from(api_key.into()),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn post(&self, body: Value) -> Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .post(self.endpoint())
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, messages), fields(provider = %self.provider, model = %self.model))]
    async fn complete(&self, messages: &[Message]) -> Result<Message, BackendError> {
        let body =
            converter::build_request_body(&self.model, messages, false, self.temperature);
        debug!(message_count = messages.len(), "sending completion request");

        let response = self.post(body).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse {
                provider: self.provider.clone(),
                detail: e.to_string(),
            })?;
        converter::reply_from_response(&self.provider, &json)
    }

    #[instrument(skip(self, messages), fields(provider = %self.provider, model = %self.model))]
    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream, BackendError> {
        let body = converter::build_request_body(&self.model, messages, true, self.temperature);
        debug!(message_count = messages.len(), "opening completion stream");

        let response = self.post(body).await?;
        let provider = self.provider.clone();
        let mut framer = SseFramer::new();

        let stream = response
            .bytes_stream()
            .map(move |item| match item {
                Ok(bytes) => framer
                    .push(&bytes)
                    .into_iter()
                    .filter_map(|event| match event {
                        SseEvent::Done => Some(Ok(MessageChunk {
                            content: String::new(),
                            is_final: true,
                            final_message: None,
                        })),
                        SseEvent::Data(payload) => {
                            match serde_json::from_str::<Value>(&payload) {
                                Ok(json) => converter::chunk_from_json(&json).map(Ok),
                                Err(e) => Some(Err(BackendError::MalformedResponse {
                                    provider: provider.clone(),
                                    detail: e.to_string(),
                                })),
                            }
                        }
                    })
                    .collect::<Vec<_>>(),
                Err(e) => vec![Err(BackendError::StreamInterrupted(e.to_string()))],
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_normalizes_trailing_slash() {
        let backend =
            OpenAiCompatBackend::new("openai", "gpt-4o", "https://api.openai.com/v1/", "k");
        assert_eq!(backend.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn identity_accessors() {
        let backend = OpenAiCompatBackend::new("deepseek", "deepseek-chat", "https://x", "k")
            .with_temperature(0.2);
        assert_eq!(backend.name(), "deepseek");
        assert_eq!(backend.model(), "deepseek-chat");
        assert_eq!(backend.temperature(), Some(0.2));
    }
}

use std::sync::Arc;

use skein_core::backend::ChatBackend;
use skein_core::errors::ConfigError;
use skein_core::uri::ModelUri;

use crate::openai::OpenAiCompatBackend;

/// Default base URLs for known chat-completions providers. A URI may always
/// override with an explicit base URL; an unknown provider without one is a
/// configuration error.
pub const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1"),
    ("deepseek", "https://api.deepseek.com"),
    ("moonshot", "https://api.moonshot.cn/v1"),
    ("zhipu", "https://open.bigmodel.cn/api/paas/v4"),
    ("siliconflow", "https://api.siliconflow.cn/v1"),
    ("mistral", "https://api.mistral.ai/v1"),
    ("xai", "https://api.x.ai/v1"),
    ("ollama", "http://localhost:11434/v1"),
    ("vllm", "http://localhost:8000/v1"),
];

pub fn default_base_url(provider: &str) -> Option<&'static str> {
    KNOWN_PROVIDERS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, url)| *url)
}

/// Build a backend from a parsed model URI. Recognized URI params:
/// `temperature`.
pub fn backend_for(uri: &ModelUri, api_key: &str) -> Result<OpenAiCompatBackend, ConfigError> {
    if api_key.is_empty() {
        return Err(ConfigError::MissingField("api_key"));
    }
    let base_url = match &uri.base_url {
        Some(explicit) => explicit.clone(),
        None => default_base_url(&uri.provider)
            .ok_or_else(|| ConfigError::UnknownProvider(uri.provider.clone()))?
            .to_string(),
    };

    let mut backend =
        OpenAiCompatBackend::new(uri.provider.clone(), uri.model.clone(), base_url, api_key);
    if let Some(t) = uri.param("temperature").and_then(|v| v.parse::<f64>().ok()) {
        backend = backend.with_temperature(t);
    }
    Ok(backend)
}

/// Parse a model URI string and connect the matching backend.
pub fn connect(uri: &str, api_key: &str) -> Result<Arc<dyn ChatBackend>, ConfigError> {
    let parsed = ModelUri::parse(uri)?;
    Ok(Arc::new(backend_for(&parsed, api_key)?))
}

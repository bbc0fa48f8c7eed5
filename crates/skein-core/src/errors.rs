use std::time::Duration;

/// Construction-time failures. A strategy or backend with insufficient or
/// contradictory parameters refuses to build; nothing fails late at process
/// time for a reason that was knowable up front.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one of keep_recent_turns or max_input_tokens must be set")]
    MissingLimit,
    #[error("max_input_tokens must be positive")]
    NonPositiveBudget,
    #[error("summarize_threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid model URI `{uri}`: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("unknown provider `{0}` and no base_url given")]
    UnknownProvider(String),
}

/// A context strategy could not complete its contract for this turn. The
/// message log is left untouched when one of these surfaces; retrying the
/// turn is safe.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("summarizer returned empty content")]
    EmptySummary,
    #[error("nothing to summarize: transcript rendered empty")]
    EmptyTranscript,
    #[error("summarizer call failed")]
    Summarizer(#[source] BackendError),
}

/// Typed failures from a remote model backend. Classified as fatal (don't
/// retry), retryable, or operational, mirroring how callers should react.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    // Fatal
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("malformed response from {provider}: {detail}")]
    MalformedResponse { provider: String, detail: String },
    #[error("empty response from {0}")]
    EmptyResponse(String),

    // Retryable
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("provider overloaded")]
    Overloaded,
    #[error("network error: {0}")]
    Network(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::Overloaded
                | Self::Network(_)
                | Self::StreamInterrupted(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::InvalidRequest(_)
                | Self::MalformedResponse { .. }
                | Self::EmptyResponse(_)
        )
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::EmptyResponse(_) => "empty_response",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::Overloaded => "overloaded",
            Self::Network(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Classify an HTTP status code into the matching variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 => Self::InvalidRequest(body),
            429 => Self::RateLimited { retry_after: None },
            529 => Self::Overloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

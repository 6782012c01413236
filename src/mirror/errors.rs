use thiserror::Error;

/// Failures talking to the page mirror. These never abort a save; the sync
/// engine turns them into warnings.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror rejected credentials: {0}")]
    Auth(String),
    #[error("mirror rate limit exceeded")]
    RateLimited,
    #[error("mirror object not found: {0}")]
    NotFound(String),
    #[error("mirror API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("mirror network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected mirror response: {0}")]
    InvalidResponse(String),
    #[error("invalid mirror request: {0}")]
    InvalidRequest(String),
}

impl MirrorError {
    /// Classify a non-success HTTP response
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| value.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());

        match status {
            401 | 403 => MirrorError::Auth(message),
            404 => MirrorError::NotFound(message),
            429 => MirrorError::RateLimited,
            400 => MirrorError::InvalidRequest(message),
            _ => MirrorError::Api { status, message },
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            MirrorError::RateLimited | MirrorError::Network(_) => true,
            MirrorError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

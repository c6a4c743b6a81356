use reqwest::StatusCode;
use thiserror::Error;

/// Per-item fetch failures. Only transport-level failures are worth
/// retrying; a rejection or a body we cannot read will not improve on a
/// second attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote rejected request with status {status}")]
    Rejected { status: StatusCode },
    #[error("malformed response body: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

/// Database write failure for a single item. Logged and tallied; never
/// aborts sibling items.
#[derive(Debug, Error)]
#[error("persistence failed: {0}")]
pub struct PersistError(#[from] pub sqlx::Error);

/// Startup configuration problems. Fatal: a run must not start without a
/// valid database and API configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment value: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_retryable() {
        assert!(FetchError::Transport("connection reset".into()).is_retryable());
        assert!(!FetchError::Rejected {
            status: StatusCode::INTERNAL_SERVER_ERROR
        }
        .is_retryable());
        assert!(!FetchError::Malformed("expected object".into()).is_retryable());
    }
}

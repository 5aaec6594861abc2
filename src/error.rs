//! Error taxonomy for the pipeline. Per-item failures degrade that item
//! only; the run itself errors solely on configuration problems.

use thiserror::Error;

/// Why a fetch of one source (or one of its fallback URLs) failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("http status {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("feed parse error: {0}")]
    Parse(String),
}

/// Rewrite-service failures carry a retryable/non-retryable classification
/// consumed by the retry policy.
#[derive(Debug, Error)]
pub enum RewriteServiceError {
    #[error("rewrite service timeout")]
    Timeout,
    #[error("rewrite service http status {0}")]
    Status(u16),
    #[error("rewrite service returned unusable output: {0}")]
    BadOutput(String),
}

impl RewriteServiceError {
    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Status(code) => *code >= 500 || *code == 429,
            Self::BadOutput(_) => false,
        }
    }
}

/// Content-store failures surface in the run summary as `failed`; the write
/// is idempotent so the next run re-attempts safely.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(RewriteServiceError::Timeout.retryable());
        assert!(RewriteServiceError::Status(503).retryable());
        assert!(RewriteServiceError::Status(429).retryable());
        assert!(!RewriteServiceError::Status(400).retryable());
        assert!(!RewriteServiceError::BadOutput("empty".into()).retryable());
    }
}

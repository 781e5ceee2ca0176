//! Error types for the caching engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the caching engine
#[derive(Error, Debug)]
pub enum Error {
    /// No canonical record exists for the key. Not cached unless
    /// negative caching is enabled.
    #[error("no record found for key: {0}")]
    NotFound(String),

    /// The loader itself failed. Propagated to every stampede waiter;
    /// the ticket is discarded so the next call retries immediately.
    #[error("loader failed for key {key}: {reason}")]
    LoadError { key: String, reason: String },

    /// The shared tier is unreachable. Reads degrade to local-only or
    /// direct loader calls rather than surfacing this to callers.
    #[error("shared tier unavailable: {0}")]
    TierUnavailable(String),

    /// Some keys in a tag sweep could not be fully evicted. Safe to
    /// retry just the listed keys.
    #[error("tag sweep for {tag:?} left {} key(s) unevicted: {keys:?}", keys.len())]
    EvictionPartialFailure { tag: String, keys: Vec<String> },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True if the error only signals shared-tier degradation and
    /// should be absorbed rather than returned to a reader.
    pub fn is_degradation(&self) -> bool {
        matches!(self, Error::TierUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("item:9".into());
        assert_eq!(err.to_string(), "no record found for key: item:9");

        let err = Error::EvictionPartialFailure {
            tag: "items".into(),
            keys: vec!["item:1".into(), "item:2".into()],
        };
        assert!(err.to_string().contains("2 key(s)"));
    }

    #[test]
    fn test_degradation_classification() {
        assert!(Error::TierUnavailable("redis down".into()).is_degradation());
        assert!(!Error::NotFound("k".into()).is_degradation());
        assert!(!Error::LoadError {
            key: "k".into(),
            reason: "boom".into()
        }
        .is_degradation());
    }
}

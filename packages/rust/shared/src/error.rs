//! Error types for pagekit.
//!
//! Library crates use [`PagekitError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pagekit operations.
#[derive(Debug, thiserror::Error)]
pub enum PagekitError {
    /// Configuration loading or validation error. Fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of a specific provider (downloads, client setup).
    #[error("network error: {0}")]
    Network(String),

    /// A stock provider call failed (transport, auth, rate limit, bad body).
    #[error("provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    /// Asset cache error that is not a plain filesystem failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Generative image model error.
    #[error("generation error: {0}")]
    Generation(String),

    /// The run's external-call cap was reached before this call.
    #[error("external call budget exhausted")]
    BudgetExhausted,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed tree, invalid MIME type, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagekitError>;

impl PagekitError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a provider error tagged with the provider's name.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for PagekitError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PagekitError::config("missing UNSPLASH_ACCESS_KEY");
        assert_eq!(err.to_string(), "config error: missing UNSPLASH_ACCESS_KEY");

        let err = PagekitError::provider("pexels", "HTTP 429 Too Many Requests");
        assert_eq!(
            err.to_string(),
            "provider pexels failed: HTTP 429 Too Many Requests"
        );
    }

    #[test]
    fn io_error_keeps_path() {
        let err = PagekitError::io(
            "/tmp/cache/index.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("index.json"));
        assert!(err.to_string().contains("denied"));
    }
}

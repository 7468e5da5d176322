use std::path::PathBuf;

/// Result type alias for bkctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for bkctl operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or contradictory request configuration, reported before any task starts
    #[error("{message}")]
    Usage { message: String },

    /// Malformed serialized definition or operation
    #[error("{message}: {detail}")]
    Parse {
        message: String,
        detail: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failure returned by the build engine, passed through verbatim
    #[error("{message}")]
    Engine { message: String },

    /// A progress sink (display, trace file, logger) stopped accepting events
    #[error("progress sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The invocation was cancelled before it finished
    #[error("build canceled")]
    Canceled,

    /// Invariant violations inside bkctl itself
    #[error("internal error: {message}")]
    Internal { message: String },
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create a usage error
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Error::Usage {
            message: message.into(),
        }
    }

    /// Create a parse error wrapping the underlying decoder failure
    #[must_use]
    pub fn parse(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let source = source.into();
        Error::Parse {
            message: message.into(),
            detail: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a parse error without an underlying source
    #[must_use]
    pub fn parse_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Parse {
            message: message.into(),
            detail: detail.into(),
            source: None,
        }
    }

    /// Create an engine error
    #[must_use]
    pub fn engine(message: impl Into<String>) -> Self {
        Error::Engine {
            message: message.into(),
        }
    }

    /// Create a sink error
    #[must_use]
    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Sink {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Whether this error only reports that the invocation was cancelled
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}

// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Wrap the error as a usage error prefixed with `message`
    fn usage_context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn usage_context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Usage {
            message: format!("{}: {}", message.into(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_keeps_message_and_source() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::parse("failed to parse input", source);

        assert!(err.to_string().starts_with("failed to parse input: "));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_usage_context_prefixes_message() {
        let result: std::result::Result<(), &str> = Err("missing '='");
        let err = result.usage_context("invalid opt").unwrap_err();

        assert!(matches!(err, Error::Usage { .. }));
        assert_eq!(err.to_string(), "invalid opt: missing '='");
    }

    #[test]
    fn test_canceled_is_recognised() {
        assert!(Error::Canceled.is_canceled());
        assert!(!Error::engine("boom").is_canceled());
    }
}

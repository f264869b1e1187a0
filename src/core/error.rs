//! Error types.
//!
//! Most caller misuse (writing to a read-only store, fetching without a key,
//! setting the empty key) is deliberately not an error: those calls are
//! logged and ignored so handler chains keep running. The variants below are
//! the conditions that do reach the caller.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ArborResult<T> = Result<T, ArborError>;

/// Errors surfaced by store, resolver and fetch operations.
#[derive(Debug, Clone, Error)]
pub enum ArborError {
    /// Alias resolution exceeded the hop bound or looped back onto itself.
    #[error("reference cycle while resolving '{key}' (gave up after {hops} hops)")]
    ReferenceCycle { key: String, hops: usize },

    /// The transport failed after all retries were exhausted.
    #[error("transport error for '{key}': {source}")]
    Transport {
        key: String,
        #[source]
        source: TransportError,
    },

    /// A fetch was issued for a key that has no source URL.
    #[error("no source url for '{key}'")]
    MissingUrl { key: String },

    /// The load for a key was cancelled through `abort`.
    #[error("fetch for '{key}' was aborted")]
    Aborted { key: String },

    /// Fetch surface used on a store built without `fetchable`.
    #[error("store is not fetchable")]
    NotFetchable,

    /// `trigger` named an action that was never registered.
    #[error("unknown action '{name}'")]
    UnknownAction { name: String },

    /// An action returned an error of its own.
    #[error("action '{name}' failed: {message}")]
    ActionFailed { name: String, message: String },

    /// A value could not be converted to or from JSON.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Internal error (a spawned task panicked, a lock was poisoned).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ArborError {
    /// Create a ReferenceCycle error.
    pub fn reference_cycle(key: impl Into<String>, hops: usize) -> Self {
        Self::ReferenceCycle {
            key: key.into(),
            hops,
        }
    }

    /// Create a Transport error for a key.
    pub fn transport(key: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            key: key.into(),
            source,
        }
    }

    /// Create an ActionFailed error.
    pub fn action_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ActionFailed {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if this error is a cancellation.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

impl From<serde_json::Error> for ArborError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

/// Failure reported by an [`HttpTransport`](crate::fetch::transport::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within the timeout.
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The server answered with a non-success status.
    #[error("unexpected status {status}")]
    Status { status: u16 },

    /// The connection could not be established or was reset.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// The response body could not be read.
    #[error("invalid response body: {message}")]
    Body { message: String },
}

impl TransportError {
    /// Create a Connect error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Check if a retry may succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx are retriable; other
    /// statuses and malformed bodies are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connect { .. } => true,
            Self::Status { status } => *status == 429 || *status >= 500,
            Self::Body { .. } => false,
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }
}

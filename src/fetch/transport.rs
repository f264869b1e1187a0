//! HTTP transport contract.
//!
//! The engine never speaks HTTP itself. It hands an [`HttpRequest`] to an
//! [`HttpTransport`] and applies its own timeout and retry policy around
//! each call, so implementations only need to perform a single GET.

use crate::core::error::TransportError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// A single GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Per-attempt timeout the engine will enforce. Informational for
    /// transports that can pass it down to the socket layer.
    pub timeout: Duration,
}

/// A response as seen by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Add a header; the name is lowercased.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs GET requests for the fetch engine.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one request. Non-2xx statuses may be returned as responses;
    /// the engine classifies them.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport used when none is configured: every request fails to connect.
#[derive(Debug, Default)]
pub struct UnconfiguredTransport;

#[async_trait]
impl HttpTransport for UnconfiguredTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        Err(TransportError::connect(format!(
            "no transport configured for {}",
            request.url
        )))
    }
}

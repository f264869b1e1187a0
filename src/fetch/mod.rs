//! Remote values with HTTP freshness semantics.
//!
//! - [`transport`] - The HTTP collaborator
//! - [`freshness`] - Metadata, header parsing and classification
//! - [`inflight`] - Abortable load tracking
//! - [`engine`] - `fetch` itself

pub mod engine;
pub mod freshness;
pub mod inflight;
pub mod transport;

pub use engine::{FetchEngine, FetchRequest, FetchResponse, FRESHNESS_ROOT};
pub use freshness::{CacheControl, FreshnessMetadata, FreshnessState};
pub use transport::{HttpRequest, HttpResponse, HttpTransport};

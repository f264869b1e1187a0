//! Freshness-aware fetch.
//!
//! `fetch` classifies the cached value and then either serves it, serves it
//! and revalidates in the background, or waits for a load:
//!
//! ```text
//!   Fresh               ──► cached value, no request
//!   StaleRevalidatable  ──► cached value, background load (failures logged)
//!   StaleErrorTolerant ─┐
//!   Expired            ─┼─► load; on failure fall back per reject_on_error
//!   Missing            ─┘
//! ```
//!
//! Loads run as spawned tasks registered in [`InflightLoads`], and persist
//! their result through the store's regular `set` path so handlers see it.

use crate::core::config::FetchConfig;
use crate::core::error::{ArborError, ArborResult, TransportError};
use crate::core::time::Clock;
use crate::fetch::freshness::{self, CacheControl, FreshnessMetadata, FreshnessState};
use crate::fetch::inflight::{next_load_id, InflightLoads};
use crate::fetch::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::handlers::context::{FetchOptions, Operation, SetEntry};
use crate::store::{Store, StoreEvent};
use crate::tree::{Key, Node};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Root key under which freshness metadata is stored.
pub const FRESHNESS_ROOT: &str = "__freshness__";

/// Status reported when a fetch has no source URL.
pub const MISSING_URL_STATUS: u16 = 400;

/// Key holding the freshness metadata for `key`.
pub fn metadata_key(key: &Key) -> Key {
    Key::from_segments([FRESHNESS_ROOT.to_string(), key.to_string()])
}

/// One entry of a batch fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub key: String,
    pub url: Option<String>,
    pub options: FetchOptions,
}

impl FetchRequest {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: Some(url.into()),
            options: FetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }
}

/// Outcome of a fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Resolved key the value lives at.
    pub key: String,
    /// The value served to the caller, aliases expanded.
    pub body: Value,
    /// Status of the load; 200 when served from cache, 0 when no request
    /// was made because a handler vetoed the fetch.
    pub status: u16,
    /// Response headers of the load; empty when served from cache.
    pub headers: BTreeMap<String, String>,
    /// Time spent waiting on the transport.
    pub duration: Duration,
    /// Cache-control windows as they stand now, if the value has metadata.
    pub cache_control: Option<CacheControl>,
    /// Freshness of `body`.
    pub state: FreshnessState,
    /// Load failure that was tolerated.
    pub error: Option<ArborError>,
}

impl FetchResponse {
    fn cached(key: &Key, body: Value, state: FreshnessState, cache_control: Option<CacheControl>) -> Self {
        Self {
            key: key.to_string(),
            body,
            status: 200,
            headers: BTreeMap::new(),
            duration: Duration::ZERO,
            cache_control,
            state,
            error: None,
        }
    }

    pub(crate) fn skipped(key: &Key, body: Value, state: FreshnessState) -> Self {
        Self {
            status: 0,
            cache_control: None,
            ..Self::cached(key, body, state, None)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Decode a response body as JSON, keeping it as a string when it is not.
pub fn decode_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Fetch engine shared by a store and its load tasks.
pub struct FetchEngine {
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    config: FetchConfig,
    inflight: InflightLoads,
}

impl FetchEngine {
    pub fn new(transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>, config: FetchConfig) -> Self {
        Self {
            transport,
            clock,
            config,
            inflight: InflightLoads::new(),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn inflight(&self) -> &InflightLoads {
        &self.inflight
    }

    /// Serve `key`, loading from `url` as its freshness requires.
    pub(crate) async fn fetch(
        self: &Arc<Self>,
        store: &Store,
        key: &Key,
        url: Option<String>,
        options: FetchOptions,
    ) -> ArborResult<FetchResponse> {
        let key = store.resolve_key(key)?;
        if options.abort_previous.unwrap_or(false) {
            self.inflight.abort_key(&key);
        }

        let now = self.clock.now();
        let (state, metadata) = self.classify(store, &key);
        let body = store.get(&key)?;
        let remaining = metadata.map(|m| m.remaining_at(now));

        match state {
            FreshnessState::Fresh => {
                return Ok(FetchResponse::cached(&key, body, state, remaining));
            }
            FreshnessState::StaleRevalidatable => {
                match url {
                    Some(url) => {
                        debug!(key = %key, "serving stale value, revalidating");
                        drop(self.spawn_load(store.clone(), key.clone(), url, options, true));
                    }
                    None => debug!(key = %key, "stale value has no url to revalidate from"),
                }
                return Ok(FetchResponse::cached(&key, body, state, remaining));
            }
            _ => {}
        }

        let Some(url) = url else {
            debug!(key = %key, "fetch without url");
            return Ok(FetchResponse {
                status: MISSING_URL_STATUS,
                error: Some(ArborError::MissingUrl {
                    key: key.to_string(),
                }),
                ..FetchResponse::cached(&key, body, state, remaining)
            });
        };

        let reject_on_error = options.reject_on_error.unwrap_or(false);
        let write = options.write;
        match self.spawn_load(store.clone(), key.clone(), url, options, false).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => match state {
                FreshnessState::Missing => Err(ArborError::transport(key.to_string(), err)),
                FreshnessState::Expired if reject_on_error => {
                    debug!(key = %key, error = %err, "clearing expired value after failed load");
                    store.apply(Operation::Set {
                        key: key.clone(),
                        value: Node::Null,
                        options: write,
                        batch: vec![SetEntry {
                            key: metadata_key(&key),
                            value: Node::Null,
                        }],
                    });
                    Err(ArborError::transport(key.to_string(), err))
                }
                _ => Ok(FetchResponse {
                    status: err.status().unwrap_or(0),
                    error: Some(ArborError::transport(key.to_string(), err)),
                    ..FetchResponse::cached(&key, body, state, remaining)
                }),
            },
            Err(join) if join.is_cancelled() => Err(ArborError::Aborted {
                key: key.to_string(),
            }),
            Err(join) => Err(ArborError::internal(join.to_string())),
        }
    }

    /// Current freshness of `key`.
    pub(crate) fn state_of(&self, store: &Store, key: &Key) -> FreshnessState {
        let key = store.resolve_key(key).unwrap_or_else(|_| key.clone());
        self.classify(store, &key).0
    }

    fn classify(&self, store: &Store, key: &Key) -> (FreshnessState, Option<FreshnessMetadata>) {
        let value = store.read_raw(key);
        let metadata = store
            .read_raw(&metadata_key(key))
            .and_then(|node| FreshnessMetadata::from_node(&node));
        let state = freshness::classify(value.as_ref(), metadata.as_ref(), self.clock.now());
        (state, metadata)
    }

    fn spawn_load(
        self: &Arc<Self>,
        store: Store,
        key: Key,
        url: String,
        options: FetchOptions,
        background: bool,
    ) -> JoinHandle<Result<FetchResponse, TransportError>> {
        let id = next_load_id();
        let engine = Arc::clone(self);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = engine.load(&store, &task_key, url, options).await;
            engine.inflight.complete(&task_key, id);
            if background {
                if let Err(err) = &result {
                    warn!(key = %task_key, error = %err, "background revalidation failed");
                }
            }
            result
        });

        self.inflight.register(key.clone(), id, handle.abort_handle());
        if handle.is_finished() {
            self.inflight.complete(&key, id);
        }
        handle
    }

    async fn load(
        &self,
        store: &Store,
        key: &Key,
        url: String,
        options: FetchOptions,
    ) -> Result<FetchResponse, TransportError> {
        let started = Instant::now();
        let request = HttpRequest {
            url,
            headers: options.headers.clone(),
            timeout: options.timeout.unwrap_or_else(|| self.config.timeout()),
        };
        let retries = options.retries.unwrap_or(self.config.retries);
        let response = self.get_with_retry(key, request, retries).await?;
        let duration = started.elapsed();

        let now = self.clock.now();
        let metadata = freshness::compute(&response, now, &self.config);
        let body = decode_body(&response.body);

        store.apply(Operation::Set {
            key: key.clone(),
            value: Node::from(body.clone()),
            options: options.write,
            batch: vec![SetEntry {
                key: metadata_key(key),
                value: metadata.to_node(),
            }],
        });
        store.emit(StoreEvent::Fetched {
            key: key.to_string(),
            status: response.status,
        });

        Ok(FetchResponse {
            key: key.to_string(),
            body,
            status: response.status,
            headers: response.headers,
            duration,
            cache_control: Some(metadata.remaining_at(now)),
            state: metadata.state_at(now),
            error: None,
        })
    }

    async fn get_with_retry(
        &self,
        key: &Key,
        request: HttpRequest,
        retries: u32,
    ) -> Result<HttpResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            let err = match tokio::time::timeout(request.timeout, self.transport.get(request.clone())).await {
                Ok(Ok(response)) if response.is_success() => return Ok(response),
                Ok(Ok(response)) => TransportError::Status {
                    status: response.status,
                },
                Ok(Err(err)) => err,
                Err(_) => TransportError::Timeout {
                    after_ms: saturating_millis(request.timeout),
                },
            };

            if attempt >= retries || !err.is_retriable() {
                return Err(err);
            }
            attempt += 1;
            debug!(key = %key, attempt, error = %err, "retrying load");
            tokio::time::sleep(self.config.retry_backoff() * attempt).await;
        }
    }
}

impl std::fmt::Debug for FetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchEngine")
            .field("config", &self.config)
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_decodes_json_or_string() {
        assert_eq!(decode_body(r#"{"a": [1]}"#), json!({"a": [1]}));
        assert_eq!(decode_body("plain text"), json!("plain text"));
        assert_eq!(decode_body("42"), json!(42));
    }

    #[test]
    fn timeout_millis_saturate() {
        assert_eq!(saturating_millis(Duration::from_millis(50)), 50);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn metadata_key_is_single_segment_under_root() {
        let key = metadata_key(&Key::parse("a/b"));
        assert_eq!(key.segments(), &["__freshness__".to_string(), "a/b".to_string()]);
    }
}

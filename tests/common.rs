//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use arbor::core::config::{CacheControlConfig, FetchConfig, StoreConfig};
use arbor::core::error::TransportError;
use arbor::core::time::{ManualClock, Timestamp};
use arbor::fetch::transport::{HttpRequest, HttpResponse, HttpTransport};
use arbor::Store;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Start time for manual clocks in tests.
pub const T0: Timestamp = Timestamp::from_secs(1_700_000_000);

/// What the scripted transport answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(HttpResponse),
    Err(TransportError),
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(body: Value, cache_control: &str) -> Self {
        let mut response = HttpResponse::new(200, body.to_string());
        if !cache_control.is_empty() {
            response = response.with_header("Cache-Control", cache_control);
        }
        Reply::Ok(response)
    }

    pub fn status(status: u16) -> Self {
        Reply::Ok(HttpResponse::new(status, ""))
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }
}

/// Transport answering from per-url scripts.
///
/// One-shot replies queued with `push` are used first, then the persistent
/// reply set with `respond`. Unknown urls fail to connect.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    persistent: Mutex<HashMap<String, Reply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, reply: Reply) {
        self.persistent.lock().insert(url.to_string(), reply);
    }

    pub fn push(&self, url: &str, reply: Reply) {
        self.queued
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.url == url).count()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().last().cloned()
    }

    fn next_reply(&self, url: &str) -> Reply {
        if let Some(reply) = self.queued.lock().get_mut(url).and_then(VecDeque::pop_front) {
            return reply;
        }
        self.persistent
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Reply::Err(TransportError::connect(format!("no route to {}", url))))
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let mut reply = self.next_reply(&request.url);
        loop {
            match reply {
                Reply::Ok(response) => return Ok(response),
                Reply::Err(err) => return Err(err),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}

/// Fetch config with zero floors, no retries and short backoff.
pub fn fetch_config() -> FetchConfig {
    FetchConfig {
        retries: 0,
        timeout_ms: 2_000,
        retry_backoff_ms: 1,
        min_expiry_ms: 1_000,
        cache_control: CacheControlConfig {
            max_age_secs: 0,
            stale_while_revalidate_secs: 0,
            stale_if_error_secs: 0,
        },
    }
}

/// A fetchable store over a scripted transport and a manual clock.
pub fn fetch_store() -> (Store, Arc<ScriptedTransport>, ManualClock) {
    let transport = ScriptedTransport::new();
    let clock = ManualClock::new(T0);
    let store = Store::builder()
        .config(StoreConfig {
            fetch: fetch_config(),
            ..StoreConfig::default()
        })
        .fetchable(true)
        .transport(transport.clone())
        .clock(Arc::new(clock.clone()))
        .build();
    (store, transport, clock)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Write a config file.
pub fn create_config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

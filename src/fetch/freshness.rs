//! Freshness metadata and classification.
//!
//! A fetched value moves through states as time passes its expiry:
//!
//! ```text
//!   expires_at          + stale_while_revalidate     + stale_if_error
//!  ─────┼──────────────────────┼────────────────────────────┼──────────►
//!  Fresh │ StaleRevalidatable   │ StaleErrorTolerant         │ Expired
//! ```
//!
//! A value that was written without metadata is `Expired`; a null or absent
//! value is `Missing`.

use crate::core::config::FetchConfig;
use crate::core::time::Timestamp;
use crate::fetch::transport::HttpResponse;
use crate::tree::Node;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// Per-key freshness state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessState {
    /// No value.
    Missing,
    /// Within max-age.
    Fresh,
    /// Past max-age, within stale-while-revalidate.
    StaleRevalidatable,
    /// Past stale-while-revalidate, within stale-if-error.
    StaleErrorTolerant,
    /// Past every window, or never fetched.
    Expired,
}

impl FreshnessState {
    /// Check if a fetch in this state must wait for a load.
    pub fn needs_load(&self) -> bool {
        matches!(
            self,
            Self::Missing | Self::Expired | Self::StaleErrorTolerant
        )
    }
}

/// Cache-control windows, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    pub max_age: u64,
    pub stale_while_revalidate: u64,
    pub stale_if_error: u64,
}

/// Stored next to every fetched value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessMetadata {
    pub expires_at: Timestamp,
    pub cache_control: CacheControl,
}

impl FreshnessMetadata {
    /// Read metadata back from its tree form.
    pub fn from_node(node: &Node) -> Option<Self> {
        serde_json::from_value(node.to_raw_json()).ok()
    }

    pub fn to_node(&self) -> Node {
        serde_json::to_value(self)
            .map(Node::from)
            .unwrap_or(Node::Null)
    }

    pub fn state_at(&self, now: Timestamp) -> FreshnessState {
        let expires = self.expires_at;
        if now.is_before(expires) {
            FreshnessState::Fresh
        } else if now.is_before(expires.add_secs(self.cache_control.stale_while_revalidate)) {
            FreshnessState::StaleRevalidatable
        } else if now.is_before(expires.add_secs(self.cache_control.stale_if_error)) {
            FreshnessState::StaleErrorTolerant
        } else {
            FreshnessState::Expired
        }
    }

    /// Windows as they stand at `now`: `max_age` is the time left before
    /// expiry.
    pub fn remaining_at(&self, now: Timestamp) -> CacheControl {
        CacheControl {
            max_age: now.ms_until(self.expires_at) / 1000,
            ..self.cache_control
        }
    }
}

/// Classify a value and its metadata at `now`.
pub fn classify(
    value: Option<&Node>,
    metadata: Option<&FreshnessMetadata>,
    now: Timestamp,
) -> FreshnessState {
    match (value, metadata) {
        (None, _) | (Some(Node::Null), _) => FreshnessState::Missing,
        (Some(_), None) => FreshnessState::Expired,
        (Some(_), Some(meta)) => meta.state_at(now),
    }
}

/// Parsed `Cache-Control` response directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directives {
    pub max_age: Option<u64>,
    pub s_maxage: Option<u64>,
    pub stale_while_revalidate: Option<u64>,
    pub stale_if_error: Option<u64>,
    pub no_store: bool,
    pub no_cache: bool,
}

impl Directives {
    /// Parse a `Cache-Control` header value. Unknown and malformed
    /// directives are skipped.
    pub fn parse(header: &str) -> Self {
        let mut directives = Self::default();
        for part in header.split(',') {
            let part = part.trim();
            let (name, value) = match part.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
                None => (part, None),
            };
            let seconds = value.and_then(|v| v.parse::<u64>().ok());
            match name.to_ascii_lowercase().as_str() {
                "max-age" => directives.max_age = seconds,
                "s-maxage" => directives.s_maxage = seconds,
                "stale-while-revalidate" => directives.stale_while_revalidate = seconds,
                "stale-if-error" => directives.stale_if_error = seconds,
                "no-store" => directives.no_store = true,
                "no-cache" => directives.no_cache = true,
                _ => {}
            }
        }
        directives
    }

    /// Freshness lifetime: `s-maxage` over `max-age`, zero for `no-store`
    /// and `no-cache`.
    pub fn lifetime(&self) -> u64 {
        if self.no_store || self.no_cache {
            return 0;
        }
        self.s_maxage.or(self.max_age).unwrap_or(0)
    }
}

/// Parse an HTTP `Date` header.
pub fn parse_http_date(value: &str) -> Option<Timestamp> {
    let parsed = DateTime::parse_from_rfc2822(value.trim()).ok()?;
    u64::try_from(parsed.timestamp_millis())
        .ok()
        .map(Timestamp::from_millis)
}

/// Compute metadata for a response received at `now`.
///
/// Each window is raised to at least its configured floor. An expiry that
/// already lies in the past is moved to `now + min_expiry_ms`.
pub fn compute(response: &HttpResponse, now: Timestamp, config: &FetchConfig) -> FreshnessMetadata {
    let directives = response
        .header("cache-control")
        .map(Directives::parse)
        .unwrap_or_default();
    let floors = &config.cache_control;

    let cache_control = CacheControl {
        max_age: directives.lifetime().max(floors.max_age_secs),
        stale_while_revalidate: directives
            .stale_while_revalidate
            .unwrap_or(0)
            .max(floors.stale_while_revalidate_secs),
        stale_if_error: directives
            .stale_if_error
            .unwrap_or(0)
            .max(floors.stale_if_error_secs),
    };

    let base = response
        .header("date")
        .and_then(parse_http_date)
        .unwrap_or(now);
    let age = response
        .header("age")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let mut expires_at = base
        .add_secs(cache_control.max_age)
        .sub_ms(age.saturating_mul(1000));
    if expires_at.is_before(now) {
        expires_at = now.add_ms(config.min_expiry_ms);
    }

    FreshnessMetadata {
        expires_at,
        cache_control,
    }
}

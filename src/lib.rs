//! Arbor - hierarchical keyed data store with references, cursors, handler
//! middleware and freshness-aware remote fetch.
//!
//! Data lives in one nested tree addressed by `/`-separated keys. A key can
//! be aliased to another, so reads and writes through the alias land on the
//! target. Cursors give scoped views of subtrees. Every mutating call passes
//! through a synchronous handler pipeline that can observe, rewrite or veto
//! it. Fetch-capable stores additionally serve values from an HTTP source
//! with max-age, stale-while-revalidate and stale-if-error semantics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Store  /  Cursor (prefix-scoped)                │
//! │   get │ set │ reset │ reference │ dump │ trigger │ fetch │ abort  │
//! └─────────────────────────────────────────────────────────────────┘
//!                │                                    │
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │       Handler Pipeline       │   │    Fetch/Freshness Engine    │
//! │ matchers │ context │ veto    │◄──│ classify │ load │ retry │ abort│
//! └──────────────────────────────┘   └──────────────────────────────┘
//!                │                                    │
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │      Reference Resolver      │   │        HttpTransport         │
//! │   alias walk │ hop bound     │   │   (async trait, pluggable)   │
//! └──────────────────────────────┘   └──────────────────────────────┘
//!                │
//! ┌──────────────────────────────┐
//! │   Data Tree / Path Accessor  │
//! │  Node │ Key │ merge │ CoW    │
//! └──────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types
//! - [`core::time`] - Clock abstraction for freshness decisions
//! - [`core::telemetry`] - Tracing subscriber setup
//!
//! ## Tree
//! - [`tree::key`] - Keys
//! - [`tree::node`] - Values and aliases
//! - [`tree::accessor`] - Path reads and writes
//!
//! ## References
//! - [`refs::resolver`] - Alias resolution and expansion
//!
//! ## Handlers
//! - [`handlers::matcher`] - Key matchers
//! - [`handlers::context`] - Operations and handler context
//! - [`handlers::pipeline`] - Registry and dispatch
//!
//! ## Store
//! - [`store::store`] - The store and its builder
//! - [`store::cursor`] - Cursors
//! - [`store::actions`] - Actions
//! - [`store::events`] - Events
//! - [`store::export`] - Export and serialisability
//!
//! ## Fetch
//! - [`fetch::engine`] - Fetch, batch fetch
//! - [`fetch::freshness`] - Cache-control metadata
//! - [`fetch::inflight`] - Load tracking and abort
//! - [`fetch::transport`] - HTTP collaborator
//!
//! # Key Invariants
//!
//! - Internal keys never carry a leading separator; cursor prefixes always do
//! - An alias never resolves to itself; resolution is bounded by
//!   `max_alias_hops`
//! - The tree is only mutated through the handler pipeline
//! - Destroying a store aborts its loads and invalidates its cursors
//!
//! # Example
//!
//! ```
//! use arbor::Store;
//! use serde_json::json;
//!
//! let store = Store::new();
//! store.set("foo/bar", json!({"bat": true}));
//! store.set("stuff", store.reference("foo/bar"));
//! assert_eq!(store.get("stuff/bat").unwrap(), json!(true));
//! ```

// Core infrastructure
pub mod core;

// Data tree
pub mod tree;

// References
pub mod refs;

// Handler pipeline
pub mod handlers;

// Store surfaces
pub mod store;

// Remote fetch
pub mod fetch;

// Re-exports for convenience
pub use self::core::config::{FetchConfig, StoreConfig};
pub use self::core::error::{ArborError, ArborResult, TransportError};
pub use self::core::time::{Clock, ManualClock, SystemClock, Timestamp};
pub use fetch::{
    CacheControl, FetchRequest, FetchResponse, FreshnessState, HttpRequest, HttpResponse,
    HttpTransport,
};
pub use handlers::{
    handler, FetchOptions, Handler, HandlerContext, Matcher, Method, Operation, WriteOptions,
};
pub use refs::Reference;
pub use store::{Cursor, GetOptions, Store, StoreBuilder, StoreEvent};
pub use tree::{Key, Node};

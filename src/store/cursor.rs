//! Cursors: views of a store rooted at a key.
//!
//! A cursor holds its absolute prefix and a weak link to the store. Every
//! call prepends the prefix and forwards to the store, so writes through a
//! cursor are visible to the store and to every other cursor at once. Once
//! the store is destroyed, reads return null and writes are ignored.

use crate::core::error::{ArborError, ArborResult};
use crate::fetch::engine::FetchResponse;
use crate::handlers::context::{FetchOptions, WriteOptions};
use crate::handlers::matcher::Matcher;
use crate::handlers::pipeline::Handler;
use crate::refs::{Address, IntoAddress, Reference};
use crate::store::store::{GetOptions, Store, StoreInner};
use crate::tree::{Key, Node};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::debug;

struct CursorInner {
    prefix: Key,
    store: Weak<StoreInner>,
}

/// A scoped view of a [`Store`].
#[derive(Clone)]
pub struct Cursor {
    inner: Arc<CursorInner>,
}

impl Cursor {
    pub(crate) fn new(prefix: Key, store: Weak<StoreInner>) -> Self {
        Self {
            inner: Arc::new(CursorInner { prefix, store }),
        }
    }

    /// A cursor bound to no store.
    pub(crate) fn detached(prefix: Key) -> Self {
        Self::new(prefix, Weak::new())
    }

    /// Prefix without the leading separator.
    pub fn key(&self) -> String {
        self.inner.prefix.to_string()
    }

    /// Prefix with the leading separator, e.g. `/app/state`.
    pub fn prefix(&self) -> String {
        self.inner.prefix.to_absolute()
    }

    pub fn prefix_key(&self) -> &Key {
        &self.inner.prefix
    }

    /// The owning store, unless it has been dropped or destroyed.
    pub fn store(&self) -> Option<Store> {
        self.inner
            .store
            .upgrade()
            .map(Store::from_inner)
            .filter(|store| !store.is_destroyed())
    }

    pub fn is_valid(&self) -> bool {
        self.store().is_some()
    }

    /// Check if two handles are the same cursor.
    pub fn ptr_eq(a: &Cursor, b: &Cursor) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    fn address(&self, key: impl IntoAddress) -> Address {
        key.into_address().under(&self.inner.prefix)
    }

    fn with_store<R>(&self, op: &str, default: R, f: impl FnOnce(&Store) -> R) -> R {
        match self.store() {
            Some(store) => f(&store),
            None => {
                debug!(prefix = %self.prefix(), op, "cursor is detached");
                default
            }
        }
    }

    pub fn get(&self, key: impl IntoAddress) -> ArborResult<Value> {
        let address = self.address(key);
        self.with_store("get", Ok(Value::Null), |store| store.get(address))
    }

    pub fn get_with(&self, key: impl IntoAddress, options: GetOptions) -> ArborResult<Node> {
        let address = self.address(key);
        self.with_store("get", Ok(Node::Null), |store| store.get_with(address, options))
    }

    pub fn set(&self, key: impl IntoAddress, value: impl Into<Node>) {
        self.set_with(key, value, WriteOptions::default());
    }

    pub fn set_with(&self, key: impl IntoAddress, value: impl Into<Node>, options: WriteOptions) {
        let address = self.address(key);
        let value = value.into();
        self.with_store("set", (), |store| store.set_with(address, value, options));
    }

    pub fn set_all<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: IntoAddress,
        V: Into<Node>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Reference to `key` beneath this cursor.
    pub fn reference(&self, key: impl Into<Key>) -> Reference {
        Reference::new(self.inner.prefix.join(&key.into()))
    }

    /// Replace the subtree at this cursor.
    pub fn reset(&self, data: impl Into<Node>) {
        let data = data.into();
        let prefix = self.inner.prefix.clone();
        self.with_store("reset", (), |store| {
            if prefix.is_root() {
                store.reset(data);
            } else {
                store.set(prefix, data);
            }
        });
    }

    /// Cursor at `key` beneath this one.
    pub fn create_cursor(&self, key: impl IntoAddress) -> Cursor {
        let address = self.address(key);
        match self.store() {
            Some(store) => store.create_cursor(address),
            None => Cursor::detached(address.key().clone()),
        }
    }

    pub async fn fetch(
        &self,
        key: impl IntoAddress,
        url: Option<&str>,
        options: FetchOptions,
    ) -> ArborResult<FetchResponse> {
        let address = self.address(key);
        let store = self.store().ok_or(ArborError::NotFetchable)?;
        store.fetch(address, url, options).await
    }

    /// Cancel loads for `key` beneath this cursor, or for the whole subtree
    /// when `None`.
    pub fn abort(&self, key: Option<&str>) -> usize {
        let prefix = self.inner.prefix.clone();
        self.with_store("abort", 0, |store| match key {
            Some(key) => store.abort(Some(&prefix.join(&Key::parse(key)).to_string())),
            None => store.abort_prefix(&prefix),
        })
    }

    /// Register a handler for keys beneath this cursor. `matcher` is
    /// relative to the cursor.
    pub fn use_handler(&self, matcher: Matcher, handler: Handler) {
        let matcher = matcher.scoped(&self.inner.prefix);
        self.with_store("use_handler", (), |store| store.use_handler(matcher, handler));
    }

    pub fn unuse_handler(&self, handler: &Handler) -> usize {
        self.with_store("unuse_handler", 0, |store| store.unuse_handler(handler))
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("prefix", &self.prefix())
            .field("valid", &self.is_valid())
            .finish()
    }
}

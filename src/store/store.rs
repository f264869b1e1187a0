//! The store.
//!
//! [`Store`] is a cheap, cloneable handle. All clones and all cursors share
//! one tree. Mutating calls go through the handler pipeline, then resolve
//! their key through aliases and write through the path accessor while
//! holding the tree lock.

use crate::core::config::StoreConfig;
use crate::core::error::{ArborError, ArborResult};
use crate::core::time::{Clock, SystemClock};
use crate::fetch::engine::{FetchEngine, FetchRequest, FetchResponse};
use crate::fetch::freshness::FreshnessState;
use crate::fetch::transport::{HttpTransport, UnconfiguredTransport};
use crate::handlers::context::{FetchOptions, Method, Operation, WriteOptions};
use crate::handlers::matcher::Matcher;
use crate::handlers::pipeline::{Handler, Pipeline};
use crate::refs::{IntoAddress, Reference, Resolver};
use crate::store::actions::{async_action, sync_action, Action, ActionRegistry};
use crate::store::cursor::Cursor;
use crate::store::events::{EventBus, StoreEvent};
use crate::store::export::{self, Serialisability};
use crate::tree::{accessor, Key, Node};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Options for [`Store::get_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    /// Expand aliases in the result. When false the node is returned as
    /// stored, alias markers included.
    pub resolve_references: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            resolve_references: true,
        }
    }
}

impl GetOptions {
    pub fn raw() -> Self {
        Self {
            resolve_references: false,
        }
    }
}

pub(crate) struct State {
    tree: Arc<Node>,
    serialisability: Serialisability,
    cursors: HashMap<Key, Cursor>,
}

pub(crate) struct StoreInner {
    id: u64,
    config: StoreConfig,
    resolver: Resolver,
    state: Mutex<State>,
    pipeline: Pipeline,
    actions: ActionRegistry,
    events: EventBus,
    engine: Option<Arc<FetchEngine>>,
    destroyed: AtomicBool,
}

/// Hierarchical data store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Builds a [`Store`].
pub struct StoreBuilder {
    config: StoreConfig,
    handlers: Vec<(Matcher, Handler)>,
    actions: Vec<(String, Action)>,
    transport: Option<Arc<dyn HttpTransport>>,
    clock: Option<Arc<dyn Clock>>,
    data: Option<Node>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
            handlers: Vec::new(),
            actions: Vec::new(),
            transport: None,
            clock: None,
            data: None,
        }
    }

    /// Replace the whole configuration. Later builder calls still apply.
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.config.writable = writable;
        self
    }

    pub fn fetchable(mut self, fetchable: bool) -> Self {
        self.config.fetchable = fetchable;
        self
    }

    pub fn immutable(mut self, immutable: bool) -> Self {
        self.config.immutable = immutable;
        self
    }

    /// Initial serialisability entries, merged over the configuration's.
    pub fn serialisable_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        self.config
            .serialisable_keys
            .extend(keys.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn handler(mut self, matcher: Matcher, handler: Handler) -> Self {
        self.handlers.push((matcher, handler));
        self
    }

    pub fn action<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Store, Vec<Value>) -> ArborResult<Value> + Send + Sync + 'static,
    {
        self.actions.push((name.into(), sync_action(f)));
        self
    }

    pub fn async_action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Store, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ArborResult<Value>> + Send + 'static,
    {
        self.actions.push((name.into(), async_action(f)));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Initial tree contents.
    pub fn data(mut self, data: impl Into<Node>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn build(self) -> Store {
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        let config = self.config;

        let mut serialisability = Serialisability::new();
        for (key, serialisable) in &config.serialisable_keys {
            serialisability.set(Key::parse(key), *serialisable);
        }

        let pipeline = Pipeline::new();
        pipeline.handle(Method::Set);
        pipeline.handle(Method::Reset);

        let engine = if config.fetchable {
            pipeline.handle(Method::Fetch);
            let transport = self
                .transport
                .unwrap_or_else(|| Arc::new(UnconfiguredTransport));
            let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
            Some(Arc::new(FetchEngine::new(transport, clock, config.fetch.clone())))
        } else {
            None
        };
        pipeline.use_handlers(self.handlers);

        let actions = ActionRegistry::new();
        for (name, action) in self.actions {
            actions.register(name, action);
        }

        let tree = match self.data {
            Some(Node::Null) | None => Node::object(),
            Some(data) => data,
        };

        info!(
            store = id,
            writable = config.writable,
            fetchable = config.fetchable,
            "store built"
        );

        Store {
            inner: Arc::new(StoreInner {
                id,
                resolver: Resolver::new(config.max_alias_hops.max(1)),
                config,
                state: Mutex::new(State {
                    tree: Arc::new(tree),
                    serialisability,
                    cursors: HashMap::new(),
                }),
                pipeline,
                actions,
                events: EventBus::new(),
                engine,
                destroyed: AtomicBool::new(false),
            }),
        }
    }
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// A writable, non-fetchable store with default configuration.
    pub fn new() -> Self {
        StoreBuilder::new().build()
    }

    pub(crate) fn from_inner(inner: Arc<StoreInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    /// Process-unique store id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn is_writable(&self) -> bool {
        self.inner.config.writable
    }

    pub fn is_fetchable(&self) -> bool {
        self.inner.engine.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read the value at `key`, aliases expanded. Absent keys read as null.
    pub fn get(&self, key: impl IntoAddress) -> ArborResult<Value> {
        let address = key.into_address();
        let state = self.inner.state.lock();
        let resolver = &self.inner.resolver;
        let resolved = resolver.resolve(&state.tree, &address)?;
        match accessor::get(&state.tree, &resolved) {
            Some(node) => resolver.expand(&state.tree, node),
            None => Ok(Value::Null),
        }
    }

    /// Read the node at `key`.
    ///
    /// With `resolve_references: false`, aliases along the path are still
    /// followed but the node at `key` itself is returned as stored.
    pub fn get_with(&self, key: impl IntoAddress, options: GetOptions) -> ArborResult<Node> {
        if options.resolve_references {
            return self.get(key).map(Node::from);
        }

        let address = key.into_address();
        let state = self.inner.state.lock();
        let key = address.key();
        let Some(last) = key.segments().last() else {
            return Ok((*state.tree).clone());
        };
        let parent = key.truncated(key.len() - 1);
        let parent = self.inner.resolver.resolve_key(&state.tree, &parent)?;
        Ok(accessor::get(&state.tree, &parent)
            .and_then(|node| node.child(last))
            .cloned()
            .unwrap_or(Node::Null))
    }

    /// Read several keys, in order.
    pub fn get_all<I, K>(&self, keys: I) -> ArborResult<Vec<Value>>
    where
        I: IntoIterator<Item = K>,
        K: IntoAddress,
    {
        keys.into_iter().map(|key| self.get(key)).collect()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub fn set(&self, key: impl IntoAddress, value: impl Into<Node>) {
        self.set_with(key, value, WriteOptions::default());
    }

    /// Write `value` at `key`. Ignored on read-only or destroyed stores and
    /// for the empty key.
    pub fn set_with(&self, key: impl IntoAddress, value: impl Into<Node>, options: WriteOptions) {
        let key = key.into_address().key().clone();
        if key.is_root() {
            debug!(store = self.inner.id, "set with empty key ignored");
            return;
        }
        self.apply(Operation::Set {
            key,
            value: value.into(),
            options,
            batch: Vec::new(),
        });
    }

    /// Write several key/value pairs, in order, each through the pipeline.
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

    /// Write several key/value/options triples, in order.
    pub fn set_entries<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V, WriteOptions)>,
        K: IntoAddress,
        V: Into<Node>,
    {
        for (key, value, options) in entries {
            self.set_with(key, value, options);
        }
    }

    /// Replace the whole tree.
    pub fn reset(&self, data: impl Into<Node>) {
        self.apply(Operation::Reset { data: data.into() });
    }

    /// Run an operation through the pipeline and execute it.
    ///
    /// Returns false when the store refused it or a handler vetoed it.
    pub(crate) fn apply(&self, operation: Operation) -> bool {
        if self.is_destroyed() {
            debug!(store = self.inner.id, method = %operation.method(), "store destroyed, operation ignored");
            return false;
        }
        if !self.inner.config.writable {
            warn!(store = self.inner.id, method = %operation.method(), "store is not writable, operation ignored");
            return false;
        }
        self.inner
            .pipeline
            .run(operation, |operation| self.execute(operation))
            .is_some()
    }

    fn execute(&self, operation: Operation) {
        let mut changed = Vec::new();
        match operation {
            Operation::Set {
                key,
                value,
                options,
                batch,
            } => {
                let mode = options.access_mode(self.inner.config.immutable);
                let mut state = self.inner.state.lock();
                let writes = std::iter::once((key, value))
                    .chain(batch.into_iter().map(|entry| (entry.key, entry.value)));
                for (key, value) in writes {
                    let target = match self.inner.resolver.resolve_key(&state.tree, &key) {
                        Ok(target) => target,
                        Err(err) => {
                            warn!(key = %key, error = %err, "write skipped");
                            continue;
                        }
                    };
                    if target.is_root() {
                        debug!(key = %key, "write to root ignored");
                        continue;
                    }

                    if let Node::Alias(alias_target) = &value {
                        match self.inner.resolver.resolve_key(&state.tree, alias_target) {
                            Ok(resolved) if resolved.starts_with(&target) => {
                                warn!(key = %target, alias = %alias_target, "alias would resolve onto itself, write skipped");
                                continue;
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!(key = %target, alias = %alias_target, error = %err, "alias target unresolvable, write skipped");
                                continue;
                            }
                        }
                    }

                    if accessor::set_in(&mut state.tree, &target, value, mode) {
                        changed.push(target);
                    } else {
                        debug!(key = %target, "write left tree unchanged");
                    }
                }
            }
            Operation::Reset { data } => {
                let data = if data.is_null() { Node::object() } else { data };
                self.inner.state.lock().tree = Arc::new(data);
                self.emit(StoreEvent::Reset);
            }
            Operation::Fetch { key, .. } => {
                debug!(key = %key, "fetch is not executed by the write path");
            }
        }

        for key in changed {
            self.emit(StoreEvent::Changed {
                key: key.to_string(),
            });
        }
    }

    // ========================================================================
    // References
    // ========================================================================

    /// A reference to `key`, storable with `set`.
    pub fn reference(&self, key: impl Into<Key>) -> Reference {
        Reference::new(key)
    }

    pub fn references<I, K>(&self, keys: I) -> Vec<Reference>
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        keys.into_iter().map(Reference::new).collect()
    }

    /// Target of an alias node, as text.
    pub fn unreference(&self, node: &Node) -> Option<String> {
        node.as_alias().map(Key::to_string)
    }

    pub fn unreferences<'a, I>(&self, nodes: I) -> Vec<Option<String>>
    where
        I: IntoIterator<Item = &'a Node>,
    {
        nodes.into_iter().map(|n| self.unreference(n)).collect()
    }

    pub(crate) fn resolve_key(&self, key: &Key) -> ArborResult<Key> {
        let state = self.inner.state.lock();
        self.inner.resolver.resolve_key(&state.tree, key)
    }

    /// Stored node at an already resolved key.
    pub(crate) fn read_raw(&self, key: &Key) -> Option<Node> {
        let state = self.inner.state.lock();
        accessor::get(&state.tree, key).cloned()
    }

    // ========================================================================
    // Cursors
    // ========================================================================

    /// Cursor rooted at `key`. Cursors are cached by resolved prefix, so
    /// asking twice for the same location returns the same cursor.
    pub fn create_cursor(&self, key: impl IntoAddress) -> Cursor {
        let address = key.into_address();
        let mut state = self.inner.state.lock();
        let prefix = match self.inner.resolver.resolve(&state.tree, &address) {
            Ok(prefix) => prefix,
            Err(err) => {
                warn!(key = %address.key(), error = %err, "cursor prefix not resolvable");
                address.key().clone()
            }
        };
        if self.is_destroyed() {
            return Cursor::detached(prefix);
        }
        state
            .cursors
            .entry(prefix.clone())
            .or_insert_with(|| Cursor::new(prefix, self.downgrade()))
            .clone()
    }

    // ========================================================================
    // Serialisation
    // ========================================================================

    pub fn set_serialisability_of_key(&self, key: impl Into<Key>, serialisable: bool) {
        let key = key.into();
        if key.is_root() {
            debug!("serialisability of the root cannot be changed");
            return;
        }
        self.inner.state.lock().serialisability.set(key, serialisable);
    }

    pub fn set_serialisability_of_keys<I, K>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<Key>,
    {
        for (key, serialisable) in entries {
            self.set_serialisability_of_key(key, serialisable);
        }
    }

    pub fn is_serialisable(&self, key: impl Into<Key>) -> bool {
        self.inner.state.lock().serialisability.is_serialisable(&key.into())
    }

    /// Plain data with every alias expanded.
    pub fn dump(&self) -> ArborResult<Value> {
        let state = self.inner.state.lock();
        export::dump(&state.tree, &self.inner.resolver)
    }

    /// JSON text honouring the serialisability map; empty on failure.
    pub fn dump_json(&self) -> String {
        let state = self.inner.state.lock();
        export::dump_json(&state.tree, &self.inner.resolver, &state.serialisability)
    }

    /// Raw tree for host serialisation: aliases intact, excluded keys
    /// omitted.
    pub fn export_raw(&self) -> Node {
        let state = self.inner.state.lock();
        export::export_raw(&state.tree, &state.serialisability)
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    pub fn use_handler(&self, matcher: Matcher, handler: Handler) {
        self.inner.pipeline.use_handler(matcher, handler);
    }

    pub fn use_handlers<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (Matcher, Handler)>,
    {
        self.inner.pipeline.use_handlers(entries);
    }

    /// Remove every registration of `handler`. Returns how many were removed.
    pub fn unuse_handler(&self, handler: &Handler) -> usize {
        self.inner.pipeline.unuse_handler(handler)
    }

    pub fn unuse_handlers(&self, handlers: &[Handler]) -> usize {
        self.inner.pipeline.unuse_handlers(handlers)
    }

    pub fn handler_count(&self) -> usize {
        self.inner.pipeline.len()
    }

    // ========================================================================
    // Actions
    // ========================================================================

    pub fn register_action<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&Store, Vec<Value>) -> ArborResult<Value> + Send + Sync + 'static,
    {
        self.inner.actions.register(name, sync_action(f));
    }

    pub fn register_async_action<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Store, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ArborResult<Value>> + Send + 'static,
    {
        self.inner.actions.register(name, async_action(f));
    }

    /// Invoke a registered action.
    pub async fn trigger(&self, name: &str, args: Vec<Value>) -> ArborResult<Value> {
        self.inner.actions.call(self.clone(), name, args).await
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Serve `key` from cache or load it from `url`, per its freshness.
    pub async fn fetch(
        &self,
        key: impl IntoAddress,
        url: Option<&str>,
        options: FetchOptions,
    ) -> ArborResult<FetchResponse> {
        let key = key.into_address().key().clone();
        let url = url.map(str::to_string);
        let engine = match &self.inner.engine {
            Some(engine) if !self.is_destroyed() => Arc::clone(engine),
            _ => return Err(ArborError::NotFetchable),
        };

        if key.is_root() {
            debug!(store = self.inner.id, "fetch without key ignored");
            return Ok(FetchResponse::skipped(&key, Value::Null, FreshnessState::Missing));
        }

        let requested = key.clone();
        let operation = Operation::Fetch { key, url, options };
        let Some(operation) = self.inner.pipeline.dispatch(operation) else {
            debug!(key = %requested, "fetch vetoed");
            let body = self.get(&requested)?;
            let state = engine.state_of(self, &requested);
            return Ok(FetchResponse::skipped(&requested, body, state));
        };
        match operation {
            Operation::Fetch { key, url, options } => engine.fetch(self, &key, url, options).await,
            other => Err(ArborError::internal(format!(
                "handler turned fetch into {}",
                other.method()
            ))),
        }
    }

    /// Fetch every request concurrently. One failure never affects the
    /// others; outcomes come back in request order.
    pub async fn fetch_all(&self, requests: Vec<FetchRequest>) -> Vec<ArborResult<FetchResponse>> {
        let tasks: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let store = self.clone();
                tokio::spawn(async move {
                    store
                        .fetch(request.key.as_str(), request.url.as_deref(), request.options)
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            outcomes.push(match task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(ArborError::internal(err.to_string())),
            });
        }
        outcomes
    }

    /// Cancel in-flight loads for `key`, or every load when `None`.
    ///
    /// Returns the number of loads cancelled.
    pub fn abort(&self, key: Option<&str>) -> usize {
        let Some(engine) = &self.inner.engine else {
            return 0;
        };
        match key {
            Some(key) => {
                let key = Key::parse(key);
                let resolved = self.resolve_key(&key).unwrap_or(key);
                engine.inflight().abort_key(&resolved)
            }
            None => engine.inflight().abort_all(),
        }
    }

    pub(crate) fn abort_prefix(&self, prefix: &Key) -> usize {
        self.inner
            .engine
            .as_ref()
            .map(|engine| engine.inflight().abort_prefix(prefix))
            .unwrap_or(0)
    }

    /// Number of loads still running.
    pub fn inflight_count(&self) -> usize {
        self.inner
            .engine
            .as_ref()
            .map(|engine| engine.inflight().len())
            .unwrap_or(0)
    }

    // ========================================================================
    // Events and lifecycle
    // ========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: StoreEvent) {
        self.inner.events.emit(event);
    }

    /// Tear the store down: abort loads, drop handlers, actions, cursors
    /// and data. Every later call is a no-op.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let aborted = self.abort(None);
        self.inner.pipeline.clear();
        self.inner.actions.clear();
        {
            let mut state = self.inner.state.lock();
            state.tree = Arc::new(Node::object());
            state.cursors.clear();
            state.serialisability = Serialisability::new();
        }
        self.emit(StoreEvent::Destroyed);
        info!(store = self.inner.id, aborted, "store destroyed");
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("writable", &self.inner.config.writable)
            .field("fetchable", &self.is_fetchable())
            .field("destroyed", &self.is_destroyed())
            .field("pipeline", &self.inner.pipeline)
            .finish()
    }
}

//! Operations and the context handlers receive.
//!
//! Each handled call is captured as an [`Operation`]. Handlers see it through
//! a [`HandlerContext`], may rewrite it, and may veto it. After the handlers
//! run, the (possibly rewritten) operation is what executes.

use crate::tree::{AccessMode, Key, Node};
use std::collections::BTreeMap;
use std::time::Duration;

/// Methods that pass through the handler pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Set,
    Reset,
    Fetch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Set => "set",
            Method::Reset => "reset",
            Method::Fetch => "fetch",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-write options. `None` falls back to the store default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub merge: Option<bool>,
    pub immutable: Option<bool>,
}

impl WriteOptions {
    pub fn merge() -> Self {
        Self {
            merge: Some(true),
            immutable: None,
        }
    }

    pub fn immutable() -> Self {
        Self {
            merge: None,
            immutable: Some(true),
        }
    }

    /// Overlay `other`: fields it sets win.
    pub fn merge_with(&mut self, other: &WriteOptions) {
        if other.merge.is_some() {
            self.merge = other.merge;
        }
        if other.immutable.is_some() {
            self.immutable = other.immutable;
        }
    }

    /// Resolve against the store's default immutability.
    pub fn access_mode(&self, default_immutable: bool) -> AccessMode {
        AccessMode {
            merge: self.merge.unwrap_or(false),
            immutable: self.immutable.unwrap_or(default_immutable),
        }
    }
}

/// Per-fetch options. `None` falls back to the store's fetch config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    pub retries: Option<u32>,
    pub timeout: Option<Duration>,
    /// Fail instead of serving an expired value when the load fails.
    pub reject_on_error: Option<bool>,
    /// Cancel outstanding loads for the key before starting this one.
    pub abort_previous: Option<bool>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Options for the write that persists the loaded body.
    pub write: WriteOptions,
}

impl FetchOptions {
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_reject_on_error(mut self, reject: bool) -> Self {
        self.reject_on_error = Some(reject);
        self
    }

    pub fn with_abort_previous(mut self, abort: bool) -> Self {
        self.abort_previous = Some(abort);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_write(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }

    /// Overlay `other`: fields it sets win, headers are unioned.
    pub fn merge_with(&mut self, other: &FetchOptions) {
        if other.retries.is_some() {
            self.retries = other.retries;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.reject_on_error.is_some() {
            self.reject_on_error = other.reject_on_error;
        }
        if other.abort_previous.is_some() {
            self.abort_previous = other.abort_previous;
        }
        self.headers
            .extend(other.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write.merge_with(&other.write);
    }
}

/// An extra key written alongside a `Set`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetEntry {
    pub key: Key,
    pub value: Node,
}

/// A handled call.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set {
        key: Key,
        value: Node,
        options: WriteOptions,
        /// Further writes applied with the same options, after the main one.
        batch: Vec<SetEntry>,
    },
    Reset {
        data: Node,
    },
    Fetch {
        key: Key,
        url: Option<String>,
        options: FetchOptions,
    },
}

impl Operation {
    pub fn set(key: impl Into<Key>, value: impl Into<Node>, options: WriteOptions) -> Self {
        Operation::Set {
            key: key.into(),
            value: value.into(),
            options,
            batch: Vec::new(),
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Operation::Set { .. } => Method::Set,
            Operation::Reset { .. } => Method::Reset,
            Operation::Fetch { .. } => Method::Fetch,
        }
    }

    /// Target key; `Reset` has none.
    pub fn key(&self) -> Option<&Key> {
        match self {
            Operation::Set { key, .. } | Operation::Fetch { key, .. } => Some(key),
            Operation::Reset { .. } => None,
        }
    }
}

/// What a handler receives.
#[derive(Debug)]
pub struct HandlerContext {
    operation: Operation,
    vetoed: bool,
}

impl HandlerContext {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            vetoed: false,
        }
    }

    pub fn method(&self) -> Method {
        self.operation.method()
    }

    pub fn key(&self) -> Option<&Key> {
        self.operation.key()
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn operation_mut(&mut self) -> &mut Operation {
        &mut self.operation
    }

    /// The value a `Set` writes or the data a `Reset` installs.
    pub fn value(&self) -> Option<&Node> {
        match &self.operation {
            Operation::Set { value, .. } => Some(value),
            Operation::Reset { data } => Some(data),
            Operation::Fetch { .. } => None,
        }
    }

    /// Replace the value of a `Set` or the data of a `Reset`.
    pub fn set_value(&mut self, next: impl Into<Node>) {
        match &mut self.operation {
            Operation::Set { value, .. } => *value = next.into(),
            Operation::Reset { data } => *data = next.into(),
            Operation::Fetch { .. } => {}
        }
    }

    /// Redirect the operation to another key. Ignored for `Reset`.
    pub fn set_key(&mut self, next: impl Into<Key>) {
        match &mut self.operation {
            Operation::Set { key, .. } | Operation::Fetch { key, .. } => *key = next.into(),
            Operation::Reset { .. } => {}
        }
    }

    /// Replace the source URL of a `Fetch`.
    pub fn set_url(&mut self, next: impl Into<String>) {
        if let Operation::Fetch { url, .. } = &mut self.operation {
            *url = Some(next.into());
        }
    }

    /// Overlay write options on a `Set`, or on the persisting write of a
    /// `Fetch`.
    pub fn merge_options(&mut self, overlay: &WriteOptions) {
        match &mut self.operation {
            Operation::Set { options, .. } => options.merge_with(overlay),
            Operation::Fetch { options, .. } => options.write.merge_with(overlay),
            Operation::Reset { .. } => {}
        }
    }

    /// Overlay fetch options on a `Fetch`.
    pub fn merge_fetch_options(&mut self, overlay: &FetchOptions) {
        if let Operation::Fetch { options, .. } = &mut self.operation {
            options.merge_with(overlay);
        }
    }

    /// Add another key/value pair to a `Set`.
    pub fn batch_key(&mut self, key: impl Into<Key>, value: impl Into<Node>) {
        if let Operation::Set { batch, .. } = &mut self.operation {
            batch.push(SetEntry {
                key: key.into(),
                value: value.into(),
            });
        }
    }

    /// Skip the operation. The call returns without error.
    pub fn veto(&mut self) {
        self.vetoed = true;
    }

    pub fn is_vetoed(&self) -> bool {
        self.vetoed
    }

    pub(crate) fn into_operation(self) -> Option<Operation> {
        (!self.vetoed).then_some(self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_options_overlay() {
        let mut base = WriteOptions::merge();
        base.merge_with(&WriteOptions::immutable());
        assert_eq!(
            base,
            WriteOptions {
                merge: Some(true),
                immutable: Some(true)
            }
        );
        assert_eq!(
            WriteOptions::default().access_mode(true),
            AccessMode {
                merge: false,
                immutable: true
            }
        );
    }

    #[test]
    fn fetch_options_overlay() {
        let mut base = FetchOptions::default().with_retries(1).with_header("a", "1");
        base.merge_with(
            &FetchOptions::default()
                .with_timeout(Duration::from_secs(2))
                .with_header("b", "2"),
        );
        assert_eq!(base.retries, Some(1));
        assert_eq!(base.timeout, Some(Duration::from_secs(2)));
        assert_eq!(base.headers.len(), 2);
    }

    #[test]
    fn batch_key_only_applies_to_set() {
        let mut ctx = HandlerContext::new(Operation::set("a", 1i64, WriteOptions::default()));
        ctx.batch_key("b", 2i64);
        match ctx.operation() {
            Operation::Set { batch, .. } => assert_eq!(batch.len(), 1),
            other => panic!("unexpected {:?}", other),
        }

        let mut ctx = HandlerContext::new(Operation::Reset { data: Node::object() });
        ctx.batch_key("b", 2i64);
        assert_eq!(ctx.operation(), &Operation::Reset { data: Node::object() });
    }

    #[test]
    fn veto_drops_operation() {
        let mut ctx = HandlerContext::new(Operation::set("a", 1i64, WriteOptions::default()));
        ctx.veto();
        assert!(ctx.into_operation().is_none());
    }

    #[test]
    fn fetch_rewrites() {
        let mut ctx = HandlerContext::new(Operation::Fetch {
            key: Key::parse("a"),
            url: None,
            options: FetchOptions::default(),
        });
        ctx.set_url("http://example.test/a");
        ctx.merge_options(&WriteOptions::merge());
        ctx.merge_fetch_options(&FetchOptions::default().with_reject_on_error(true));
        match ctx.into_operation() {
            Some(Operation::Fetch { url, options, .. }) => {
                assert_eq!(url.as_deref(), Some("http://example.test/a"));
                assert_eq!(options.write.merge, Some(true));
                assert_eq!(options.reject_on_error, Some(true));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

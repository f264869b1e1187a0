//! Handler registry and dispatch.
//!
//! A call on a handled method moves through the stages
//! `Idle → ContextBuilt → HandlersInvoked → Executed → Destroyed`:
//!
//! ```text
//!   Operation ──► HandlerContext ──► handlers (registration order) ──► execute
//!                                         │
//!                                         └── veto() ──► skipped
//! ```
//!
//! Handlers are invoked with no pipeline lock held, so a handler may register
//! or remove handlers, or read the store, without deadlocking.

use crate::handlers::context::{HandlerContext, Method, Operation};
use crate::handlers::matcher::Matcher;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Middleware invoked for matching operations.
pub type Handler = Arc<dyn Fn(&mut HandlerContext) + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut HandlerContext) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-call progress through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    ContextBuilt,
    HandlersInvoked,
    Executed,
    Destroyed,
}

#[derive(Clone)]
struct Registration {
    matcher: Matcher,
    handler: Handler,
}

/// Ordered handler registry plus the set of handled methods.
pub struct Pipeline {
    registrations: RwLock<Vec<Registration>>,
    handled: Mutex<HashSet<Method>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            handled: Mutex::new(HashSet::new()),
        }
    }

    /// Route `method` through the handlers. The first binding wins; later
    /// attempts return `false`.
    pub fn handle(&self, method: Method) -> bool {
        let bound = self.handled.lock().insert(method);
        if !bound {
            trace!(%method, "method already handled");
        }
        bound
    }

    pub fn is_handled(&self, method: Method) -> bool {
        self.handled.lock().contains(&method)
    }

    /// Register a handler after every existing one.
    pub fn use_handler(&self, matcher: Matcher, handler: Handler) {
        trace!(%matcher, "handler registered");
        self.registrations
            .write()
            .push(Registration { matcher, handler });
    }

    /// Register several handlers, keeping their order.
    pub fn use_handlers<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (Matcher, Handler)>,
    {
        let mut registrations = self.registrations.write();
        for (matcher, handler) in entries {
            registrations.push(Registration { matcher, handler });
        }
    }

    /// Remove every registration of `handler`, whatever its matcher.
    ///
    /// Returns the number of registrations removed.
    pub fn unuse_handler(&self, handler: &Handler) -> usize {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| !Arc::ptr_eq(&r.handler, handler));
        before - registrations.len()
    }

    pub fn unuse_handlers(&self, handlers: &[Handler]) -> usize {
        handlers.iter().map(|h| self.unuse_handler(h)).sum()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    /// Drop every registration. Handled methods stay bound.
    pub fn clear(&self) {
        self.registrations.write().clear();
    }

    /// Run the handlers for `operation` and return what should execute.
    ///
    /// `None` means a handler vetoed the call.
    pub fn dispatch(&self, operation: Operation) -> Option<Operation> {
        let method = operation.method();
        if !self.is_handled(method) {
            return Some(operation);
        }

        let matching: Vec<Handler> = {
            let registrations = self.registrations.read();
            if registrations.is_empty() {
                return Some(operation);
            }
            let key = operation.key().map(|k| k.to_string());
            registrations
                .iter()
                .filter(|r| r.matcher.matches(key.as_deref()))
                .map(|r| r.handler.clone())
                .collect()
        };
        if matching.is_empty() {
            return Some(operation);
        }

        let mut ctx = HandlerContext::new(operation);
        trace!(%method, stage = ?PipelineStage::ContextBuilt, handlers = matching.len());

        for handler in &matching {
            handler(&mut ctx);
            if ctx.is_vetoed() {
                trace!(%method, "operation vetoed");
                break;
            }
        }
        trace!(%method, stage = ?PipelineStage::HandlersInvoked);

        ctx.into_operation()
    }

    /// Dispatch `operation` and run `execute` on the result.
    ///
    /// Returns `None` when vetoed.
    pub fn run<R, F>(&self, operation: Operation, execute: F) -> Option<R>
    where
        F: FnOnce(Operation) -> R,
    {
        let method = operation.method();
        let next = self.dispatch(operation)?;
        let result = execute(next);
        trace!(%method, stage = ?PipelineStage::Executed);
        trace!(%method, stage = ?PipelineStage::Destroyed);
        Some(result)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("registrations", &self.len())
            .field("handled", &*self.handled.lock())
            .finish()
    }
}

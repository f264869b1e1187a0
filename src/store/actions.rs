//! Named actions dispatched through `trigger`.
//!
//! Synchronous actions run when triggered and their result is wrapped in a
//! ready future; asynchronous actions return their own future. Either way
//! the caller awaits one `ActionFuture`.

use crate::core::error::{ArborError, ArborResult};
use crate::store::Store;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by an action.
pub type ActionFuture = Pin<Box<dyn Future<Output = ArborResult<Value>> + Send>>;

/// A registered action.
pub type Action = Arc<dyn Fn(Store, Vec<Value>) -> ActionFuture + Send + Sync>;

/// Wrap a synchronous function as an [`Action`].
pub fn sync_action<F>(f: F) -> Action
where
    F: Fn(&Store, Vec<Value>) -> ArborResult<Value> + Send + Sync + 'static,
{
    Arc::new(move |store: Store, args: Vec<Value>| -> ActionFuture {
        let result = f(&store, args);
        Box::pin(std::future::ready(result))
    })
}

/// Wrap an asynchronous function as an [`Action`].
pub fn async_action<F, Fut>(f: F) -> Action
where
    F: Fn(Store, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ArborResult<Value>> + Send + 'static,
{
    Arc::new(move |store: Store, args: Vec<Value>| -> ActionFuture { Box::pin(f(store, args)) })
}

/// Action registry, by name.
#[derive(Default)]
pub struct ActionRegistry {
    actions: RwLock<HashMap<String, Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Replaces any action of the same name.
    pub fn register(&self, name: impl Into<String>, action: Action) {
        self.actions.write().insert(name.into(), action);
    }

    pub fn get(&self, name: &str) -> Option<Action> {
        self.actions.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.actions.write().clear();
    }

    /// Invoke `name` with `args`.
    pub fn call(&self, store: Store, name: &str, args: Vec<Value>) -> ActionFuture {
        match self.get(name) {
            Some(action) => action(store, args),
            None => {
                let err = ArborError::UnknownAction {
                    name: name.to_string(),
                };
                Box::pin(std::future::ready(Err(err)))
            }
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let registry = ActionRegistry::new();
        registry.register("echo", sync_action(|_store: &Store, args: Vec<Value>| Ok(json!(args))));
        registry.register(
            "len",
            async_action(|_store: Store, args: Vec<Value>| async move { Ok(json!(args.len())) }),
        );

        assert!(registry.contains("echo"));
        assert_eq!(registry.names(), vec!["echo".to_string(), "len".to_string()]);

        let store = Store::new();
        let echoed = registry.call(store.clone(), "echo", vec![json!(1)]).await.unwrap();
        assert_eq!(echoed, json!([1]));
        let len = registry.call(store.clone(), "len", vec![json!(1), json!(2)]).await.unwrap();
        assert_eq!(len, json!(2));

        registry.clear();
        assert!(matches!(
            registry.call(store, "echo", vec![]).await,
            Err(ArborError::UnknownAction { .. })
        ));
    }

    #[test]
    fn register_replaces_same_name() {
        let registry = ActionRegistry::new();
        registry.register("a", sync_action(|_: &Store, _| Ok(json!(1))));
        registry.register("a", sync_action(|_: &Store, _| Ok(json!(2))));
        assert_eq!(registry.names().len(), 1);
        assert!(registry.get("a").is_some());
        assert!(registry.get("b").is_none());
    }
}

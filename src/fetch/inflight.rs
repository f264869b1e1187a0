//! Registry of in-flight loads.
//!
//! Every load runs as its own tokio task. The registry keeps each task's
//! [`AbortHandle`] under the key it loads so `abort` can cancel a key, a
//! subtree or everything. Aborting a task drops its pending retry sleep and
//! its transport future together.

use crate::tree::Key;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;
use tracing::debug;

static NEXT_LOAD_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-wide unique load id.
pub fn next_load_id() -> u64 {
    NEXT_LOAD_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
struct Tracked {
    id: u64,
    handle: AbortHandle,
}

/// In-flight loads grouped by key.
#[derive(Debug, Default)]
pub struct InflightLoads {
    loads: Mutex<HashMap<Key, Vec<Tracked>>>,
}

impl InflightLoads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a spawned load.
    pub fn register(&self, key: Key, id: u64, handle: AbortHandle) {
        let mut loads = self.loads.lock();
        let entries = loads.entry(key).or_default();
        entries.retain(|t| !t.handle.is_finished());
        entries.push(Tracked { id, handle });
    }

    /// Forget a load that has settled.
    pub fn complete(&self, key: &Key, id: u64) {
        let mut loads = self.loads.lock();
        if let Some(entries) = loads.get_mut(key) {
            entries.retain(|t| t.id != id);
            if entries.is_empty() {
                loads.remove(key);
            }
        }
    }

    /// Abort every load for `key`. Returns the number aborted.
    pub fn abort_key(&self, key: &Key) -> usize {
        let entries = self.loads.lock().remove(key).unwrap_or_default();
        Self::abort_all_of(key, entries)
    }

    /// Abort every load at or beneath `prefix`.
    pub fn abort_prefix(&self, prefix: &Key) -> usize {
        let drained: Vec<(Key, Vec<Tracked>)> = {
            let mut loads = self.loads.lock();
            let keys: Vec<Key> = loads
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|k| loads.remove(&k).map(|v| (k, v)))
                .collect()
        };
        drained
            .into_iter()
            .map(|(key, entries)| Self::abort_all_of(&key, entries))
            .sum()
    }

    /// Abort everything.
    pub fn abort_all(&self) -> usize {
        self.abort_prefix(&Key::root())
    }

    /// Number of loads that have not finished.
    pub fn len(&self) -> usize {
        self.loads
            .lock()
            .values()
            .flatten()
            .filter(|t| !t.handle.is_finished())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn abort_all_of(key: &Key, entries: Vec<Tracked>) -> usize {
        let mut aborted = 0;
        for tracked in entries {
            if !tracked.handle.is_finished() {
                tracked.handle.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            debug!(key = %key, aborted, "aborted in-flight loads");
        }
        aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pending() -> tokio::task::JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    #[test]
    fn load_ids_increase() {
        let a = next_load_id();
        let b = next_load_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn abort_key_cancels_only_that_key() {
        let loads = InflightLoads::new();
        let a = pending();
        let b = pending();
        loads.register(Key::parse("a"), 1, a.abort_handle());
        loads.register(Key::parse("b"), 2, b.abort_handle());

        assert_eq!(loads.abort_key(&Key::parse("a")), 1);
        assert!(a.await.unwrap_err().is_cancelled());
        assert_eq!(loads.len(), 1);
        assert_eq!(loads.abort_key(&Key::parse("missing")), 0);

        assert_eq!(loads.abort_all(), 1);
        assert!(b.await.unwrap_err().is_cancelled());
        assert!(loads.is_empty());
    }

    #[tokio::test]
    async fn abort_prefix_covers_subtree() {
        let loads = InflightLoads::new();
        let tasks: Vec<_> = ["scope/a", "scope/b/c", "other"]
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let task = pending();
                loads.register(Key::parse(key), i as u64, task.abort_handle());
                task
            })
            .collect();

        assert_eq!(loads.abort_prefix(&Key::parse("scope")), 2);
        assert_eq!(loads.len(), 1);
        loads.abort_all();
        for task in tasks {
            assert!(task.await.unwrap_err().is_cancelled());
        }
    }

    #[tokio::test]
    async fn complete_forgets_load() {
        let loads = InflightLoads::new();
        let task = tokio::spawn(async {});
        loads.register(Key::parse("a"), 7, task.abort_handle());
        loads.complete(&Key::parse("a"), 7);
        assert!(loads.is_empty());
        task.await.unwrap();
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

/// Pending completions keyed by correlation id.
///
/// At most one entry exists per id. An entry leaves the table exactly once:
/// through [`complete`](Self::complete) or [`evict`](Self::evict), whichever
/// comes first.
pub struct CorrelationTable<T> {
    entries: Mutex<HashMap<String, oneshot::Sender<T>>>,
}

impl<T> CorrelationTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve `id`. Returns `None` if `id` is already pending.
    pub fn register(&self, id: &str) -> Option<oneshot::Receiver<T>> {
        let mut entries = self.entries();
        if entries.contains_key(id) {
            return None;
        }
        let (sender, receiver) = oneshot::channel();
        entries.insert(id.to_string(), sender);
        Some(receiver)
    }

    /// Settle and remove the entry for `id`. Returns `false` when nothing was
    /// pending under that id, so repeated or stray completions are no-ops.
    pub fn complete(&self, id: &str, value: T) -> bool {
        let Some(sender) = self.entries().remove(id) else {
            return false;
        };
        // The waiter may have gone away already; the entry is gone either way.
        let _ = sender.send(value);
        true
    }

    /// Remove the entry for `id` without settling it.
    pub fn evict(&self, id: &str) -> bool {
        self.entries().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

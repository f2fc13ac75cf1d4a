//! Outstanding calls keyed by correlation id.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde_json::Value;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::debug;

use crate::errors::BridgeError;

pub type CallOutcome = Result<Value, BridgeError>;

struct PendingEntry {
    reply_tx: oneshot::Sender<CallOutcome>,
    timer: JoinHandle<()>,
}

/// Registry of in-flight calls for one connection.
///
/// Every exit path goes through [`PendingCalls::settle`], which removes the
/// entry and cancels its timer exactly once.
#[derive(Clone, Default)]
pub struct PendingCalls {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        id: &str,
        method: &str,
        timeout: Duration,
    ) -> oneshot::Receiver<CallOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let deadline = tokio::time::sleep(timeout);
        let registry = self.clone();
        let timer_id = id.to_string();
        let timeout_error = BridgeError::Timeout {
            method: method.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        // Holding the lock while spawning keeps the timer from settling an id
        // that is not yet in the map.
        let mut entries = self.lock();
        let timer = tokio::spawn(async move {
            deadline.await;
            if registry.settle(&timer_id, Err(timeout_error)) {
                debug!(id = %timer_id, "pending call timed out");
            }
        });
        entries.insert(id.to_string(), PendingEntry { reply_tx, timer });

        reply_rx
    }

    /// Removes `id` and delivers `outcome`. Returns `false` when the id is
    /// unknown or already settled.
    pub fn settle(&self, id: &str, outcome: CallOutcome) -> bool {
        let Some(entry) = self.lock().remove(id) else {
            return false;
        };
        entry.timer.abort();
        let _ = entry.reply_tx.send(outcome);
        true
    }

    pub fn resolve(&self, id: &str, result: Value) -> bool {
        self.settle(id, Ok(result))
    }

    pub fn reject(&self, id: &str, error: BridgeError) -> bool {
        self.settle(id, Err(error))
    }

    /// Rejects every entry with `error` and empties the registry.
    pub fn drain(&self, error: &BridgeError) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let count = drained.len();
        for (_id, entry) in drained {
            entry.timer.abort();
            let _ = entry.reply_tx.send(Err(error.clone()));
        }
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

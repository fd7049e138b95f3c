use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

/// Pending `emit_with_ack` calls keyed by acknowledgement id.
pub(crate) struct AckTable {
    next_id: AtomicU64,
    waiters: DashMap<u64, oneshot::Sender<Vec<Value>>>,
}

impl AckTable {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            waiters: DashMap::new(),
        }
    }

    /// Allocate the next id and park a waiter under it.
    pub(crate) fn register(&self) -> (u64, oneshot::Receiver<Vec<Value>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id, tx);
        (id, rx)
    }

    /// Hand `args` to the waiter for `id`. Returns `false` when nobody is waiting anymore.
    pub(crate) fn resolve(&self, id: u64, args: Vec<Value>) -> bool {
        self.waiters
            .remove(&id)
            .is_some_and(|(_, tx)| tx.send(args).is_ok())
    }

    pub(crate) fn remove(&self, id: u64) {
        self.waiters.remove(&id);
    }

    /// Drop every waiter, their receivers observe the channel closing.
    pub(crate) fn fail_all(&self) {
        self.waiters.clear();
    }

    pub(crate) fn pending(&self) -> usize {
        self.waiters.len()
    }
}

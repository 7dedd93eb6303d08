//! Per-request decision locks.
//!
//! A human reaction and a reconciliation sweep may try to decide the same
//! request at the same time. Both take the request's lock first and then
//! re-read the record from the store, so only one of them applies a decision.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use greenlight_types::RequestId;
use tokio::sync::OwnedMutexGuard;

#[derive(Default)]
pub struct RequestLocks {
    locks: Mutex<HashMap<RequestId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `request_id`.
    pub async fn acquire(&self, request_id: RequestId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries nobody holds or waits on can go.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(request_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked locks.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

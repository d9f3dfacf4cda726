use crate::core::{RecordId, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Entries beyond this count trigger pruning of idle row mutexes.
const PRUNE_THRESHOLD: usize = 1024;

/// Exclusive lock on one record, owned by the transaction that fetched it.
///
/// The row stays locked for as long as the handle is alive.
pub struct LockedHandle {
    record_id: RecordId,
    acquired_at: Instant,
    _guard: OwnedMutexGuard<()>,
}

impl LockedHandle {
    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for LockedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockedHandle")
            .field("record_id", &self.record_id)
            .field("held_for", &self.held_for())
            .finish()
    }
}

/// One async mutex per record id, created on first use.
#[derive(Default)]
pub struct RowLockTable {
    rows: Mutex<HashMap<RecordId, Arc<Mutex<()>>>>,
}

impl RowLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    async fn row(&self, id: RecordId) -> Arc<Mutex<()>> {
        let mut rows = self.rows.lock().await;
        if rows.len() > PRUNE_THRESHOLD {
            // Only the table itself references an idle row.
            rows.retain(|_, row| Arc::strong_count(row) > 1);
        }
        Arc::clone(rows.entry(id).or_default())
    }

    /// Wait up to `timeout` for exclusive access to `id`.
    ///
    /// Waiters are served in FIFO order.
    pub async fn acquire(&self, id: RecordId, timeout: Duration) -> Result<LockedHandle, StoreError> {
        let row = self.row(id).await;
        match tokio::time::timeout(timeout, row.lock_owned()).await {
            Ok(guard) => Ok(LockedHandle {
                record_id: id,
                acquired_at: Instant::now(),
                _guard: guard,
            }),
            Err(_) => Err(StoreError::LockTimeout(id)),
        }
    }

    /// Whether some transaction currently holds the lock on `id`.
    pub async fn is_locked(&self, id: RecordId) -> bool {
        let rows = self.rows.lock().await;
        match rows.get(&id) {
            Some(row) => row.try_lock().is_err(),
            None => false,
        }
    }
}

// ============================================================================
// Transaction Manager
// ============================================================================

use super::state::TransactionCounters;
use super::{CommitHook, Transaction, TransactionId};
use crate::core::{Record, StoreError};
use crate::storage::RecordStore;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Opens transactions over one record store and commits them.
pub struct TransactionManager {
    store: Arc<dyn RecordStore>,
    counters: Arc<TransactionCounters>,
}

/// Point-in-time view of the manager's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub aborted: u64,
    pub active: u64,
}

/// What a successful commit wrote and scheduled.
#[derive(Debug)]
pub struct CommitReport {
    pub txn_id: TransactionId,
    /// Records as they were written, with bumped versions.
    pub records: Vec<Record>,
    pub hooks_scheduled: usize,
    /// Background task running the on-commit hooks, if any were registered.
    pub hooks: Option<JoinHandle<()>>,
    pub duration: Duration,
}

impl TransactionManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            counters: Arc::new(TransactionCounters::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Open a new transaction scope.
    pub fn begin(&self) -> Transaction {
        let txn = Transaction::new(TransactionId::new(), Arc::clone(&self.counters));
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        debug!(txn = %txn.id(), "transaction started");
        txn
    }

    /// Apply every staged change, release the locks, then schedule on-commit hooks.
    ///
    /// Hooks run on a spawned task in registration order, after the writes are
    /// durable and the row locks are gone. `commit` returns without waiting for
    /// them. A panicking hook is logged and does not affect the remaining hooks.
    ///
    /// # Errors
    /// If the store rejects the changes the transaction is rolled back and
    /// the store error is returned; no hook runs.
    pub async fn commit(&self, mut txn: Transaction) -> Result<CommitReport, StoreError> {
        if !txn.state().is_active() {
            return Err(StoreError::TransactionNotActive(format!(
                "{} is {}",
                txn.id(),
                txn.state()
            )));
        }

        let txn_id = txn.id();
        let changes = txn.take_changes();
        let records = match self.store.apply(txn_id, &changes).await {
            Ok(records) => records,
            Err(err) => {
                warn!(txn = %txn_id, error = %err, "commit failed, rolling back");
                txn.rollback()?;
                return Err(err);
            }
        };

        txn.commit()?;
        txn.release_locks();
        let duration = txn.duration();
        info!(
            txn = %txn_id,
            records = records.len(),
            elapsed = ?duration,
            "transaction committed"
        );

        let hooks = txn.take_hooks();
        let hooks_scheduled = hooks.len();
        let hooks = if hooks.is_empty() {
            None
        } else {
            Some(tokio::spawn(run_hooks(txn_id, hooks)))
        };

        Ok(CommitReport {
            txn_id,
            records,
            hooks_scheduled,
            hooks,
            duration,
        })
    }

    /// Roll the transaction back explicitly.
    ///
    /// Dropping a transaction has the same effect; this variant logs it.
    pub fn rollback(&self, mut txn: Transaction) {
        let txn_id = txn.id();
        let discarded = txn.change_count();
        if txn.rollback().is_ok() {
            info!(txn = %txn_id, discarded, "transaction rolled back");
        }
    }

    pub fn stats(&self) -> TransactionStats {
        let begun = self.counters.begun.load(Ordering::SeqCst);
        let committed = self.counters.committed.load(Ordering::SeqCst);
        let aborted = self.counters.aborted.load(Ordering::SeqCst);
        TransactionStats {
            begun,
            committed,
            aborted,
            active: begun.saturating_sub(committed + aborted),
        }
    }
}

async fn run_hooks(txn_id: TransactionId, hooks: Vec<CommitHook>) {
    for hook in hooks {
        if let Err(panic) = AssertUnwindSafe(async move { hook().await })
            .catch_unwind()
            .await
        {
            error!(txn = %txn_id, panic = %panic_message(panic.as_ref()), "on-commit hook panicked");
        }
    }
    debug!(txn = %txn_id, "on-commit hooks finished");
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

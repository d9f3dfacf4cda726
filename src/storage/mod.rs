// ============================================================================
// Record Storage
// ============================================================================
//
// The RecordStore trait is the only contract the pipeline has with the
// durable store: lock-and-fetch, stage a write, apply a committed
// transaction, and read committed state.
//
// ============================================================================

pub mod locks;
pub mod memory;
pub mod persistence;

pub use locks::{LockedHandle, RowLockTable};
pub use memory::{DEFAULT_LOCK_TIMEOUT, InMemoryRecordStore};
pub use persistence::{DurabilityMode, PersistenceManager, WalEntry};

use crate::core::{Record, RecordId, StoreError};
use crate::transaction::{Change, Transaction, TransactionId};
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Lock `id` for the lifetime of `txn`, then read its committed state.
    ///
    /// The lock is taken even when the record does not exist and is released
    /// when `txn` commits or rolls back.
    async fn fetch_locked(
        &self,
        txn: &mut Transaction,
        id: RecordId,
    ) -> Result<Option<Record>, StoreError>;

    /// Stage the record's current state in `txn`.
    ///
    /// Nothing is visible to other readers until the transaction commits.
    async fn persist(&self, txn: &mut Transaction, record: &Record) -> Result<(), StoreError>;

    /// Make a committed transaction's changes durable, all or nothing.
    ///
    /// Returns the written records with their new versions.
    async fn apply(&self, txn_id: TransactionId, changes: &[Change]) -> Result<Vec<Record>, StoreError>;

    /// Unlocked read of committed state.
    async fn get(&self, id: RecordId) -> Result<Option<Record>, StoreError>;
}

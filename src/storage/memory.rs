use super::persistence::{DurabilityMode, PersistenceManager, WalEntry};
use super::{RecordStore, RowLockTable};
use crate::core::{Record, RecordId, StoreError};
use crate::transaction::{Change, Transaction, TransactionId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Record store keeping committed state in memory, optionally backed by a
/// write-ahead log and snapshot on disk.
pub struct InMemoryRecordStore {
    /// Committed records only; staged writes live in their transaction
    records: RwLock<HashMap<RecordId, Record>>,
    /// Row locks held by in-flight transactions
    locks: RowLockTable,
    lock_timeout: Duration,
    persistence: Option<Mutex<PersistenceManager>>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            locks: RowLockTable::new(),
            lock_timeout,
            persistence: None,
        }
    }

    /// Open a durable store in `data_dir`, recovering whatever was committed before.
    pub fn open<P: AsRef<Path>>(
        data_dir: P,
        durability_mode: DurabilityMode,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let manager = PersistenceManager::new(data_dir.as_ref(), durability_mode)?;
        let records = manager.recover()?;
        info!(
            data_dir = %data_dir.as_ref().display(),
            records = records.len(),
            ?durability_mode,
            "record store recovered"
        );

        Ok(Self {
            records: RwLock::new(records),
            locks: RowLockTable::new(),
            lock_timeout,
            persistence: Some(Mutex::new(manager)),
        })
    }

    /// Initial data for a memory-only store.
    pub fn with_records(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        let map = self.records.get_mut();
        for record in records {
            map.insert(record.id, record);
        }
        self
    }

    /// Insert records as committed state, bypassing transactions.
    ///
    /// Meant for bootstrapping; seeded records keep the version they carry.
    pub async fn seed(&self, records: Vec<Record>) -> Result<(), StoreError> {
        let mut map = self.records.write().await;
        if let Some(persistence) = &self.persistence {
            persistence
                .lock()
                .await
                .log(&WalEntry::Seed { records: records.clone() })?;
        }
        for record in records {
            map.insert(record.id, record);
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn locks(&self) -> &RowLockTable {
        &self.locks
    }

    /// Write a snapshot and truncate the WAL.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let records = self.records.read().await;
        persistence.lock().await.checkpoint(&records)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_locked(
        &self,
        txn: &mut Transaction,
        id: RecordId,
    ) -> Result<Option<Record>, StoreError> {
        if !txn.state().is_active() {
            return Err(StoreError::TransactionNotActive(txn.id().to_string()));
        }

        if !txn.holds_lock(id) {
            let handle = self.locks.acquire(id, self.lock_timeout).await?;
            debug!(txn = %txn.id(), record_id = id, "row lock acquired");
            txn.hold_lock(handle)?;
        }

        // Read after the lock is granted so the previous holder's commit is visible.
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn persist(&self, txn: &mut Transaction, record: &Record) -> Result<(), StoreError> {
        if !txn.holds_lock(record.id) {
            return Err(StoreError::NotLocked(record.id));
        }
        txn.record_change(Change::new(record.clone()))?;
        debug!(txn = %txn.id(), record_id = record.id, "write staged");
        Ok(())
    }

    async fn apply(&self, txn_id: TransactionId, changes: &[Change]) -> Result<Vec<Record>, StoreError> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = self.records.write().await;

        for change in changes {
            if let Some(current) = records.get(&change.record_id()) {
                if current.version != change.expected_version {
                    return Err(StoreError::Conflict {
                        id: change.record_id(),
                        expected: change.expected_version,
                        found: current.version,
                    });
                }
            }
        }

        let now = Utc::now();
        let committed: Vec<Record> = changes
            .iter()
            .map(|change| {
                let mut record = change.record.clone();
                record.version = change.expected_version + 1;
                record.updated_at = Some(now);
                record
            })
            .collect();

        if let Some(persistence) = &self.persistence {
            let mut persistence = persistence.lock().await;
            persistence.log(&WalEntry::Commit {
                txn_id: txn_id.as_u64(),
                records: committed.clone(),
            })?;

            for record in &committed {
                records.insert(record.id, record.clone());
            }

            if persistence.needs_checkpoint() {
                // The commit is already durable in the WAL.
                if let Err(err) = persistence.checkpoint(&records) {
                    warn!(error = %err, "checkpoint failed, WAL kept");
                }
            }
        } else {
            for record in &committed {
                records.insert(record.id, record.clone());
            }
        }

        Ok(committed)
    }

    async fn get(&self, id: RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }
}

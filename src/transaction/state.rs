// ============================================================================
// Transaction State Management
// ============================================================================
//
// Implements the State Pattern for transaction lifecycle management.
// Each transaction moves through defined states: Active -> Committed/Aborted
//
// A transaction owns everything scoped to it:
// - staged changes (applied on commit)
// - row locks (released on commit or rollback)
// - on-commit hooks (run once after commit, dropped on rollback)
//
// Dropping an active transaction rolls it back.
//
// ============================================================================

use super::Change;
use crate::core::{RecordId, StoreError};
use crate::storage::LockedHandle;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Callback registered with [`Transaction::on_commit`].
pub type CommitHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + 'static>;

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted/rolled back
    Aborted,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Lifetime counters shared between the manager and its transactions.
#[derive(Debug, Default)]
pub(crate) struct TransactionCounters {
    pub(crate) begun: AtomicU64,
    pub(crate) committed: AtomicU64,
    pub(crate) aborted: AtomicU64,
}

/// Marker for a nested scope inside a transaction.
///
/// Savepoints nest strictly: only the innermost one can be released or
/// rolled back to.
#[derive(Debug)]
#[must_use = "a savepoint must be released or rolled back to"]
pub struct Savepoint {
    txn: TransactionId,
    depth: usize,
    /// Staged writes as they stood when the savepoint opened
    changes: Vec<Change>,
    hooks: usize,
}

impl Savepoint {
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// A unit of work over the record store.
///
/// # Thread Safety
/// A transaction belongs to one pipeline invocation and is moved, never
/// shared. The row locks it holds are what serializes concurrent pipelines.
pub struct Transaction {
    /// Unique transaction identifier
    id: TransactionId,

    /// Current state (Active, Committed, Aborted)
    state: TransactionState,

    /// Writes staged through `RecordStore::persist`
    changes: Vec<Change>,

    /// Callbacks to run after a successful commit
    hooks: Vec<CommitHook>,

    /// Row locks acquired by `RecordStore::fetch_locked`
    locks: Vec<LockedHandle>,

    /// Number of open savepoints
    depth: usize,

    /// Start time for diagnostics
    start_time: std::time::Instant,

    counters: Arc<TransactionCounters>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, counters: Arc<TransactionCounters>) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            changes: Vec::new(),
            hooks: Vec::new(),
            locks: Vec::new(),
            depth: 0,
            start_time: std::time::Instant::now(),
            counters,
        }
    }

    /// Get the transaction ID
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Get the current state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Get all changes recorded in this transaction
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Get the number of changes
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    pub fn pending_hooks(&self) -> usize {
        self.hooks.len()
    }

    /// Number of currently open savepoints
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Get transaction duration
    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn holds_lock(&self, id: RecordId) -> bool {
        self.locks.iter().any(|handle| handle.record_id() == id)
    }

    pub fn locked_ids(&self) -> Vec<RecordId> {
        self.locks.iter().map(LockedHandle::record_id).collect()
    }

    fn ensure_active(&self) -> Result<(), StoreError> {
        if !self.state.is_active() {
            return Err(StoreError::TransactionNotActive(format!(
                "{} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    /// Take ownership of a row lock until this transaction ends.
    pub(crate) fn hold_lock(&mut self, handle: LockedHandle) -> Result<(), StoreError> {
        self.ensure_active()?;
        self.locks.push(handle);
        Ok(())
    }

    /// Record a change in this transaction
    ///
    /// A second write to the same record replaces the first one.
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn record_change(&mut self, change: Change) -> Result<(), StoreError> {
        self.ensure_active()?;

        match self
            .changes
            .iter_mut()
            .find(|existing| existing.record_id() == change.record_id())
        {
            Some(existing) => existing.record = change.record,
            None => self.changes.push(change),
        }
        Ok(())
    }

    /// Register a hook that runs exactly once after this transaction commits.
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn on_commit<F>(&mut self, hook: F) -> Result<(), StoreError>
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        self.ensure_active()?;
        self.hooks.push(Box::new(hook));
        Ok(())
    }

    /// Open a nested scope.
    pub fn savepoint(&mut self) -> Result<Savepoint, StoreError> {
        self.ensure_active()?;
        self.depth += 1;
        debug!(txn = %self.id, depth = self.depth, "savepoint opened");
        Ok(Savepoint {
            txn: self.id,
            depth: self.depth,
            changes: self.changes.clone(),
            hooks: self.hooks.len(),
        })
    }

    fn close_savepoint(&mut self, savepoint: &Savepoint) -> Result<(), StoreError> {
        self.ensure_active()?;
        if savepoint.txn != self.id {
            return Err(StoreError::InvalidSavepoint(format!(
                "savepoint belongs to {}, not {}",
                savepoint.txn, self.id
            )));
        }
        if savepoint.depth != self.depth {
            return Err(StoreError::InvalidSavepoint(format!(
                "savepoint at depth {} closed while depth is {}",
                savepoint.depth, self.depth
            )));
        }
        self.depth -= 1;
        Ok(())
    }

    /// Fold the nested scope into its parent, keeping its changes and hooks.
    pub fn release(&mut self, savepoint: Savepoint) -> Result<(), StoreError> {
        self.close_savepoint(&savepoint)?;
        debug!(txn = %self.id, depth = savepoint.depth, "savepoint released");
        Ok(())
    }

    /// Discard the changes and hooks recorded since the savepoint.
    ///
    /// Staged writes are restored to their state at the savepoint, including
    /// outer writes that a nested write replaced. The enclosing transaction
    /// stays active. Locks taken inside the nested
    /// scope are kept until the whole transaction ends.
    pub fn rollback_to(&mut self, savepoint: Savepoint) -> Result<(), StoreError> {
        self.close_savepoint(&savepoint)?;
        let Savepoint { changes, hooks, depth, .. } = savepoint;
        self.changes = changes;
        self.hooks.truncate(hooks);
        debug!(txn = %self.id, depth, "rolled back to savepoint");
        Ok(())
    }

    pub(crate) fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn take_hooks(&mut self) -> Vec<CommitHook> {
        std::mem::take(&mut self.hooks)
    }

    pub(crate) fn release_locks(&mut self) {
        self.locks.clear();
    }

    /// Mark transaction as committed
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub(crate) fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_active()?;
        self.state = TransactionState::Committed;
        self.depth = 0;
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Mark transaction as aborted, discard changes and hooks, release locks
    ///
    /// # Errors
    /// Returns error if transaction is not active
    pub fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_active()?;
        self.changes.clear();
        self.hooks.clear();
        self.locks.clear();
        self.depth = 0;
        self.state = TransactionState::Aborted;
        self.counters.aborted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("changes", &self.changes.len())
            .field("hooks", &self.hooks.len())
            .field("locks", &self.locked_ids())
            .field("depth", &self.depth)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_active() {
            debug!(txn = %self.id, locks = ?self.locked_ids(), "transaction dropped while active, rolling back");
            let _ = self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Record, RecordType};

    fn txn() -> Transaction {
        Transaction::new(TransactionId::new(), Arc::new(TransactionCounters::default()))
    }

    fn change(id: RecordId, name: &str) -> Change {
        Change::new(Record::new(id, name, RecordType::BankAccount))
    }

    #[test]
    fn test_transaction_id_generation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut txn = txn();

        assert_eq!(txn.state(), TransactionState::Active);
        assert!(txn.state().is_active());
        assert!(!txn.state().is_terminal());

        txn.commit().unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert!(txn.state().is_terminal());
    }

    #[test]
    fn test_cannot_commit_twice() {
        let mut txn = txn();

        txn.commit().unwrap();
        assert!(txn.commit().is_err());
    }

    #[test]
    fn test_rollback_clears_changes_and_hooks() {
        let mut txn = txn();

        txn.record_change(change(1, "a")).unwrap();
        txn.on_commit(|| Box::pin(async {})).unwrap();
        assert_eq!(txn.change_count(), 1);
        assert_eq!(txn.pending_hooks(), 1);

        txn.rollback().unwrap();
        assert_eq!(txn.change_count(), 0);
        assert_eq!(txn.pending_hooks(), 0);
        assert_eq!(txn.state(), TransactionState::Aborted);
    }

    #[test]
    fn test_cannot_record_change_after_commit() {
        let mut txn = txn();

        txn.commit().unwrap();
        assert!(txn.record_change(change(1, "a")).is_err());
        assert!(txn.on_commit(|| Box::pin(async {})).is_err());
    }

    #[test]
    fn test_repeated_write_replaces_staged_change() {
        let mut txn = txn();

        txn.record_change(change(1, "first")).unwrap();
        txn.record_change(change(1, "second")).unwrap();

        assert_eq!(txn.change_count(), 1);
        assert_eq!(txn.changes()[0].record.name, "second");
    }

    #[test]
    fn test_rollback_to_savepoint_keeps_outer_scope() {
        let mut txn = txn();

        txn.record_change(change(1, "outer")).unwrap();
        let sp = txn.savepoint().unwrap();
        txn.record_change(change(2, "inner")).unwrap();
        txn.on_commit(|| Box::pin(async {})).unwrap();
        assert_eq!(txn.depth(), 1);

        txn.rollback_to(sp).unwrap();

        assert!(txn.state().is_active());
        assert_eq!(txn.depth(), 0);
        assert_eq!(txn.change_count(), 1);
        assert_eq!(txn.changes()[0].record.name, "outer");
        assert_eq!(txn.pending_hooks(), 0);
    }

    #[test]
    fn test_rollback_to_savepoint_restores_replaced_write() {
        let mut txn = txn();

        txn.record_change(change(1, "outer")).unwrap();
        let sp = txn.savepoint().unwrap();
        txn.record_change(change(1, "inner")).unwrap();
        assert_eq!(txn.changes()[0].record.name, "inner");

        txn.rollback_to(sp).unwrap();

        assert_eq!(txn.change_count(), 1);
        assert_eq!(txn.changes()[0].record.name, "outer");
    }

    #[test]
    fn test_release_keeps_nested_work() {
        let mut txn = txn();

        let sp = txn.savepoint().unwrap();
        txn.record_change(change(2, "inner")).unwrap();
        txn.release(sp).unwrap();

        assert_eq!(txn.depth(), 0);
        assert_eq!(txn.change_count(), 1);
    }

    #[test]
    fn test_savepoints_close_innermost_first() {
        let mut txn = txn();

        let outer = txn.savepoint().unwrap();
        let inner = txn.savepoint().unwrap();

        assert!(matches!(
            txn.release(outer),
            Err(StoreError::InvalidSavepoint(_))
        ));
        txn.release(inner).unwrap();
        assert_eq!(txn.depth(), 1);
    }

    #[test]
    fn test_drop_counts_as_abort() {
        let counters = Arc::new(TransactionCounters::default());
        {
            let _txn = Transaction::new(TransactionId::new(), Arc::clone(&counters));
        }
        assert_eq!(counters.aborted.load(Ordering::SeqCst), 1);
    }
}

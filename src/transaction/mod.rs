// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Scoped units of work over the record store.
//
// Design Patterns Used:
// - State Pattern: Transaction state management (Active, Committed, Aborted)
// - Scope Guard: dropping an uncommitted transaction rolls it back and
//   releases its row locks
// - Savepoints: nested scopes that can be rolled back on their own
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::Change;
pub use manager::{CommitReport, TransactionManager, TransactionStats};
pub use state::{CommitHook, Savepoint, Transaction, TransactionId, TransactionState};

// ============================================================================
// Staged Writes
// ============================================================================
//
// A Change is a write recorded inside a transaction. It is applied to the
// record store on COMMIT and discarded on ROLLBACK.
//
// ============================================================================

use crate::core::{Record, RecordId};
use serde::{Deserialize, Serialize};

/// A record write staged by `RecordStore::persist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// The full in-memory state to write.
    pub record: Record,

    /// Version the record had when it was fetched. Apply rejects the change
    /// if the committed version moved in the meantime.
    pub expected_version: u64,
}

impl Change {
    pub fn new(record: Record) -> Self {
        let expected_version = record.version;
        Self { record, expected_version }
    }

    pub fn record_id(&self) -> RecordId {
        self.record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RecordType;

    #[test]
    fn test_change_captures_fetched_version() {
        let mut record = Record::new(5, "acct", RecordType::BankAccount);
        record.version = 4;

        let change = Change::new(record);
        assert_eq!(change.record_id(), 5);
        assert_eq!(change.expected_version, 4);
    }
}

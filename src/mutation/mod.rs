use crate::core::{Input, MutationError, Payload, Record, RecordType};
use tracing::warn;

pub const NAME_SUFFIX: &str = "_object";

/// Applies a validated input onto a fetched record.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mutator;

impl Mutator {
    pub fn new() -> Self {
        Self
    }

    /// Rename the record after the input and normalize its type.
    ///
    /// The type is always set to [`RecordType::BankAccount`], whatever type
    /// tag the input carried.
    pub fn apply(&self, record: &mut Record, input: &Input) -> Result<(), MutationError> {
        if record.id != input.id {
            return Err(MutationError::IdMismatch {
                record: record.id,
                input: input.id,
            });
        }

        record.name = format!("{}{}", input.name, NAME_SUFFIX);
        record.record_type = RecordType::BankAccount;
        Ok(())
    }

    /// Copy `details` into the record's free-form fields.
    ///
    /// Keys naming core attributes are skipped. Returns how many were merged.
    pub fn merge_details(&self, record: &mut Record, details: &Payload) -> usize {
        let mut merged = 0;
        for (key, value) in details {
            if Record::RESERVED_KEYS.contains(&key.as_str()) {
                warn!(record_id = record.id, key = %key, "detail key shadows a core attribute, skipped");
                continue;
            }
            record.fields.insert(key.clone(), value.clone());
            merged += 1;
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_renames_and_normalizes() {
        let mut record = Record::new(1, "old", RecordType::BankAccount);
        Mutator::new()
            .apply(&mut record, &Input::new(1, "test", "bank_account"))
            .unwrap();

        assert_eq!(record.name, "test_object");
        assert_eq!(record.record_type, RecordType::BankAccount);
    }

    #[test]
    fn test_apply_ignores_input_type_tag() {
        let mut record = Record::new(1, "old", RecordType::BankAccount);
        Mutator::new()
            .apply(&mut record, &Input::new(1, "abc", "something_else"))
            .unwrap();

        assert_eq!(record.record_type, RecordType::BankAccount);
    }

    #[test]
    fn test_apply_rejects_foreign_record() {
        let mut record = Record::new(2, "old", RecordType::BankAccount);
        let err = Mutator::new()
            .apply(&mut record, &Input::new(1, "test", "bank_account"))
            .unwrap_err();

        assert_eq!(err, MutationError::IdMismatch { record: 2, input: 1 });
        assert_eq!(record.name, "old");
    }

    #[test]
    fn test_merge_details_skips_reserved_keys() {
        let mut record = Record::new(1, "test_object", RecordType::BankAccount);
        let input = Input::new(1, "test", "bank_account")
            .with_detail("iban", "DE00")
            .with_detail("name", "hijack")
            .with_detail("version", 99);

        let merged = Mutator::new().merge_details(&mut record, &input.details);

        assert_eq!(merged, 1);
        assert_eq!(record.fields["iban"], json!("DE00"));
        assert_eq!(record.name, "test_object");
        assert_eq!(record.version, 1);
        assert!(!record.fields.contains_key("name"));
    }
}

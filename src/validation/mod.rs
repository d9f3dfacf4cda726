//! Business rules applied to an [`Input`] before it may touch a record.
//!
//! Rules run in a fixed order and the first failing rule decides the error,
//! so messages stay deterministic when an input breaks several rules.

use crate::core::{Input, RecordType, ValidationError};

pub const DEFAULT_MAX_NAME_LENGTH: usize = 5;

/// A single business rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    /// `name` must be at most `limit` characters long.
    MaxNameLength(usize),
    /// `type` must be a [`RecordType`] wire tag.
    KnownRecordType,
}

impl ValidationRule {
    pub fn check(&self, input: &Input) -> Result<(), ValidationError> {
        match *self {
            ValidationRule::MaxNameLength(limit) => {
                if input.name.chars().count() > limit {
                    return Err(ValidationError::NameTooLong {
                        name: input.name.clone(),
                        limit,
                    });
                }
                Ok(())
            }
            ValidationRule::KnownRecordType => {
                if !RecordType::is_member(&input.record_type) {
                    return Err(ValidationError::InvalidType(input.record_type.clone()));
                }
                Ok(())
            }
        }
    }
}

/// Ordered rule set. Pure: no I/O, no mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    rules: Vec<ValidationRule>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NAME_LENGTH)
    }
}

impl Validator {
    /// Name length first, then record type.
    pub fn new(max_name_length: usize) -> Self {
        Self {
            rules: vec![
                ValidationRule::MaxNameLength(max_name_length),
                ValidationRule::KnownRecordType,
            ],
        }
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn validate(&self, input: &Input) -> Result<(), ValidationError> {
        self.rules.iter().try_for_each(|rule| rule.check(input))
    }
}

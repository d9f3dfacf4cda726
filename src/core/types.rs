use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

pub type RecordId = i64;

/// Free-form JSON object used for record fields, input details and result payloads.
pub type Payload = Map<String, Value>;

/// Closed set of record types accepted by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    BankAccount,
}

impl RecordType {
    pub const ALL: &'static [RecordType] = &[RecordType::BankAccount];

    /// Wire tag, as it appears in requests and persisted records.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordType::BankAccount => "bank_account",
        }
    }

    pub fn is_member(tag: &str) -> bool {
        Self::ALL.iter().any(|t| t.as_str() == tag)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown record type '{}'", s))
    }
}

/// Proposed update supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub id: RecordId,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub details: Payload,
}

impl Input {
    pub fn new(id: RecordId, name: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            record_type: record_type.into(),
            details: Payload::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Durable entity owned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Incremented by one on every committed write.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Payload,
}

impl Record {
    /// Attribute names that detail merges must never overwrite.
    pub const RESERVED_KEYS: &'static [&'static str] =
        &["id", "name", "type", "version", "updated_at"];

    pub fn new(id: RecordId, name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            id,
            name: name.into(),
            record_type,
            version: 1,
            updated_at: None,
            fields: Payload::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// JSON object form, used as the payload of successful results.
    pub fn to_payload(&self) -> Payload {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{id: {}, name: {}, type: {}, version: {}}}",
            self.id, self.name, self.record_type, self.version
        )
    }
}

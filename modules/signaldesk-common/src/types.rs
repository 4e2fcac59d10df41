use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RecordRejection;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A single analysis finding produced by the backend.
///
/// Only `signal_id` is interpreted. Everything else (title, severity,
/// narrative, recommendation, attribution, ...) is carried through untouched
/// so a record can be persisted and re-rendered exactly as delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Signal {
    /// Validate one raw record from a `result` batch or a catalog response.
    pub fn from_value(value: Value) -> Result<Self, RecordRejection> {
        let Value::Object(mut fields) = value else {
            return Err(RecordRejection::NotAnObject);
        };

        let signal_id = match fields.remove("signal_id") {
            None | Some(Value::Null) => return Err(RecordRejection::MissingSignalId),
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            Some(other) => return Err(RecordRejection::InvalidSignalId(other.to_string())),
        };

        Ok(Self { signal_id, fields })
    }

    /// Raw payload field, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.str_field("title")
    }

    pub fn severity(&self) -> Option<&str> {
        self.str_field("severity")
    }
}

/// Validate a batch of raw records, splitting accepted signals from rejects.
/// Rejects keep their position in the batch for diagnostics.
pub fn partition_records(
    records: Vec<Value>,
) -> (Vec<Signal>, Vec<(usize, RecordRejection)>) {
    let mut accepted = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();

    for (index, record) in records.into_iter().enumerate() {
        match Signal::from_value(record) {
            Ok(signal) => accepted.push(signal),
            Err(reason) => rejected.push((index, reason)),
        }
    }

    (accepted, rejected)
}

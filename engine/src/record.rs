//! Submission records received from the form source.

use crate::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a submission came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMeta {
    /// Requester address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// One submitted entry of a form.
///
/// Values are keyed by field id, or by compound-part id when the source
/// already split a compound field. A value can be a scalar, a list, or a
/// nested object (e.g. `{"first-name": "John"}` under `name-1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    /// Unique identifier of the entry
    pub id: RecordId,
    /// When the entry was submitted
    pub submitted_at: DateTime<Utc>,
    /// Raw submitted values
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default)]
    pub meta: SubmissionMeta,
}

impl SubmissionRecord {
    /// Create a record with no values.
    pub fn new(id: impl Into<RecordId>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            submitted_at,
            values: Map::new(),
            meta: SubmissionMeta::default(),
        }
    }

    /// Create a record from a JSON object. Non-object values yield an empty
    /// value map.
    pub fn with_values(
        id: impl Into<RecordId>,
        submitted_at: DateTime<Utc>,
        values: Value,
    ) -> Self {
        let values = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            values,
            ..Self::new(id, submitted_at)
        }
    }

    /// Builder-style method to set one value.
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Builder-style method to set the origin metadata.
    pub fn with_meta(mut self, meta: SubmissionMeta) -> Self {
        self.meta = meta;
        self
    }
}

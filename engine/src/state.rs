//! Per-form mapping state.

use crate::{DestinationId, FormId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent association between a form and its destination.
///
/// Created when a destination is provisioned. Header changes never touch it;
/// it is only discarded (and later recreated) when the destination goes
/// missing or an operator requests a resync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSyncState {
    pub form_id: FormId,
    pub destination_id: DestinationId,
    /// Where an operator can open the destination
    pub destination_url: String,
    pub created_at: DateTime<Utc>,
}

impl FormSyncState {
    pub fn new(
        form_id: impl Into<FormId>,
        destination_id: impl Into<DestinationId>,
        destination_url: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            form_id: form_id.into(),
            destination_id: destination_id.into(),
            destination_url: destination_url.into(),
            created_at,
        }
    }
}

/// Whether a form currently has a destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "state")]
pub enum MappingStatus {
    Unmapped,
    Mapped(FormSyncState),
}

impl MappingStatus {
    pub fn is_mapped(&self) -> bool {
        matches!(self, MappingStatus::Mapped(_))
    }

    pub fn state(&self) -> Option<&FormSyncState> {
        match self {
            MappingStatus::Mapped(state) => Some(state),
            MappingStatus::Unmapped => None,
        }
    }
}

impl From<Option<FormSyncState>> for MappingStatus {
    fn from(state: Option<FormSyncState>) -> Self {
        match state {
            Some(state) => MappingStatus::Mapped(state),
            None => MappingStatus::Unmapped,
        }
    }
}

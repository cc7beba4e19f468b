//! Bounded activity log.
//!
//! Pure observability: entries are written by the orchestrator and read only
//! by operators. Once `retention` entries are held, the oldest is evicted.

use crate::ports::SyncNotifier;
use crate::{FormId, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Default number of entries kept.
pub const DEFAULT_LOG_RETENTION: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Error,
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStatus::Success => write!(f, "success"),
            LogStatus::Error => write!(f, "error"),
        }
    }
}

/// One activity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub status: LogStatus,
    pub form_id: FormId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

/// In-memory [`SyncNotifier`] keeping the most recent entries.
#[derive(Debug)]
pub struct ActivityLog {
    retention: usize,
    entries: Mutex<VecDeque<SyncLogEntry>>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_RETENTION)
    }
}

impl ActivityLog {
    /// Create a log keeping at most `retention` entries (at least one).
    pub fn new(retention: usize) -> Self {
        let retention = retention.max(1);
        Self {
            retention,
            entries: Mutex::new(VecDeque::with_capacity(retention)),
        }
    }

    /// Append an entry, evicting the oldest when full.
    pub fn push(&self, entry: SyncLogEntry) {
        let mut entries = self.lock();
        while entries.len() >= self.retention {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Entries, newest first.
    pub fn recent(&self) -> Vec<SyncLogEntry> {
        self.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SyncLogEntry>> {
        // A panic while holding the lock cannot leave the deque inconsistent.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SyncNotifier for ActivityLog {
    async fn record_success(&self, form_id: &str, record_id: &str) {
        tracing::info!(form_id, record_id, "submission synced");
        self.push(SyncLogEntry {
            status: LogStatus::Success,
            form_id: form_id.to_string(),
            record_id: Some(record_id.to_string()),
            message: None,
            at: Utc::now(),
        });
    }

    async fn record_error(&self, form_id: &str, record_id: Option<&str>, message: &str) {
        tracing::warn!(form_id, record_id, error = %message, "sync failed");
        self.push(SyncLogEntry {
            status: LogStatus::Error,
            form_id: form_id.to_string(),
            record_id: record_id.map(str::to_string),
            message: Some(message.to_string()),
            at: Utc::now(),
        });
    }
}

//! Engine configuration.
//!
//! Passed explicitly to the orchestrator; the engine holds no global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of rows appended per bulk-import call.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default pause between bulk-import batches.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Settings shared by every sync operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Site identity used in destination titles
    pub site_name: String,
    /// Rows per append call during bulk import
    pub batch_size: usize,
    /// Fixed pause between bulk-import batches
    #[serde(with = "millis")]
    pub batch_pause: Duration,
    /// chrono format of the standard Date column
    pub date_format: String,
    /// chrono format of the standard Time column
    pub time_format: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            site_name: "formsync".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            date_format: "%Y-%m-%d".to_string(),
            time_format: "%H:%M:%S".to_string(),
        }
    }
}

impl SyncConfig {
    /// Builder-style method to set the site name.
    pub fn with_site_name(mut self, site_name: impl Into<String>) -> Self {
        self.site_name = site_name.into();
        self
    }

    /// Builder-style method to set the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Builder-style method to set the pause between batches.
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// Destination title for a form. Includes the form id so forms sharing a
    /// title still get distinct destinations.
    pub fn destination_title(&self, form_title: &str, form_id: &str) -> String {
        format!("{} - {} (#{})", self.site_name, form_title, form_id)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

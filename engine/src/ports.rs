//! Collaborator traits.
//!
//! The engine never talks to a network or a database directly. Everything
//! outside the flatten/resolve/reconcile core is reached through these traits,
//! injected into [`crate::SyncOrchestrator`] as `Arc<dyn _>`.

use async_trait::async_trait;

use crate::error::Result;
use crate::resolve::OptionsMap;
use crate::schema::{FieldDefinition, FormDescriptor};
use crate::state::FormSyncState;
use crate::{DestinationId, Row, SubmissionRecord};

/// Source of form schemas.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Every form known to the source.
    async fn list_forms(&self) -> Result<Vec<FormDescriptor>>;

    /// One form, or `None` if it does not exist.
    async fn form(&self, form_id: &str) -> Result<Option<FormDescriptor>> {
        Ok(self
            .list_forms()
            .await?
            .into_iter()
            .find(|form| form.id == form_id))
    }

    /// Field definitions of a form, in display order.
    async fn list_fields(&self, form_id: &str) -> Result<Vec<FieldDefinition>>;

    /// Header label of a field.
    fn field_label(&self, field: &FieldDefinition) -> String {
        field.display_label()
    }

    /// Option code → label tables of the form's choice fields.
    async fn options_map(&self, form_id: &str) -> Result<OptionsMap>;
}

/// Source of historical submissions for bulk import.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    /// All stored submissions of a form.
    async fn list_historical(&self, form_id: &str) -> Result<Vec<SubmissionRecord>>;
}

/// A newly created destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDestination {
    pub id: DestinationId,
    pub url: String,
}

/// The external tabular store rows are written to.
///
/// Implementations report a deleted destination as
/// [`crate::Error::DestinationMissing`], a missing credential as
/// [`crate::Error::Authentication`], and transport failures as
/// [`crate::Error::DestinationUnavailable`].
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Create a destination with the given title and header row.
    async fn create(&self, title: &str, headers: &[String]) -> Result<CreatedDestination>;

    /// Replace the header row.
    async fn set_headers(&self, destination_id: &str, headers: &[String]) -> Result<()>;

    /// Current header row.
    async fn get_headers(&self, destination_id: &str) -> Result<Vec<String>>;

    /// Append rows after the last row. A single call is atomic.
    async fn append_rows(&self, destination_id: &str, rows: &[Row]) -> Result<()>;

    /// Whether the destination still exists.
    async fn verify_exists(&self, destination_id: &str) -> Result<bool>;
}

/// Persistence of form → destination mappings.
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn load(&self, form_id: &str) -> Result<Option<FormSyncState>>;

    async fn save(&self, state: &FormSyncState) -> Result<()>;

    async fn delete(&self, form_id: &str) -> Result<()>;
}

/// Operator-facing activity sink. Recording never fails from the caller's
/// point of view; implementations log their own failures.
#[async_trait]
pub trait SyncNotifier: Send + Sync {
    async fn record_success(&self, form_id: &str, record_id: &str);

    async fn record_error(&self, form_id: &str, record_id: Option<&str>, message: &str);
}

//! # Formsync Engine
//!
//! Mirrors form submissions into an external tabular store, one destination
//! sheet per form and one row per submission.
//!
//! The engine holds the pure parts of the pipeline and an orchestrator that
//! drives them. Everything that touches the outside world (form schemas,
//! stored submissions, the tabular store, mapping persistence, the activity
//! sink) is reached through the traits in [`ports`].
//!
//! ## Pipeline
//!
//! - [`schema::flatten`] turns a form's field definitions into an ordered list
//!   of columns. Compound fields such as names or addresses expand into one
//!   column per enabled part; layout-only fields produce none.
//! - [`ValueResolver`] maps a submission onto those columns, translating
//!   option codes to labels and rendering lists, nested values and markup as
//!   plain cell text.
//! - [`HeaderReconciler`] compares the live header row with the fresh one and
//!   only ever appends. Columns are never removed or reordered, so existing
//!   rows stay aligned.
//! - [`SyncOrchestrator`] provisions destinations, syncs single submissions,
//!   bulk-imports history in paced batches and recovers from deleted
//!   destinations by provisioning new ones.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use formsync_engine::memory::{
//!     MemoryMappingStore, MemorySchemaProvider, MemorySubmissionSource, MemoryTabularStore,
//! };
//! use formsync_engine::{
//!     ActivityLog, Collaborators, FieldDefinition, FormDescriptor, SubmissionRecord,
//!     SyncConfig, SyncOrchestrator, SyncOutcome,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let schema = Arc::new(MemorySchemaProvider::new());
//! schema.put_form(
//!     FormDescriptor::new("7", "Contact"),
//!     vec![FieldDefinition::new("email-1", "email").with_label("Email")],
//! );
//! let store = Arc::new(MemoryTabularStore::default());
//!
//! let orchestrator = SyncOrchestrator::new(
//!     SyncConfig::default().with_site_name("Acme"),
//!     Collaborators {
//!         schema,
//!         submissions: Arc::new(MemorySubmissionSource::new()),
//!         store: store.clone(),
//!         mappings: Arc::new(MemoryMappingStore::new()),
//!         notifier: Arc::new(ActivityLog::default()),
//!     },
//! );
//!
//! let state = orchestrator.provision("7").await.unwrap();
//! let record = SubmissionRecord::new("1", chrono::Utc::now())
//!     .with_value("email-1", json!("ann@example.com"));
//!
//! let outcome = orchestrator.sync_one("7", &record).await.unwrap();
//! assert!(matches!(outcome, SyncOutcome::Appended { .. }));
//! assert_eq!(store.sheet(&state.destination_id).unwrap().rows.len(), 1);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod locks;
pub mod log;
pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod reconcile;
pub mod record;
pub mod resolve;
pub mod schema;
pub mod state;

// Re-export main types at crate root
pub use config::{SyncConfig, DEFAULT_BATCH_PAUSE, DEFAULT_BATCH_SIZE};
pub use error::{Error, Result};
pub use locks::HeaderLocks;
pub use log::{ActivityLog, LogStatus, SyncLogEntry, DEFAULT_LOG_RETENTION};
pub use orchestrator::{
    BatchError, Collaborators, FormError, ImportReport, SyncAllReport, SyncOrchestrator,
    SyncOutcome,
};
pub use ports::{
    CreatedDestination, MappingStore, SchemaProvider, SubmissionSource, SyncNotifier,
    TabularStore,
};
pub use reconcile::{reconcile_headers, HeaderAction, HeaderReconciler, RowLayout};
pub use record::{SubmissionMeta, SubmissionRecord};
pub use resolve::{OptionLabels, OptionsMap, ValueResolver};
pub use schema::{
    flatten, header_row, ColumnKind, FieldDefinition, FieldKind, FlattenedColumn,
    FormDescriptor, StandardColumn,
};
pub use state::{FormSyncState, MappingStatus};

/// Type aliases for clarity
pub type FormId = String;
pub type FieldId = String;
pub type RecordId = String;
pub type DestinationId = String;
/// One row of cell text, in header order.
pub type Row = Vec<String>;

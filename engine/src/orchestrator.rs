//! Sync orchestration.
//!
//! The [`SyncOrchestrator`] owns the form → destination mapping lifecycle and
//! drives every write to the tabular store:
//!
//! ```text
//!  Unmapped ──provision──► Mapped
//!     ▲                      │
//!     └──destination missing─┤
//!     └──operator resync─────┘  (discard, then provision again)
//! ```
//!
//! Discarding a mapping orphans the old destination; nothing is migrated.
//! No operation retries on its own. Every failure is written to the
//! [`SyncNotifier`] and returned to the caller, and re-running the same
//! operation is the retry.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::locks::HeaderLocks;
use crate::ports::{MappingStore, SchemaProvider, SubmissionSource, SyncNotifier, TabularStore};
use crate::reconcile::{HeaderAction, HeaderReconciler, RowLayout};
use crate::resolve::{OptionsMap, ValueResolver};
use crate::schema::{flatten_with, header_row, FlattenedColumn, FormDescriptor};
use crate::state::{FormSyncState, MappingStatus};
use crate::{DestinationId, FormId, Row, SubmissionRecord};

/// The external services an orchestrator works with.
#[derive(Clone)]
pub struct Collaborators {
    pub schema: Arc<dyn SchemaProvider>,
    pub submissions: Arc<dyn SubmissionSource>,
    pub store: Arc<dyn TabularStore>,
    pub mappings: Arc<dyn MappingStore>,
    pub notifier: Arc<dyn SyncNotifier>,
}

/// Result of syncing one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum SyncOutcome {
    /// The form has no destination; nothing was written
    Skipped,
    /// Exactly one row was appended
    #[serde(rename_all = "camelCase")]
    Appended { destination_id: DestinationId },
}

/// A form whose sync failed during [`SyncOrchestrator::sync_all_forms`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormError {
    pub form_id: FormId,
    pub message: String,
}

/// Per-form outcome of [`SyncOrchestrator::sync_all_forms`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAllReport {
    /// Forms that got a new destination
    pub created: Vec<FormId>,
    /// Forms whose destination was verified
    pub skipped: Vec<FormId>,
    pub errored: Vec<FormError>,
}

/// A failed bulk-import batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchError {
    /// 1-based batch number
    pub batch: usize,
    /// Rows in the batch, all counted as failed
    pub rows: usize,
    pub message: String,
}

/// Result of [`SyncOrchestrator::import_existing`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub failed: usize,
    pub total: usize,
    pub errors: Vec<BatchError>,
}

impl ImportReport {
    /// Some batches failed while others succeeded.
    pub fn is_partial(&self) -> bool {
        self.failed > 0 && self.imported > 0
    }

    /// Every row was imported.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.imported == self.total
    }
}

/// Columns and option tables of a form, derived fresh for each operation.
struct FormLayout {
    columns: Vec<FlattenedColumn>,
    options: OptionsMap,
}

/// Drives provisioning, single-record sync and bulk import.
pub struct SyncOrchestrator {
    config: SyncConfig,
    schema: Arc<dyn SchemaProvider>,
    submissions: Arc<dyn SubmissionSource>,
    store: Arc<dyn TabularStore>,
    mappings: Arc<dyn MappingStore>,
    notifier: Arc<dyn SyncNotifier>,
    locks: HeaderLocks,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(config: SyncConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            schema: collaborators.schema,
            submissions: collaborators.submissions,
            store: collaborators.store,
            mappings: collaborators.mappings,
            notifier: collaborators.notifier,
            locks: HeaderLocks::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current mapping state of a form.
    pub async fn status(&self, form_id: &str) -> Result<MappingStatus> {
        Ok(self.mappings.load(form_id).await?.into())
    }

    /// Flattened columns the form's schema currently produces.
    pub async fn columns(&self, form_id: &str) -> Result<Vec<FlattenedColumn>> {
        Ok(self.load_layout(form_id).await?.columns)
    }

    /// Create a destination for a form and record the mapping.
    ///
    /// A store that rejects creation yields [`Error::DestinationCreate`]; a
    /// missing credential yields [`Error::Authentication`]. Neither is retried.
    /// An existing mapping is replaced without being verified; use
    /// [`Self::sync_all_forms`] to provision only where needed.
    pub async fn provision(&self, form_id: &str) -> Result<FormSyncState> {
        let result = self.try_provision(form_id).await;
        self.report_failure(form_id, None, result).await
    }

    /// Sync one submission into its form's destination.
    ///
    /// Unmapped forms are skipped. Headers are reconciled first, then exactly
    /// one row is appended. A failed append is not retried or re-queued.
    pub async fn sync_one(
        &self,
        form_id: &str,
        record: &SubmissionRecord,
    ) -> Result<SyncOutcome> {
        let result = self.try_sync_one(form_id, record).await;
        if let Ok(SyncOutcome::Appended { .. }) = &result {
            self.notifier.record_success(form_id, &record.id).await;
        }
        self.report_failure(form_id, Some(record.id.as_str()), result).await
    }

    /// Make sure every known form has a reachable destination.
    ///
    /// A failure on one form is reported for that form only.
    pub async fn sync_all_forms(&self) -> Result<SyncAllReport> {
        let forms = self.schema.list_forms().await?;
        let mut report = SyncAllReport::default();

        for form in forms {
            match self.ensure_destination(&form).await {
                Ok(true) => report.created.push(form.id),
                Ok(false) => report.skipped.push(form.id),
                Err(err) => {
                    let message = err.to_string();
                    self.notifier.record_error(&form.id, None, &message).await;
                    report.errored.push(FormError {
                        form_id: form.id,
                        message,
                    });
                }
            }
        }

        tracing::info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            errored = report.errored.len(),
            "synced all forms"
        );
        Ok(report)
    }

    /// Discard a form's mapping and provision a fresh destination.
    pub async fn resync(&self, form_id: &str) -> Result<FormSyncState> {
        let result = self.try_resync(form_id).await;
        self.report_failure(form_id, None, result).await
    }

    /// Copy all historical submissions of a mapped form into its destination.
    ///
    /// Records are written oldest first in batches of
    /// [`SyncConfig::batch_size`], pausing [`SyncConfig::batch_pause`] between
    /// batches. A failed batch is counted as failed as a whole and the
    /// following batches still run.
    pub async fn import_existing(&self, form_id: &str) -> Result<ImportReport> {
        let result = self.try_import(form_id).await;
        self.report_failure(form_id, None, result).await
    }

    async fn try_provision(&self, form_id: &str) -> Result<FormSyncState> {
        let form = self.find_form(form_id).await?;
        self.provision_form(&form).await
    }

    async fn try_resync(&self, form_id: &str) -> Result<FormSyncState> {
        let form = self.find_form(form_id).await?;
        if let Some(state) = self.mappings.load(form_id).await? {
            self.discard(&state).await?;
        }
        self.provision_form(&form).await
    }

    async fn try_sync_one(
        &self,
        form_id: &str,
        record: &SubmissionRecord,
    ) -> Result<SyncOutcome> {
        let Some(state) = self.mappings.load(form_id).await? else {
            tracing::debug!(form_id, record_id = %record.id, "form not mapped, skipping");
            return Ok(SyncOutcome::Skipped);
        };

        let result = self.append_record(&state, record).await;
        self.discard_if_missing(&state, result).await?;

        tracing::debug!(
            form_id,
            record_id = %record.id,
            destination_id = %state.destination_id,
            "appended submission"
        );
        Ok(SyncOutcome::Appended {
            destination_id: state.destination_id,
        })
    }

    async fn append_record(
        &self,
        state: &FormSyncState,
        record: &SubmissionRecord,
    ) -> Result<()> {
        let layout = self.load_layout(&state.form_id).await?;
        let headers = self
            .sync_headers(&state.destination_id, &layout.columns)
            .await?;

        let row_layout = RowLayout::new(&headers, &layout.columns);
        let row = self.build_row(&row_layout, &layout, record);
        self.store
            .append_rows(&state.destination_id, std::slice::from_ref(&row))
            .await
    }

    async fn try_import(&self, form_id: &str) -> Result<ImportReport> {
        let state = self
            .mappings
            .load(form_id)
            .await?
            .ok_or_else(|| Error::NotMapped(form_id.to_string()))?;

        let mut records = self.submissions.list_historical(form_id).await?;
        // Stable, so records sharing a timestamp keep the source's order.
        records.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));

        let mut report = ImportReport {
            total: records.len(),
            ..ImportReport::default()
        };
        if records.is_empty() {
            return Ok(report);
        }

        let layout = self.load_layout(form_id).await?;
        let headers = self
            .sync_headers(&state.destination_id, &layout.columns)
            .await;
        let headers = self.discard_if_missing(&state, headers).await?;
        let row_layout = RowLayout::new(&headers, &layout.columns);

        let rows: Vec<Row> = records
            .iter()
            .map(|record| self.build_row(&row_layout, &layout, record))
            .collect();

        let batch_size = self.config.batch_size.max(1);
        let batch_count = rows.len().div_ceil(batch_size);

        for (index, batch) in rows.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_pause.is_zero() {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            match self.store.append_rows(&state.destination_id, batch).await {
                Ok(()) => report.imported += batch.len(),
                Err(err) => {
                    let message = err.to_string();
                    tracing::warn!(
                        form_id,
                        batch = index + 1,
                        batch_count,
                        rows = batch.len(),
                        error = %message,
                        "import batch failed"
                    );
                    let note = format!(
                        "import batch {} of {} failed: {}",
                        index + 1,
                        batch_count,
                        message
                    );
                    self.notifier.record_error(form_id, None, &note).await;
                    report.failed += batch.len();
                    report.errors.push(BatchError {
                        batch: index + 1,
                        rows: batch.len(),
                        message,
                    });
                }
            }
        }

        tracing::info!(
            form_id,
            imported = report.imported,
            failed = report.failed,
            total = report.total,
            "import finished"
        );
        Ok(report)
    }

    /// Returns whether a new destination was provisioned.
    async fn ensure_destination(&self, form: &FormDescriptor) -> Result<bool> {
        let Some(state) = self.mappings.load(&form.id).await? else {
            self.provision_form(form).await?;
            return Ok(true);
        };

        match self.store.verify_exists(&state.destination_id).await {
            Ok(true) => Ok(false),
            Ok(false) | Err(Error::DestinationMissing(_)) => {
                tracing::warn!(
                    form_id = %form.id,
                    destination_id = %state.destination_id,
                    "destination missing, provisioning a new one"
                );
                self.discard(&state).await?;
                self.provision_form(form).await?;
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    async fn provision_form(&self, form: &FormDescriptor) -> Result<FormSyncState> {
        let layout = self.load_layout(&form.id).await?;
        let headers = header_row(&layout.columns);
        let title = self.config.destination_title(&form.title, &form.id);

        let created = self
            .store
            .create(&title, &headers)
            .await
            .map_err(|err| match err {
                Error::Authentication(msg) => Error::Authentication(msg),
                Error::DestinationCreate(msg) => Error::DestinationCreate(msg),
                other => Error::DestinationCreate(other.to_string()),
            })?;

        let state = FormSyncState::new(form.id.clone(), created.id, created.url, Utc::now());
        self.mappings.save(&state).await?;

        tracing::info!(
            form_id = %form.id,
            destination_id = %state.destination_id,
            columns = headers.len(),
            "provisioned destination"
        );
        Ok(state)
    }

    /// Bring the destination's header row up to date and return it.
    async fn sync_headers(
        &self,
        destination_id: &str,
        columns: &[FlattenedColumn],
    ) -> Result<Vec<String>> {
        let _guard = self.locks.acquire(destination_id).await;

        let current = self.store.get_headers(destination_id).await?;
        let reconciler = HeaderReconciler::new(&current);
        let action = reconciler.reconcile(&reconciler.targets(columns));

        match &action {
            HeaderAction::NoOp => Ok(current),
            HeaderAction::Append(labels) => {
                tracing::info!(destination_id, added = ?labels, "appending header columns");
                let headers = action.apply(&current);
                self.store.set_headers(destination_id, &headers).await?;
                Ok(headers)
            }
        }
    }

    fn build_row(
        &self,
        row_layout: &RowLayout,
        layout: &FormLayout,
        record: &SubmissionRecord,
    ) -> Row {
        let resolved = ValueResolver::new(&layout.options)
            .with_formats(&self.config.date_format, &self.config.time_format)
            .resolve_row(&layout.columns, record);
        row_layout.arrange(&resolved)
    }

    async fn load_layout(&self, form_id: &str) -> Result<FormLayout> {
        let fields = self.schema.list_fields(form_id).await?;
        let columns = flatten_with(&fields, |field| self.schema.field_label(field));
        let options = self.schema.options_map(form_id).await?;
        Ok(FormLayout { columns, options })
    }

    async fn find_form(&self, form_id: &str) -> Result<FormDescriptor> {
        self.schema
            .form(form_id)
            .await?
            .ok_or_else(|| Error::FormNotFound(form_id.to_string()))
    }

    async fn discard(&self, state: &FormSyncState) -> Result<()> {
        self.mappings.delete(&state.form_id).await?;
        self.locks.forget(&state.destination_id);
        tracing::info!(
            form_id = %state.form_id,
            destination_id = %state.destination_id,
            "discarded mapping"
        );
        Ok(())
    }

    /// Pass `result` through, discarding the mapping first when it reports
    /// the destination as gone.
    async fn discard_if_missing<T>(
        &self,
        state: &FormSyncState,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(err) = &result {
            if err.is_destination_missing() {
                if let Err(discard_err) = self.discard(state).await {
                    tracing::warn!(
                        form_id = %state.form_id,
                        error = %discard_err,
                        "could not discard mapping"
                    );
                }
            }
        }
        result
    }

    async fn report_failure<T>(
        &self,
        form_id: &str,
        record_id: Option<&str>,
        result: Result<T>,
    ) -> Result<T> {
        if let Err(err) = &result {
            self.notifier
                .record_error(form_id, record_id, &err.to_string())
                .await;
        }
        result
    }
}

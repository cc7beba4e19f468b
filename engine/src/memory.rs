//! In-memory collaborators.
//!
//! Complete implementations of every collaborator trait, holding their data in
//! process memory. Useful for embedding the engine without external services
//! and for exercising the orchestrator in tests. The tabular store can be told
//! to fail specific calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::ports::{
    CreatedDestination, MappingStore, SchemaProvider, SubmissionSource, TabularStore,
};
use crate::resolve::OptionsMap;
use crate::schema::{FieldDefinition, FormDescriptor};
use crate::state::FormSyncState;
use crate::{DestinationId, FormId, Row, SubmissionRecord};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct FormEntry {
    form: FormDescriptor,
    fields: Vec<FieldDefinition>,
    options: OptionsMap,
}

/// Schema provider over a fixed, editable list of forms.
#[derive(Debug, Default)]
pub struct MemorySchemaProvider {
    forms: Mutex<Vec<FormEntry>>,
}

impl MemorySchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a form, or replace the one with the same id.
    pub fn put_form(&self, form: FormDescriptor, fields: Vec<FieldDefinition>) {
        let mut forms = lock(&self.forms);
        match forms.iter_mut().find(|entry| entry.form.id == form.id) {
            Some(entry) => {
                entry.form = form;
                entry.fields = fields;
            }
            None => forms.push(FormEntry {
                form,
                fields,
                options: OptionsMap::new(),
            }),
        }
    }

    /// Replace the field list of an existing form.
    pub fn set_fields(&self, form_id: &str, fields: Vec<FieldDefinition>) -> Result<()> {
        let mut forms = lock(&self.forms);
        let entry = forms
            .iter_mut()
            .find(|entry| entry.form.id == form_id)
            .ok_or_else(|| Error::FormNotFound(form_id.to_string()))?;
        entry.fields = fields;
        Ok(())
    }

    /// Replace the option tables of an existing form.
    pub fn set_options(&self, form_id: &str, options: OptionsMap) -> Result<()> {
        let mut forms = lock(&self.forms);
        let entry = forms
            .iter_mut()
            .find(|entry| entry.form.id == form_id)
            .ok_or_else(|| Error::FormNotFound(form_id.to_string()))?;
        entry.options = options;
        Ok(())
    }

    fn entry(&self, form_id: &str) -> Result<FormEntry> {
        lock(&self.forms)
            .iter()
            .find(|entry| entry.form.id == form_id)
            .cloned()
            .ok_or_else(|| Error::FormNotFound(form_id.to_string()))
    }
}

#[async_trait]
impl SchemaProvider for MemorySchemaProvider {
    async fn list_forms(&self) -> Result<Vec<FormDescriptor>> {
        Ok(lock(&self.forms).iter().map(|e| e.form.clone()).collect())
    }

    async fn list_fields(&self, form_id: &str) -> Result<Vec<FieldDefinition>> {
        Ok(self.entry(form_id)?.fields)
    }

    async fn options_map(&self, form_id: &str) -> Result<OptionsMap> {
        Ok(self.entry(form_id)?.options)
    }
}

/// Submission source holding records per form, in insertion order.
#[derive(Debug, Default)]
pub struct MemorySubmissionSource {
    records: DashMap<FormId, Vec<SubmissionRecord>>,
}

impl MemorySubmissionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, form_id: &str, record: SubmissionRecord) {
        self.records
            .entry(form_id.to_string())
            .or_default()
            .push(record);
    }
}

#[async_trait]
impl SubmissionSource for MemorySubmissionSource {
    async fn list_historical(&self, form_id: &str) -> Result<Vec<SubmissionRecord>> {
        Ok(self
            .records
            .get(form_id)
            .map(|records| records.clone())
            .unwrap_or_default())
    }
}

/// Contents of one in-memory destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemorySheet {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// Tabular store keeping sheets in memory.
#[derive(Debug)]
pub struct MemoryTabularStore {
    base_url: String,
    sheets: DashMap<DestinationId, MemorySheet>,
    append_calls: AtomicUsize,
    failing_appends: Mutex<HashSet<usize>>,
    create_error: Mutex<Option<Error>>,
    verify_error: Mutex<Option<Error>>,
}

impl Default for MemoryTabularStore {
    fn default() -> Self {
        Self::new("memory://sheets")
    }
}

impl MemoryTabularStore {
    /// Create a store whose destination URLs start with `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            sheets: DashMap::new(),
            append_calls: AtomicUsize::new(0),
            failing_appends: Mutex::new(HashSet::new()),
            create_error: Mutex::new(None),
            verify_error: Mutex::new(None),
        }
    }

    /// Snapshot of a sheet.
    pub fn sheet(&self, destination_id: &str) -> Option<MemorySheet> {
        self.sheets.get(destination_id).map(|sheet| sheet.clone())
    }

    /// Delete a sheet, as if removed by hand in the store.
    pub fn remove(&self, destination_id: &str) -> bool {
        self.sheets.remove(destination_id).is_some()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Number of `append_rows` calls so far, failed ones included.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Make the `call`-th `append_rows` call (1-based) fail.
    pub fn fail_append_call(&self, call: usize) {
        lock(&self.failing_appends).insert(call);
    }

    /// Make every following `create` call fail with `error`.
    pub fn fail_create_with(&self, error: Error) {
        *lock(&self.create_error) = Some(error);
    }

    /// Make every following `verify_exists` call fail with `error`.
    pub fn fail_verify_with(&self, error: Error) {
        *lock(&self.verify_error) = Some(error);
    }

    fn missing(destination_id: &str) -> Error {
        Error::DestinationMissing(destination_id.to_string())
    }
}

#[async_trait]
impl TabularStore for MemoryTabularStore {
    async fn create(&self, title: &str, headers: &[String]) -> Result<CreatedDestination> {
        if let Some(error) = lock(&self.create_error).clone() {
            return Err(error);
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        self.sheets.insert(
            id.clone(),
            MemorySheet {
                title: title.to_string(),
                headers: headers.to_vec(),
                rows: Vec::new(),
            },
        );

        Ok(CreatedDestination {
            url: format!("{}/{}", self.base_url, id),
            id,
        })
    }

    async fn set_headers(&self, destination_id: &str, headers: &[String]) -> Result<()> {
        let mut sheet = self
            .sheets
            .get_mut(destination_id)
            .ok_or_else(|| Self::missing(destination_id))?;
        sheet.headers = headers.to_vec();
        Ok(())
    }

    async fn get_headers(&self, destination_id: &str) -> Result<Vec<String>> {
        self.sheets
            .get(destination_id)
            .map(|sheet| sheet.headers.clone())
            .ok_or_else(|| Self::missing(destination_id))
    }

    async fn append_rows(&self, destination_id: &str, rows: &[Row]) -> Result<()> {
        let call = self.append_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if lock(&self.failing_appends).contains(&call) {
            return Err(Error::DestinationUnavailable(format!(
                "append call {} rejected",
                call
            )));
        }

        let mut sheet = self
            .sheets
            .get_mut(destination_id)
            .ok_or_else(|| Self::missing(destination_id))?;
        sheet.rows.extend(rows.iter().cloned());
        Ok(())
    }

    async fn verify_exists(&self, destination_id: &str) -> Result<bool> {
        if let Some(error) = lock(&self.verify_error).clone() {
            return Err(error);
        }
        Ok(self.sheets.contains_key(destination_id))
    }
}

/// Mapping store keeping states in memory.
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    states: DashMap<FormId, FormSyncState>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All states keyed by form, for inspection.
    pub fn snapshot(&self) -> HashMap<FormId, FormSyncState> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn load(&self, form_id: &str) -> Result<Option<FormSyncState>> {
        Ok(self.states.get(form_id).map(|state| state.clone()))
    }

    async fn save(&self, state: &FormSyncState) -> Result<()> {
        self.states.insert(state.form_id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, form_id: &str) -> Result<()> {
        self.states.remove(form_id);
        Ok(())
    }
}

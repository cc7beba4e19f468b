//! Form endpoints: schema registration, submissions, import and resync.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use formsync_engine::{
    header_row, FieldDefinition, FormDescriptor, FormSyncState, ImportReport, MappingStatus,
    OptionsMap, SubmissionMeta, SubmissionRecord, SyncOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, Result};
use crate::AppState;

/// Request body registering or updating a form.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFormRequest {
    pub title: String,
    pub fields: Vec<FieldDefinition>,
    /// Option code → label tables of choice fields
    #[serde(default)]
    pub options: OptionsMap,
}

/// Response to a form registration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterFormResponse {
    pub form_id: String,
    /// Header row the form currently flattens to
    pub headers: Vec<String>,
}

/// Request body of a new submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Entry id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Submission time; now when absent
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    pub values: Map<String, Value>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Response to a submission. The submission is stored even when syncing it
/// fails; `error` then says why.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub record_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Create form routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/forms/{form_id}", put(register_handler))
        .route("/forms/{form_id}/submissions", post(submit_handler))
        .route("/forms/{form_id}/import", post(import_handler))
        .route("/forms/{form_id}/resync", post(resync_handler))
        .route("/forms/{form_id}/mapping", get(mapping_handler))
}

/// PUT /forms/{form_id} - Register a form schema or replace it.
///
/// Existing sheets pick up new columns on the next write to them.
async fn register_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(form_id): Path<String>,
    Json(request): Json<RegisterFormRequest>,
) -> Result<Json<RegisterFormResponse>> {
    if request.title.trim().is_empty() {
        return Err(AppError::BadRequest("form title must not be empty".to_string()));
    }

    let form = FormDescriptor::new(form_id.clone(), request.title);
    db::upsert_form(&state.pool, &form, &request.fields, &request.options).await?;

    let columns = state.orchestrator.columns(&form_id).await?;
    tracing::info!(form_id = %form_id, columns = columns.len(), "registered form");

    Ok(Json(RegisterFormResponse {
        form_id,
        headers: header_row(&columns),
    }))
}

/// POST /forms/{form_id}/submissions - Store a submission and sync it.
async fn submit_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(form_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    if db::get_form(&state.pool, &form_id).await?.is_none() {
        return Err(AppError::NotFound(format!("form {}", form_id)));
    }

    let record = submission_from_request(request, &headers);
    db::insert_submission(&state.pool, &form_id, &record).await?;

    let response = match state.orchestrator.sync_one(&form_id, &record).await {
        Ok(outcome) => SubmitResponse {
            record_id: record.id,
            outcome: Some(outcome),
            error: None,
        },
        Err(err) => SubmitResponse {
            record_id: record.id,
            outcome: None,
            error: Some(err.to_string()),
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /forms/{form_id}/import - Copy all stored submissions into the sheet.
async fn import_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<ImportReport>> {
    let report = state.orchestrator.import_existing(&form_id).await?;
    Ok(Json(report))
}

/// POST /forms/{form_id}/resync - Point the form at a fresh sheet.
async fn resync_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<FormSyncState>> {
    let state = state.orchestrator.resync(&form_id).await?;
    Ok(Json(state))
}

/// GET /forms/{form_id}/mapping - Current mapping of a form.
async fn mapping_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(form_id): Path<String>,
) -> Result<Json<MappingStatus>> {
    let status = state.orchestrator.status(&form_id).await?;
    Ok(Json(status))
}

/// Build a record from a request, filling origin metadata from the HTTP
/// headers when the body leaves it out.
fn submission_from_request(request: SubmitRequest, headers: &HeaderMap) -> SubmissionRecord {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let forwarded_for = header("x-forwarded-for")
        .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty());

    let id = request
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let record = SubmissionRecord::new(id, request.submitted_at.unwrap_or_else(Utc::now));
    SubmissionRecord {
        values: request.values,
        meta: SubmissionMeta {
            ip_address: request.ip_address.or(forwarded_for),
            user_agent: request.user_agent.or_else(|| header("user-agent")),
        },
        ..record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn request(body: Value) -> SubmitRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn metadata_falls_back_to_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.9, 172.16.0.1"));
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));

        let record = submission_from_request(request(json!({"values": {"a": 1}})), &headers);

        assert_eq!(record.meta.ip_address.as_deref(), Some("10.0.0.9"));
        assert_eq!(record.meta.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert!(!record.id.is_empty());
        assert_eq!(record.values["a"], json!(1));
    }

    #[test]
    fn body_metadata_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));

        let record = submission_from_request(
            request(json!({
                "id": "42",
                "submittedAt": "2024-03-09T14:05:07Z",
                "values": {},
                "ipAddress": "192.0.2.1",
                "userAgent": "importer"
            })),
            &headers,
        );

        assert_eq!(record.id, "42");
        assert_eq!(record.submitted_at.to_rfc3339(), "2024-03-09T14:05:07+00:00");
        assert_eq!(record.meta.ip_address.as_deref(), Some("192.0.2.1"));
        assert_eq!(record.meta.user_agent.as_deref(), Some("importer"));
    }
}

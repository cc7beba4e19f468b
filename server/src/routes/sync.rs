//! Bulk sync endpoint.

use axum::{extract::State, routing::post, Json, Router};
use formsync_engine::SyncAllReport;

use crate::auth::AuthUser;
use crate::error::Result;
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", post(sync_all_handler))
}

/// POST /sync - Make sure every form has a reachable sheet.
async fn sync_all_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<SyncAllReport>> {
    let report = state.orchestrator.sync_all_forms().await?;
    Ok(Json(report))
}

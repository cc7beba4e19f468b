//! Activity log endpoint.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use formsync_engine::SyncLogEntry;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db;
use crate::error::Result;
use crate::AppState;

/// Query parameters for the activity log.
#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    /// Maximum entries returned, capped at the retention size
    pub limit: Option<usize>,
}

/// Create activity routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/activity", get(activity_handler))
}

/// GET /activity - Most recent sync activity, newest first.
async fn activity_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<SyncLogEntry>>> {
    let retention = state.config.log_retention;
    let limit = query.limit.unwrap_or(retention).min(retention);

    let entries = db::recent_activity(&state.pool, limit as i64).await?;
    Ok(Json(entries))
}

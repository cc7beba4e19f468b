//! Sheet endpoints of the built-in tabular store.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::auth::AuthUser;
use crate::db::{self, StoredSheet};
use crate::error::{AppError, Result};
use crate::AppState;

/// Create sheet routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sheets/{sheet_id}", get(get_handler).delete(delete_handler))
}

/// GET /sheets/{sheet_id} - Headers and rows of a sheet.
async fn get_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(sheet_id): Path<String>,
) -> Result<Json<StoredSheet>> {
    db::get_sheet(&state.pool, &sheet_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("sheet {}", sheet_id)))
}

/// DELETE /sheets/{sheet_id} - Remove a sheet. The form mapped to it is
/// re-provisioned on its next sync.
async fn delete_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(sheet_id): Path<String>,
) -> Result<StatusCode> {
    if !db::delete_sheet(&state.pool, &sheet_id).await? {
        return Err(AppError::NotFound(format!("sheet {}", sheet_id)));
    }

    tracing::info!(sheet_id = %sheet_id, "deleted sheet");
    Ok(StatusCode::NO_CONTENT)
}

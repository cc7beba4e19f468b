//! HTTP route definitions.

mod activity;
mod forms;
mod health;
mod sheets;
mod sync;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(forms::routes())
        .merge(sync::routes())
        .merge(sheets::routes())
        .merge(activity::routes())
}

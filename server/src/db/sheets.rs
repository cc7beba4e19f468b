//! Destination sheets, stored in PostgreSQL.
//!
//! The server hosts its own tabular store: a sheet is a header row plus an
//! append-only list of rows. Sheets can be deleted through the API, which the
//! engine then sees as a missing destination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formsync_engine::{CreatedDestination, Error, Result as EngineResult, Row, TabularStore};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;

/// Tabular store over the `sheets` and `sheet_rows` tables.
#[derive(Debug, Clone)]
pub struct PgSheetStore {
    pool: PgPool,
    public_url: String,
}

impl PgSheetStore {
    /// Create a store whose destination URLs are served under `public_url`.
    pub fn new(pool: PgPool, public_url: impl Into<String>) -> Self {
        Self {
            pool,
            public_url: public_url.into(),
        }
    }

    fn sheet_url(&self, sheet_id: &str) -> String {
        format!("{}/sheets/{}", self.public_url, sheet_id)
    }
}

fn unavailable(err: sqlx::Error) -> Error {
    Error::DestinationUnavailable(err.to_string())
}

/// A sheet with all of its rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSheet {
    pub sheet_id: String,
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub created_at: DateTime<Utc>,
}

/// Load a sheet and its rows in append order.
pub async fn get_sheet(pool: &PgPool, sheet_id: &str) -> Result<Option<StoredSheet>, sqlx::Error> {
    let sheet: Option<(String, Json<Vec<String>>, DateTime<Utc>)> =
        sqlx::query_as("SELECT title, headers, created_at FROM sheets WHERE sheet_id = $1")
            .bind(sheet_id)
            .fetch_optional(pool)
            .await?;

    let Some((title, Json(headers), created_at)) = sheet else {
        return Ok(None);
    };

    let rows: Vec<Json<Row>> =
        sqlx::query_scalar("SELECT cells FROM sheet_rows WHERE sheet_id = $1 ORDER BY id")
            .bind(sheet_id)
            .fetch_all(pool)
            .await?;

    Ok(Some(StoredSheet {
        sheet_id: sheet_id.to_string(),
        title,
        headers,
        rows: rows.into_iter().map(|Json(cells)| cells).collect(),
        created_at,
    }))
}

/// Delete a sheet and its rows. Returns whether it existed.
pub async fn delete_sheet(pool: &PgPool, sheet_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sheets WHERE sheet_id = $1")
        .bind(sheet_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl TabularStore for PgSheetStore {
    async fn create(&self, title: &str, headers: &[String]) -> EngineResult<CreatedDestination> {
        let sheet_id = uuid::Uuid::new_v4().simple().to_string();

        sqlx::query("INSERT INTO sheets (sheet_id, title, headers) VALUES ($1, $2, $3)")
            .bind(&sheet_id)
            .bind(title)
            .bind(Json(headers))
            .execute(&self.pool)
            .await
            .map_err(|err| Error::DestinationCreate(err.to_string()))?;

        tracing::debug!(sheet_id = %sheet_id, title, "created sheet");
        Ok(CreatedDestination {
            url: self.sheet_url(&sheet_id),
            id: sheet_id,
        })
    }

    async fn set_headers(&self, destination_id: &str, headers: &[String]) -> EngineResult<()> {
        let result = sqlx::query("UPDATE sheets SET headers = $2 WHERE sheet_id = $1")
            .bind(destination_id)
            .bind(Json(headers))
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(Error::DestinationMissing(destination_id.to_string()));
        }
        Ok(())
    }

    async fn get_headers(&self, destination_id: &str) -> EngineResult<Vec<String>> {
        let headers: Option<Json<Vec<String>>> =
            sqlx::query_scalar("SELECT headers FROM sheets WHERE sheet_id = $1")
                .bind(destination_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        headers
            .map(|Json(headers)| headers)
            .ok_or_else(|| Error::DestinationMissing(destination_id.to_string()))
    }

    async fn append_rows(&self, destination_id: &str, rows: &[Row]) -> EngineResult<()> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        // Lock the sheet row so a concurrent delete cannot interleave.
        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM sheets WHERE sheet_id = $1 FOR SHARE")
                .bind(destination_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unavailable)?;
        if exists.is_none() {
            return Err(Error::DestinationMissing(destination_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO sheet_rows (sheet_id, cells)
            SELECT $1, t.cells
            FROM jsonb_array_elements($2) WITH ORDINALITY AS t(cells, ord)
            ORDER BY t.ord
            "#,
        )
        .bind(destination_id)
        .bind(Json(rows))
        .execute(&mut *tx)
        .await
        .map_err(unavailable)?;

        tx.commit().await.map_err(unavailable)?;
        Ok(())
    }

    async fn verify_exists(&self, destination_id: &str) -> EngineResult<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sheets WHERE sheet_id = $1)")
            .bind(destination_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unavailable)
    }
}

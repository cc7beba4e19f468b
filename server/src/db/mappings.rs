//! Form mappings table.

use async_trait::async_trait;
use formsync_engine::{Error, FormSyncState, MappingStore, Result as EngineResult};
use sqlx::{PgPool, Row};

/// Mapping store over the `form_mappings` table.
#[derive(Debug, Clone)]
pub struct PgMappingStore {
    pool: PgPool,
}

impl PgMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn mapping_error(err: sqlx::Error) -> Error {
    Error::Mapping(err.to_string())
}

#[async_trait]
impl MappingStore for PgMappingStore {
    async fn load(&self, form_id: &str) -> EngineResult<Option<FormSyncState>> {
        let row = sqlx::query(
            r#"
            SELECT form_id, destination_id, destination_url, created_at
            FROM form_mappings
            WHERE form_id = $1
            "#,
        )
        .bind(form_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(mapping_error)?;

        row.map(|row| {
            Ok::<_, Error>(FormSyncState {
                form_id: row.try_get("form_id").map_err(mapping_error)?,
                destination_id: row.try_get("destination_id").map_err(mapping_error)?,
                destination_url: row.try_get("destination_url").map_err(mapping_error)?,
                created_at: row.try_get("created_at").map_err(mapping_error)?,
            })
        })
        .transpose()
    }

    async fn save(&self, state: &FormSyncState) -> EngineResult<()> {
        sqlx::query(
            r#"
            INSERT INTO form_mappings (form_id, destination_id, destination_url, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (form_id) DO UPDATE SET
                destination_id = EXCLUDED.destination_id,
                destination_url = EXCLUDED.destination_url,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&state.form_id)
        .bind(&state.destination_id)
        .bind(&state.destination_url)
        .bind(state.created_at)
        .execute(&self.pool)
        .await
        .map_err(mapping_error)?;

        Ok(())
    }

    async fn delete(&self, form_id: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM form_mappings WHERE form_id = $1")
            .bind(form_id)
            .execute(&self.pool)
            .await
            .map_err(mapping_error)?;

        Ok(())
    }
}

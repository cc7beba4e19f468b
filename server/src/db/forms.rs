//! Forms and submissions tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formsync_engine::{
    Error, FieldDefinition, FormDescriptor, OptionsMap, Result as EngineResult, SchemaProvider,
    SubmissionMeta, SubmissionRecord, SubmissionSource,
};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

/// Schema provider and submission source over the `forms` and
/// `submissions` tables.
#[derive(Debug, Clone)]
pub struct PgFormRepository {
    pool: PgPool,
}

impl PgFormRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn schema_error(err: sqlx::Error) -> Error {
    Error::Schema(err.to_string())
}

/// Insert or replace a form's title, fields and option tables.
pub async fn upsert_form(
    pool: &PgPool,
    form: &FormDescriptor,
    fields: &[FieldDefinition],
    options: &OptionsMap,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO forms (form_id, title, fields, options)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (form_id) DO UPDATE SET
            title = EXCLUDED.title,
            fields = EXCLUDED.fields,
            options = EXCLUDED.options,
            updated_at = NOW()
        "#,
    )
    .bind(&form.id)
    .bind(&form.title)
    .bind(Json(fields))
    .bind(Json(options))
    .execute(pool)
    .await?;

    Ok(())
}

/// Look up one form.
pub async fn get_form(pool: &PgPool, form_id: &str) -> Result<Option<FormDescriptor>, sqlx::Error> {
    let row = sqlx::query("SELECT form_id, title FROM forms WHERE form_id = $1")
        .bind(form_id)
        .fetch_optional(pool)
        .await?;

    row.map(|row| {
        Ok::<_, sqlx::Error>(FormDescriptor {
            id: row.try_get("form_id")?,
            title: row.try_get("title")?,
        })
    })
    .transpose()
}

/// Store a submission. Resubmitted record ids are stored again.
pub async fn insert_submission(
    pool: &PgPool,
    form_id: &str,
    record: &SubmissionRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO submissions (form_id, record_id, submitted_at, payload, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(form_id)
    .bind(&record.id)
    .bind(record.submitted_at)
    .bind(Json(&record.values))
    .bind(&record.meta.ip_address)
    .bind(&record.meta.user_agent)
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl SchemaProvider for PgFormRepository {
    async fn list_forms(&self) -> EngineResult<Vec<FormDescriptor>> {
        let rows = sqlx::query("SELECT form_id, title FROM forms ORDER BY created_at, form_id")
            .fetch_all(&self.pool)
            .await
            .map_err(schema_error)?;

        rows.iter()
            .map(|row| {
                Ok::<_, Error>(FormDescriptor {
                    id: row.try_get("form_id").map_err(schema_error)?,
                    title: row.try_get("title").map_err(schema_error)?,
                })
            })
            .collect()
    }

    async fn form(&self, form_id: &str) -> EngineResult<Option<FormDescriptor>> {
        get_form(&self.pool, form_id).await.map_err(schema_error)
    }

    async fn list_fields(&self, form_id: &str) -> EngineResult<Vec<FieldDefinition>> {
        let fields: Option<Json<Vec<FieldDefinition>>> =
            sqlx::query_scalar("SELECT fields FROM forms WHERE form_id = $1")
                .bind(form_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(schema_error)?;

        fields
            .map(|Json(fields)| fields)
            .ok_or_else(|| Error::FormNotFound(form_id.to_string()))
    }

    async fn options_map(&self, form_id: &str) -> EngineResult<OptionsMap> {
        let options: Option<Json<OptionsMap>> =
            sqlx::query_scalar("SELECT options FROM forms WHERE form_id = $1")
                .bind(form_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(schema_error)?;

        options
            .map(|Json(options)| options)
            .ok_or_else(|| Error::FormNotFound(form_id.to_string()))
    }
}

#[async_trait]
impl SubmissionSource for PgFormRepository {
    async fn list_historical(&self, form_id: &str) -> EngineResult<Vec<SubmissionRecord>> {
        let source_error = |err: sqlx::Error| Error::Source(err.to_string());

        let rows = sqlx::query(
            r#"
            SELECT record_id, submitted_at, payload, ip_address, user_agent
            FROM submissions
            WHERE form_id = $1
            ORDER BY submitted_at, id
            "#,
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await
        .map_err(source_error)?;

        rows.iter()
            .map(|row| {
                let submitted_at: DateTime<Utc> =
                    row.try_get("submitted_at").map_err(source_error)?;
                let payload: serde_json::Value = row.try_get("payload").map_err(source_error)?;
                let record_id: String = row.try_get("record_id").map_err(source_error)?;

                Ok::<_, Error>(
                    SubmissionRecord::with_values(record_id, submitted_at, payload).with_meta(
                        SubmissionMeta {
                            ip_address: row.try_get("ip_address").map_err(source_error)?,
                            user_agent: row.try_get("user_agent").map_err(source_error)?,
                        },
                    ),
                )
            })
            .collect()
    }
}

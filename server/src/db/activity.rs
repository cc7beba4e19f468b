//! Activity log table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formsync_engine::{LogStatus, SyncLogEntry, SyncNotifier};
use sqlx::PgPool;

/// Notifier writing to the `activity_log` table, keeping the newest
/// `retention` entries.
#[derive(Debug, Clone)]
pub struct PgActivityLog {
    pool: PgPool,
    retention: usize,
}

impl PgActivityLog {
    pub fn new(pool: PgPool, retention: usize) -> Self {
        Self {
            pool,
            retention: retention.max(1),
        }
    }

    async fn insert(
        &self,
        status: LogStatus,
        form_id: &str,
        record_id: Option<&str>,
        message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO activity_log (status, form_id, record_id, message)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(status.to_string())
        .bind(form_id)
        .bind(record_id)
        .bind(message)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM activity_log
            WHERE id NOT IN (SELECT id FROM activity_log ORDER BY id DESC LIMIT $1)
            "#,
        )
        .bind(self.retention as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }
}

#[async_trait]
impl SyncNotifier for PgActivityLog {
    async fn record_success(&self, form_id: &str, record_id: &str) {
        tracing::info!(form_id, record_id, "submission synced");
        if let Err(e) = self
            .insert(LogStatus::Success, form_id, Some(record_id), None)
            .await
        {
            tracing::error!(form_id, error = %e, "could not write activity log");
        }
    }

    async fn record_error(&self, form_id: &str, record_id: Option<&str>, message: &str) {
        tracing::warn!(form_id, record_id, error = %message, "sync failed");
        if let Err(e) = self
            .insert(LogStatus::Error, form_id, record_id, Some(message))
            .await
        {
            tracing::error!(form_id, error = %e, "could not write activity log");
        }
    }
}

/// A stored activity row.
#[derive(Debug, sqlx::FromRow)]
struct StoredEntry {
    status: String,
    form_id: String,
    record_id: Option<String>,
    message: Option<String>,
    at: DateTime<Utc>,
}

impl StoredEntry {
    fn into_entry(self) -> SyncLogEntry {
        let status = match self.status.as_str() {
            "success" => LogStatus::Success,
            _ => LogStatus::Error,
        };
        SyncLogEntry {
            status,
            form_id: self.form_id,
            record_id: self.record_id,
            message: self.message,
            at: self.at,
        }
    }
}

/// Most recent activity entries, newest first.
pub async fn recent_activity(pool: &PgPool, limit: i64) -> Result<Vec<SyncLogEntry>, sqlx::Error> {
    let rows: Vec<StoredEntry> = sqlx::query_as(
        r#"
        SELECT status, form_id, record_id, message, at
        FROM activity_log
        ORDER BY id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(StoredEntry::into_entry).collect())
}

//! `PostgreSQL` [`AuditStore`] backed by `sqlx`.

use std::str::FromStr;

use anyhow::Context;
use async_trait::async_trait;
use bridge_core::{AuditRecord, OPERATION_MAX_LEN};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::traits::AuditStore;

const SELECT_COLUMNS: &str =
    "SELECT id, user_id, operation, target_value, result, error, created_at FROM operation_results";

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: i64,
    user_id: Option<i64>,
    operation: String,
    target_value: String,
    result: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditRecord {
    fn from(row: AuditRow) -> Self {
        Self {
            id: Some(row.id),
            user_id: row.user_id,
            operation: row.operation,
            target_value: row.target_value,
            result: row.result,
            error: row.error,
            created_at: row.created_at,
        }
    }
}

/// Audit store writing to the `operation_results` table.
#[derive(Debug, Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Connects using the URL and credentials in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the database is unreachable.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let mut options = PgConnectOptions::from_str(&config.url)
            .with_context(|| format!("invalid database url {}", config.url))?
            .username(&config.username);
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to audit database")?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, sql: &str, bind: Option<Bind<'_>>) -> anyhow::Result<Vec<AuditRecord>> {
        let query = sqlx::query_as::<_, AuditRow>(sql);
        let query = match bind {
            Some(Bind::Int(value)) => query.bind(value),
            Some(Bind::Text(value)) => query.bind(value),
            None => query,
        };
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }
}

enum Bind<'a> {
    Int(i64),
    Text(&'a str),
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn insert(&self, record: &AuditRecord) -> anyhow::Result<i64> {
        let id: (i64,) = sqlx::query_as(
            "INSERT INTO operation_results \
             (user_id, operation, target_value, result, error, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(record.user_id)
        .bind(&record.operation)
        .bind(&record.target_value)
        .bind(record.result.as_deref())
        .bind(record.error.as_deref())
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .context("inserting audit record")?;
        Ok(id.0)
    }

    async fn find_by_user(&self, user_id: i64) -> anyhow::Result<Vec<AuditRecord>> {
        let sql = format!("{SELECT_COLUMNS} WHERE user_id = $1 ORDER BY created_at DESC, id DESC");
        self.fetch(&sql, Some(Bind::Int(user_id))).await
    }

    async fn find_by_operation(&self, operation: &str) -> anyhow::Result<Vec<AuditRecord>> {
        let sql =
            format!("{SELECT_COLUMNS} WHERE operation = $1 ORDER BY created_at DESC, id DESC");
        self.fetch(&sql, Some(Bind::Text(operation))).await
    }

    async fn find_with_errors(&self) -> anyhow::Result<Vec<AuditRecord>> {
        let sql =
            format!("{SELECT_COLUMNS} WHERE error IS NOT NULL ORDER BY created_at DESC, id DESC");
        self.fetch(&sql, None).await
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS operation_results (\
                 id BIGSERIAL PRIMARY KEY, \
                 user_id BIGINT, \
                 operation VARCHAR({OPERATION_MAX_LEN}) NOT NULL, \
                 target_value TEXT NOT NULL, \
                 result TEXT, \
                 error TEXT, \
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW())"
            ),
            "CREATE INDEX IF NOT EXISTS idx_operation_results_user_id ON operation_results (user_id)"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS idx_operation_results_operation ON operation_results (operation)"
                .to_string(),
            "CREATE INDEX IF NOT EXISTS idx_operation_results_created_at ON operation_results (created_at)"
                .to_string(),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("creating audit schema")?;
        }
        Ok(())
    }
}

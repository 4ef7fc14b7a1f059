//! SQLite sample store implementation
//!
//! This module provides a SQLite-based implementation of the `SampleStore` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Round writes don't block startup reads
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Limitations
//!
//! - **Concurrency**: Limited concurrent writes
//! - **Distributed**: Single-machine only

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, QueryRange, SampleStore};
use super::error::{StorageError, StorageResult};
use super::schema::{RecordRow, SampleRow};

/// SQLite sample store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations
    ///
    /// ```no_run
    /// # use occupancy_monitor::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./samples.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }
}

#[async_trait]
impl SampleStore for SqliteStore {
    #[instrument(skip(self, samples), fields(count = samples.len()))]
    async fn insert_batch(&self, samples: Vec<SampleRow>) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for sample in samples {
            sqlx::query(
                r#"
                INSERT INTO samples (service, timestamp, value)
                VALUES (?, ?, ?)
                ON CONFLICT (service, timestamp) DO UPDATE SET
                    value = excluded.value
                "#,
            )
            .bind(&sample.service)
            .bind(sample.timestamp)
            .bind(sample.value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("batch insert complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_max_value(&self, service: &str) -> StorageResult<Option<RecordRow>> {
        let row = sqlx::query(
            r#"
            SELECT value, timestamp
            FROM samples
            WHERE service = ? AND value IS NOT NULL
            ORDER BY value DESC, timestamp ASC
            LIMIT 1
            "#,
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| RecordRow {
            value: row.get("value"),
            timestamp: row.get("timestamp"),
        }))
    }

    #[instrument(skip(self), fields(service = ?query.service))]
    async fn query_range(&self, query: QueryRange) -> StorageResult<Vec<SampleRow>> {
        debug!("querying samples from {} to {}", query.start, query.end);

        let rows = match &query.service {
            Some(service) => {
                sqlx::query(
                    r#"
                    SELECT service, timestamp, value
                    FROM samples
                    WHERE service = ? AND timestamp >= ? AND timestamp <= ?
                    ORDER BY timestamp ASC
                    "#,
                )
                .bind(service)
                .bind(query.start)
                .bind(query.end)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT service, timestamp, value
                    FROM samples
                    WHERE timestamp >= ? AND timestamp <= ?
                    ORDER BY timestamp ASC
                    "#,
                )
                .bind(query.start)
                .bind(query.end)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let samples: Vec<SampleRow> = rows
            .into_iter()
            .map(|row| SampleRow {
                timestamp: row.get("timestamp"),
                service: row.get("service"),
                value: row.get::<Option<i64>, _>("value"),
            })
            .collect();

        debug!("query returned {} samples", samples.len());
        Ok(samples)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite store operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}

// PostgreSQL Remote Client
//!
//! Documents live in one `documents` table with a JSONB body keyed by
//! (collection, kind, id). One pool per process; writes are single-statement
//! upserts so concurrent writers never see a duplicate-key failure.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::types::Json;
use tracing::info;

use super::{apply_tls_fix, RemoteClient};
use crate::domain::{Container, Document, Filter};
use crate::error::{Result, StorageError};

/// Upper bound on establishing the first connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL-backed [`RemoteClient`]
#[derive(Clone, Debug)]
pub struct PostgresClient {
    /// Connection pool for concurrent requests
    pool: PgPool,
}

impl PostgresClient {
    /// Connect and make sure the `documents` table exists.
    ///
    /// With `ssl_fix`, the URL goes through [`apply_tls_fix`] and TLS is
    /// required without certificate verification.
    ///
    /// # Example
    /// ```no_run
    /// use docstore::infrastructure::PostgresClient;
    ///
    /// # async fn run() -> docstore::Result<()> {
    /// let client = PostgresClient::connect("postgres://localhost/bot", false).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(database_url: &str, ssl_fix: bool) -> Result<Self> {
        let url = if ssl_fix {
            apply_tls_fix(database_url)?
        } else {
            database_url.to_string()
        };

        let mut options = PgConnectOptions::from_str(&url).map_err(|e| {
            StorageError::config(format!("Invalid PostgreSQL URL: {}", e)).with_source(e)
        })?;
        if ssl_fix {
            options = options.ssl_mode(PgSslMode::Require);
        }

        let connecting = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(CONNECT_TIMEOUT)
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options);

        let pool = tokio::time::timeout(CONNECT_TIMEOUT, connecting)
            .await
            .map_err(|_| {
                StorageError::connection(format!(
                    "Timed out after {}s connecting to PostgreSQL",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| {
                StorageError::connection(format!("Failed to connect to PostgreSQL: {}", e))
                    .with_source(e)
            })?;

        let client = Self { pool };
        client.init_schema().await?;
        info!(ssl_fix, "connected to PostgreSQL document store");
        Ok(client)
    }

    /// Get connection pool reference (for advanced usage)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close connection pool gracefully
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                body JSONB NOT NULL,
                PRIMARY KEY (collection, kind, id)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for PostgresClient {
    async fn find_one(&self, container: &Container, id: &str) -> Result<Option<Document>> {
        let body: Option<Json<Document>> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = $1 AND kind = $2 AND id = $3",
        )
        .bind(container.collection.as_str())
        .bind(container.kind.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(body.map(|Json(doc)| doc))
    }

    async fn upsert(&self, container: &Container, id: &str, doc: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (collection, kind, id, body) VALUES ($1, $2, $3, $4)
             ON CONFLICT (collection, kind, id) DO UPDATE SET body = EXCLUDED.body",
        )
        .bind(container.collection.as_str())
        .bind(container.kind.as_str())
        .bind(id)
        .bind(Json(doc))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, container: &Container, filter: &Filter) -> Result<Vec<Document>> {
        // JSONB containment narrows the scan; Filter::matches has the final say
        // (jsonb treats 1 and 1.0 as equal, documents do not).
        let bodies: Vec<Json<Document>> = sqlx::query_scalar(
            "SELECT body FROM documents
             WHERE collection = $1 AND kind = $2 AND body @> $3
             ORDER BY id",
        )
        .bind(container.collection.as_str())
        .bind(container.kind.as_str())
        .bind(Json(filter.to_containment()))
        .fetch_all(&self.pool)
        .await?;

        Ok(bodies
            .into_iter()
            .map(|Json(doc)| doc)
            .filter(|doc| filter.matches(doc))
            .collect())
    }

    async fn delete_one(&self, container: &Container, id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM documents WHERE collection = $1 AND kind = $2 AND id = $3")
                .bind(container.collection.as_str())
                .bind(container.kind.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

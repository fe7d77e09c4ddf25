use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{
    filters_to_object, Collection, Document, DocumentId, DocumentStore, Filter, Patch, SnapshotCallback, StoreError,
    Subscription,
};

/// Channel the `documents_notify` trigger publishes collection names on
const NOTIFY_CHANNEL: &str = "document_changes";

/// Consecutive failed reconnects before a listener gives up
const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Wait before reconnect attempt `attempt` (1-based), `None` once out of attempts
fn reconnect_delay(attempt: u32) -> Option<Duration> {
    (1..=MAX_RECONNECT_ATTEMPTS)
        .contains(&attempt)
        .then(|| RECONNECT_BASE_DELAY * 2u32.pow(attempt - 1))
}

async fn push_snapshot(pool: &PgPool, collection: Collection, callback: &SnapshotCallback) {
    match select_documents(pool, collection, &[]).await {
        Ok(documents) => {
            debug!(%collection, count = documents.len(), "pushing snapshot");
            callback(documents);
        }
        Err(err) => warn!(%collection, error = %err, "failed to reload snapshot"),
    }
}

/// PostgreSQL-backed document store, one JSONB row per document
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store with a connection pool
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(self.get_pool()).await?;

        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn select_documents(pool: &PgPool, collection: Collection, filters: &[Filter]) -> Result<Vec<Document>, StoreError> {
    let rows = sqlx::query_as::<_, (Uuid, Json<Value>)>(
        r#"
        SELECT id, data
        FROM documents
        WHERE collection = $1 AND data @> $2
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(collection.as_str())
    .bind(Json(filters_to_object(filters)))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, Json(data))| Document { id: id.into(), data })
        .collect())
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn create(&self, collection: Collection, data: Value) -> Result<DocumentId, StoreError> {
        if !data.is_object() {
            return Err(StoreError::NotAnObject);
        }

        let id = DocumentId::new();
        sqlx::query(
            r#"
            INSERT INTO documents (id, collection, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(id.as_uuid())
        .bind(collection.as_str())
        .bind(Json(data))
        .execute(self.get_pool())
        .await?;

        Ok(id)
    }

    async fn update(&self, collection: Collection, id: DocumentId, patch: Patch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET data = data || $3
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_str())
        .bind(id.as_uuid())
        .bind(Json(Value::Object(patch)))
        .execute(self.get_pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { collection, id });
        }

        Ok(())
    }

    async fn delete(&self, collection: Collection, id: DocumentId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection.as_str())
            .bind(id.as_uuid())
            .execute(self.get_pool())
            .await?;

        Ok(())
    }

    async fn query(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Document>, StoreError> {
        select_documents(self.get_pool(), collection, filters).await
    }

    async fn subscribe(&self, collection: Collection, callback: SnapshotCallback) -> Result<Subscription, StoreError> {
        // Listen before the first snapshot so no change slips in between
        let mut listener = PgListener::connect_with(self.get_pool()).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        let initial = select_documents(self.get_pool(), collection, &[]).await?;
        let pool = self.pool.clone();

        let task = tokio::spawn(async move {
            callback(initial);
            let mut failed_attempts = 0;

            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        failed_attempts = 0;
                        if notification.payload() == collection.as_str() {
                            push_snapshot(&pool, collection, &callback).await;
                        }
                    }
                    // Connection lost, the next call reconnects. Changes sent
                    // in between were missed, so reload.
                    Ok(None) => {
                        warn!(%collection, "document listener lost its connection");
                        push_snapshot(&pool, collection, &callback).await;
                    }
                    Err(err) => {
                        failed_attempts += 1;
                        let Some(delay) = reconnect_delay(failed_attempts) else {
                            error!(%collection, error = %err, "document listener gave up, live updates stopped");
                            break;
                        };
                        warn!(%collection, error = %err, attempt = failed_attempts, "document listener reconnect failed");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });

        Ok(Subscription::new(task))
    }
}

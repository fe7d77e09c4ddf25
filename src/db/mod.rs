mod memory;
mod postgres;

#[cfg(test)]
pub mod flaky;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Named document collections the registry works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Clients,
    /// Project tiles shown on the projects board
    Categories,
    Contracts,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Clients => "clients",
            Collection::Categories => "categories",
            Collection::Contracts => "contracts",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identity of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for DocumentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A stored document: its id plus the JSON object body
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(T::deserialize(&self.data)?)
    }

    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// Shallow merge applied by `DocumentStore::update`
pub type Patch = serde_json::Map<String, Value>;

/// Field equality condition used by `DocumentStore::query`
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: &'static str, value: impl Into<Value>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        data.get(self.field) == Some(&self.value)
    }
}

/// Build the JSON object a containment query (`data @> filters`) expects
pub fn filters_to_object(filters: &[Filter]) -> Value {
    let object: Patch = filters
        .iter()
        .map(|filter| (filter.field.to_string(), filter.value.clone()))
        .collect();
    Value::Object(object)
}

/// Receives the full contents of a collection after every change
pub type SnapshotCallback = Box<dyn Fn(Vec<Document>) + Send + Sync + 'static>;

/// Handle to a live collection subscription
///
/// The listener task stops when the handle is cancelled or dropped.
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{collection} document {id} not found")]
    NotFound { collection: Collection, id: DocumentId },

    #[error("document body must be a JSON object")]
    NotAnObject,
}

/// Generic document store backing every collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, collection: Collection, data: Value) -> Result<DocumentId, StoreError>;

    async fn update(&self, collection: Collection, id: DocumentId, patch: Patch) -> Result<(), StoreError>;

    /// Deleting a missing document is not an error
    async fn delete(&self, collection: Collection, id: DocumentId) -> Result<(), StoreError>;

    /// Documents matching every filter, oldest first
    async fn query(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Document>, StoreError>;

    /// Push the collection snapshot now and after each change
    async fn subscribe(&self, collection: Collection, callback: SnapshotCallback) -> Result<Subscription, StoreError>;
}

/// Connect to PostgreSQL and bring the schema up to date
pub async fn init(config: &Config) -> Result<PgStore> {
    let store = PgStore::new(config.database_url()?).await?;
    store.migrate().await?;

    Ok(store)
}

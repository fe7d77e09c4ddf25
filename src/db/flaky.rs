//! Store wrapper that fails chosen operations, for exercising partial failures.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{Collection, Document, DocumentId, DocumentStore, Filter, MemoryStore, Patch, SnapshotCallback, StoreError, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    Delete,
    Query,
}

struct Rule {
    op: Op,
    collection: Collection,
    remaining_successes: usize,
}

pub struct FlakyStore {
    inner: MemoryStore,
    rules: Mutex<Vec<Rule>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Let `successes` matching calls through, then fail every later one
    pub fn fail_after(&self, op: Op, collection: Collection, successes: usize) {
        self.rules.lock().unwrap().push(Rule {
            op,
            collection,
            remaining_successes: successes,
        });
    }

    pub fn heal(&self) {
        self.rules.lock().unwrap().clear();
    }

    fn check(&self, op: Op, collection: Collection) -> Result<(), StoreError> {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut().filter(|rule| rule.op == op && rule.collection == collection) {
            if rule.remaining_successes == 0 {
                return Err(StoreError::Database(sqlx::Error::PoolClosed));
            }
            rule.remaining_successes -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create(&self, collection: Collection, data: Value) -> Result<DocumentId, StoreError> {
        self.check(Op::Create, collection)?;
        self.inner.create(collection, data).await
    }

    async fn update(&self, collection: Collection, id: DocumentId, patch: Patch) -> Result<(), StoreError> {
        self.check(Op::Update, collection)?;
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: Collection, id: DocumentId) -> Result<(), StoreError> {
        self.check(Op::Delete, collection)?;
        self.inner.delete(collection, id).await
    }

    async fn query(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Document>, StoreError> {
        self.check(Op::Query, collection)?;
        self.inner.query(collection, filters).await
    }

    async fn subscribe(&self, collection: Collection, callback: SnapshotCallback) -> Result<Subscription, StoreError> {
        self.inner.subscribe(collection, callback).await
    }
}

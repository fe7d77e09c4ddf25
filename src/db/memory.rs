use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};

use super::{Collection, Document, DocumentId, DocumentStore, Filter, Patch, SnapshotCallback, StoreError, Subscription};

const CHANGE_BUFFER: usize = 64;

/// In-process document store
///
/// Cloning shares the same documents. Used for `--memory` sessions and tests.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    documents: Mutex<HashMap<Collection, Vec<Document>>>,
    changes: broadcast::Sender<Collection>,
}

impl Inner {
    fn documents(&self) -> MutexGuard<'_, HashMap<Collection, Vec<Document>>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, collection: Collection, filters: &[Filter]) -> Vec<Document> {
        self.documents()
            .get(&collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| filters.iter().all(|filter| filter.matches(&document.data)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn notify(&self, collection: Collection) {
        // No receivers just means nobody is subscribed
        let _ = self.changes.send(collection);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(Inner {
                documents: Mutex::new(HashMap::new()),
                changes,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: Collection, data: Value) -> Result<DocumentId, StoreError> {
        if !data.is_object() {
            return Err(StoreError::NotAnObject);
        }

        let id = DocumentId::new();
        self.inner
            .documents()
            .entry(collection)
            .or_default()
            .push(Document { id, data });
        self.inner.notify(collection);

        Ok(id)
    }

    async fn update(&self, collection: Collection, id: DocumentId, patch: Patch) -> Result<(), StoreError> {
        {
            let mut documents = self.inner.documents();
            let document = documents
                .get_mut(&collection)
                .and_then(|documents| documents.iter_mut().find(|document| document.id == id))
                .ok_or(StoreError::NotFound { collection, id })?;

            let Value::Object(fields) = &mut document.data else {
                return Err(StoreError::NotAnObject);
            };
            fields.extend(patch);
        }
        self.inner.notify(collection);

        Ok(())
    }

    async fn delete(&self, collection: Collection, id: DocumentId) -> Result<(), StoreError> {
        let removed = {
            let mut documents = self.inner.documents();
            match documents.get_mut(&collection) {
                Some(documents) => {
                    let before = documents.len();
                    documents.retain(|document| document.id != id);
                    documents.len() != before
                }
                None => false,
            }
        };

        if removed {
            self.inner.notify(collection);
        }

        Ok(())
    }

    async fn query(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Document>, StoreError> {
        Ok(self.inner.snapshot(collection, filters))
    }

    async fn subscribe(&self, collection: Collection, callback: SnapshotCallback) -> Result<Subscription, StoreError> {
        let mut changes = self.inner.changes.subscribe();
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            callback(inner.snapshot(collection, &[]));

            loop {
                match changes.recv().await {
                    Ok(changed) if changed == collection => callback(inner.snapshot(collection, &[])),
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => callback(inner.snapshot(collection, &[])),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn query_filters_and_keeps_insertion_order() {
        let store = MemoryStore::new();
        let first = store
            .create(Collection::Clients, json!({ "year": 2024, "category": "deposit" }))
            .await
            .unwrap();
        store
            .create(Collection::Clients, json!({ "year": 2025, "category": "deposit" }))
            .await
            .unwrap();
        let third = store
            .create(Collection::Clients, json!({ "year": 2024, "category": "deposit" }))
            .await
            .unwrap();

        let found = store
            .query(Collection::Clients, &[Filter::eq("year", 2024), Filter::eq("category", "deposit")])
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|document| document.id).collect();
        assert_eq!(ids, vec![first, third]);

        assert!(store.query(Collection::Categories, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_merges_fields_and_rejects_missing_documents() {
        let store = MemoryStore::new();
        let id = store
            .create(Collection::Clients, json!({ "lastName": "Smith", "phone": "555" }))
            .await
            .unwrap();

        let mut patch = Patch::new();
        patch.insert("phone".to_string(), json!("777"));
        store.update(Collection::Clients, id, patch.clone()).await.unwrap();

        let stored = store.query(Collection::Clients, &[]).await.unwrap();
        assert_eq!(stored[0].data, json!({ "lastName": "Smith", "phone": "777" }));

        let missing = DocumentId::new();
        let err = store.update(Collection::Clients, missing, patch).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id, .. } if id == missing));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let id = store.create(Collection::Contracts, json!({ "clientId": "x" })).await.unwrap();

        store.delete(Collection::Contracts, id).await.unwrap();
        store.delete(Collection::Contracts, id).await.unwrap();
        assert!(store.query(Collection::Contracts, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_non_object_bodies() {
        let store = MemoryStore::new();
        let err = store.create(Collection::Clients, json!("Smith")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject));
    }

    #[tokio::test]
    async fn subscription_pushes_initial_and_changed_snapshots() {
        let store = MemoryStore::new();
        store.create(Collection::Clients, json!({ "lastName": "Smith" })).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = store
            .subscribe(
                Collection::Clients,
                Box::new(move |documents: Vec<Document>| {
                    let _ = tx.send(documents.len());
                }),
            )
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(1));

        // Changes in other collections are not pushed
        store.create(Collection::Categories, json!({ "row": 3 })).await.unwrap();
        store.create(Collection::Clients, json!({ "lastName": "Doe" })).await.unwrap();
        assert_eq!(rx.recv().await, Some(2));

        subscription.cancel();
        store.create(Collection::Clients, json!({ "lastName": "Roe" })).await.unwrap();
        let after_cancel = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(after_cancel, Ok(None) | Err(_)));
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::db::{Collection, DocumentId, DocumentStore, Filter};
use crate::error::{CascadeStep, ClientError};

/// Removes everything contract-related a client owns
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Returns the ids of the deleted contracts
    ///
    /// A failure after some deletes is a `PartialCascade` listing them.
    async fn delete_client_contracts(&self, client_id: DocumentId) -> Result<Vec<DocumentId>, ClientError>;
}

/// Contracts kept in the `contracts` collection, linked through `clientId`
pub struct StoredContracts {
    store: Arc<dyn DocumentStore>,
}

impl StoredContracts {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ContractStore for StoredContracts {
    async fn delete_client_contracts(&self, client_id: DocumentId) -> Result<Vec<DocumentId>, ClientError> {
        let contracts = self
            .store
            .query(Collection::Contracts, &[Filter::eq("clientId", client_id.to_string())])
            .await
            .map_err(|source| ClientError::persistence("delete client contracts", source))?;

        let mut removed = Vec::with_capacity(contracts.len());
        for contract in &contracts {
            if let Err(source) = self.store.delete(Collection::Contracts, contract.id).await {
                let steps = removed.iter().copied().map(CascadeStep::Contract).collect();
                return Err(ClientError::persistence("delete contract", source).after("delete client contracts", steps));
            }
            removed.push(contract.id);
        }

        debug!(%client_id, count = removed.len(), "client contracts deleted");
        Ok(removed)
    }
}

//! Keeps client-derived project tiles in step with client visibility.
//!
//! Every living client whose icon is not hidden owns one tile in the
//! `categories` collection, matched by title and `row == 3`. Renaming a client
//! does not rename its tile.

use std::sync::Arc;

use serde_json::to_value;
use tracing::{debug, warn};

use crate::db::{Collection, DocumentId, DocumentStore, Filter, StoreError};
use crate::error::{CascadeStep, ClientError};
use crate::models::{Client, ProjectTile, CLIENT_TILE_ROW};

/// Presentation values given to new client tiles
#[derive(Debug, Clone, PartialEq)]
pub struct TileDefaults {
    pub amount: String,
    pub icon: String,
    pub color: String,
}

impl Default for TileDefaults {
    fn default() -> Self {
        Self {
            amount: "0".to_string(),
            icon: "Building2".to_string(),
            color: "bg-blue-500".to_string(),
        }
    }
}

pub struct TileIndex {
    store: Arc<dyn DocumentStore>,
    defaults: TileDefaults,
}

impl TileIndex {
    pub fn new(store: Arc<dyn DocumentStore>, defaults: TileDefaults) -> Self {
        Self { store, defaults }
    }

    pub async fn on_client_created(&self, client: &Client) -> Result<Option<DocumentId>, ClientError> {
        if client.hide_project_icon {
            return Ok(None);
        }

        self.insert_tile(client).await.map(Some)
    }

    pub async fn on_visibility_toggled(&self, client: &Client, hidden: bool) -> Result<(), ClientError> {
        if hidden {
            self.remove_tiles(client).await?;
        } else {
            self.insert_tile(client).await?;
        }

        Ok(())
    }

    /// Removes the client's tiles, returning the ids that were deleted
    pub async fn on_client_deleted(&self, client: &Client) -> Result<Vec<DocumentId>, ClientError> {
        self.remove_tiles(client).await
    }

    #[cfg(test)]
    pub async fn tiles_for(&self, client: &Client) -> Result<Vec<ProjectTile>, ClientError> {
        let documents = self
            .store
            .query(Collection::Categories, &tile_filters(client))
            .await
            .map_err(|source| ClientError::persistence("read project tiles", source))?;

        documents
            .iter()
            .map(ProjectTile::from_document)
            .collect::<Result<_, _>>()
            .map_err(|source| ClientError::persistence("read project tiles", source))
    }

    async fn insert_tile(&self, client: &Client) -> Result<DocumentId, ClientError> {
        let tile = ProjectTile {
            id: DocumentId::default(),
            title: client.display_name(),
            amount: self.defaults.amount.clone(),
            icon: self.defaults.icon.clone(),
            color: self.defaults.color.clone(),
            row: CLIENT_TILE_ROW,
        };

        let data = to_value(&tile)
            .map_err(|err| ClientError::persistence("create project tile", StoreError::from(err)))?;
        let id = self
            .store
            .create(Collection::Categories, data)
            .await
            .map_err(|source| ClientError::persistence("create project tile", source))?;

        debug!(title = %tile.title, %id, "project tile created");
        Ok(id)
    }

    /// Query-then-delete-each; a failure partway leaves the rest in place
    async fn remove_tiles(&self, client: &Client) -> Result<Vec<DocumentId>, ClientError> {
        let documents = self
            .store
            .query(Collection::Categories, &tile_filters(client))
            .await
            .map_err(|source| ClientError::persistence("read project tiles", source))?;

        if documents.len() > 1 {
            warn!(
                title = %client.display_name(),
                count = documents.len(),
                "client owns more than one project tile"
            );
        }

        let mut removed = Vec::with_capacity(documents.len());
        for document in &documents {
            if let Err(source) = self.store.delete(Collection::Categories, document.id).await {
                let steps = removed.iter().copied().map(CascadeStep::ProjectTile).collect();
                return Err(ClientError::persistence("delete project tile", source).after("remove project tiles", steps));
            }
            removed.push(document.id);
        }

        Ok(removed)
    }
}

fn tile_filters(client: &Client) -> [Filter; 2] {
    [
        Filter::eq("title", client.display_name()),
        Filter::eq("row", CLIENT_TILE_ROW),
    ]
}

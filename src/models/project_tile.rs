use serde::{Deserialize, Serialize};

use crate::db::DocumentId;
#[cfg(test)]
use crate::db::{Document, StoreError};

/// Row tag marking a tile as derived from a client
pub const CLIENT_TILE_ROW: i64 = 3;

/// Entry of the `categories` collection shown on the projects board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectTile {
    #[serde(skip)]
    pub id: DocumentId,
    pub title: String,
    pub amount: String,
    pub icon: String,
    pub color: String,
    pub row: i64,
}

#[cfg(test)]
impl ProjectTile {
    pub fn from_document(document: &Document) -> Result<Self, StoreError> {
        let mut tile: ProjectTile = document.decode()?;
        tile.id = document.id;
        Ok(tile)
    }
}

mod client;
mod project_tile;

pub use client::{Category, Client, NewClient, RequiredField};
pub use project_tile::{ProjectTile, CLIENT_TILE_ROW};

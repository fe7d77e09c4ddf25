use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::numbering::SequencePolicy;
use crate::tiles::TileDefaults;

/// Configuration for the application
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Database connection URL, not needed for in-memory runs
    pub database_url: Option<String>,

    /// Directory the log file is written to
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Amount shown on freshly created project tiles
    #[serde(default = "default_tile_amount")]
    pub tile_amount: String,

    /// Color class of freshly created project tiles
    #[serde(default = "default_tile_color")]
    pub tile_color: String,

    /// Skip unparsable client numbers instead of refusing to number
    #[serde(default)]
    pub lenient_numbering: bool,
}

fn default_log_dir() -> String {
    ".".to_string()
}

fn default_tile_amount() -> String {
    "0".to_string()
}

fn default_tile_color() -> String {
    "bg-blue-500".to_string()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first when it exists.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>().context("invalid environment configuration")?;

        Ok(config)
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set unless --memory is used")
    }

    pub fn tile_defaults(&self) -> TileDefaults {
        TileDefaults {
            amount: self.tile_amount.clone(),
            color: self.tile_color.clone(),
            ..TileDefaults::default()
        }
    }

    pub fn sequence_policy(&self) -> SequencePolicy {
        if self.lenient_numbering {
            SequencePolicy::Lenient
        } else {
            SequencePolicy::Strict
        }
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    Config::load()
}

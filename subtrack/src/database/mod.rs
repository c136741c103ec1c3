//! Database module
//!
//! - Subscription models shared by every layer
//! - The SQLite file behind the local mirror and its schema
//! - Key/value repository over that file

pub mod models;
pub mod repository;
pub mod schema;

pub use models::*;
pub use repository::Repository;
pub use schema::initialize_database;

use crate::config::MIRROR_DB_FILE_NAME;
use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_POOL_SIZE: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Location and pool settings of the mirror database
#[derive(Debug, Clone)]
pub struct MirrorDatabase {
    path: PathBuf,
    pool_size: u32,
}

impl MirrorDatabase {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// The standard mirror file inside an app data directory
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(MIRROR_DB_FILE_NAME))
    }

    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file if needed, bring the schema up to date and hand
    /// back a repository over the pool
    pub async fn open(&self) -> Result<Repository> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::info!("Opening mirror database at: {:?}", self.path);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.pool_size)
            .connect_with(self.connect_options())
            .await?;

        initialize_database(&pool).await?;

        tracing::info!("Mirror database ready ({} connections)", self.pool_size);
        Ok(Repository::new(pool))
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT)
            .journal_mode(SqliteJournalMode::Wal)
    }
}

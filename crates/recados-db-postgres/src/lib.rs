//! PostgreSQL backend for the Recados storage ports.
//!
//! ```ignore
//! use recados_db_postgres::{PostgresConfig, PostgresStorage};
//!
//! let storage = PostgresStorage::connect(&PostgresConfig::new("postgres://localhost/recados")).await?;
//! let notes = storage.notes();
//! ```
//!
//! - [`config`]: connection settings
//! - [`pool`]: pool construction and password masking for logs
//! - [`migrations`]: schema embedded into the binary
//! - [`identity`] / [`note`]: repository implementations

mod config;
mod error;
mod identity;
mod note;
mod pool;

pub mod migrations;

use std::sync::Arc;

use sqlx_postgres::PgPool;

pub use config::PostgresConfig;
pub use error::{PostgresError, Result};
pub use identity::PostgresIdentityRepository;
pub use note::PostgresNoteRepository;
pub use pool::{create_pool, mask_password};

pub use recados_storage::{IdentityRepository, NoteRepository, StorageError};

/// A connected pool plus the repositories built on it.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connects and, if configured, applies migrations.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.run_migrations {
            migrations::run(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn identities(&self) -> Arc<PostgresIdentityRepository> {
        Arc::new(PostgresIdentityRepository::new(self.pool.clone()))
    }

    pub fn notes(&self) -> Arc<PostgresNoteRepository> {
        Arc::new(PostgresNoteRepository::new(self.pool.clone()))
    }

    /// Checks the database is reachable.
    pub async fn ping(&self) -> Result<()> {
        pool::ping(&self.pool).await
    }
}

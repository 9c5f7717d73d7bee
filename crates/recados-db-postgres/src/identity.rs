//! Identity persistence.

use async_trait::async_trait;
use recados_core::{Identity, IdentityDraft};
use recados_storage::{IdentityRepository, StorageError};
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use tracing::{debug, instrument};

use crate::error::{is_unique_violation, query_error};

type IdentityRow = (i64, String, String);

fn into_identity((id, name, credential_hash): IdentityRow) -> Identity {
    Identity {
        id,
        name,
        credential_hash,
    }
}

#[derive(Debug, Clone)]
pub struct PostgresIdentityRepository {
    pool: PgPool,
}

impl PostgresIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PostgresIdentityRepository {
    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> Result<Option<Identity>, StorageError> {
        let row: Option<IdentityRow> =
            query_as("SELECT id, name, credential_hash FROM identities WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
        Ok(row.map(into_identity))
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>, StorageError> {
        let row: Option<IdentityRow> =
            query_as("SELECT id, name, credential_hash FROM identities WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
        Ok(row.map(into_identity))
    }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    async fn create(&self, draft: IdentityDraft) -> Result<Identity, StorageError> {
        let row: IdentityRow = query_as(
            "INSERT INTO identities (name, credential_hash) VALUES ($1, $2) \
             RETURNING id, name, credential_hash",
        )
        .bind(&draft.name)
        .bind(&draft.credential_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::already_exists("identity", draft.name.clone())
            } else {
                query_error(e)
            }
        })?;

        debug!(identity_id = row.0, "identity created");
        Ok(into_identity(row))
    }
}

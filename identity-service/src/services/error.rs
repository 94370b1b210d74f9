use crate::services::store::Table;
use service_core::error::AppError;
use thiserror::Error;

/// Failure of the storage layer while provisioning a tenant.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to open provisioning session for tenant {tenant}: {source}")]
    Session {
        tenant: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to create table {}: {source}", .table.name())]
    Schema {
        table: Table,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to persist {entity}: {source}")]
    Persist {
        entity: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to query {entity}: {source}")]
    Query {
        entity: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Stored {entity} is malformed: {detail}")]
    Decode { entity: &'static str, detail: String },

    #[error("Duplicate {entity}: {detail}")]
    Constraint { entity: &'static str, detail: String },

    #[error("Failed to commit provisioning session: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Initial password hash must not be blank")]
    InvalidPasswordHash,

    #[error("Tenant is already provisioned")]
    AlreadyProvisioned,

    #[error("Cryptographic failure: {0}")]
    Crypto(#[source] anyhow::Error),

    #[error("Failed to provision tenant.")]
    Storage(#[from] StorageError),
}

impl ProvisionError {
    /// Metric label for the outcome this error represents.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProvisionError::InvalidPasswordHash => "invalid_input",
            ProvisionError::AlreadyProvisioned => "conflict",
            ProvisionError::Crypto(_) => "crypto_failure",
            ProvisionError::Storage(_) => "storage_failure",
        }
    }
}

impl From<ProvisionError> for AppError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::InvalidPasswordHash => {
                AppError::BadRequest(anyhow::anyhow!("Initial password hash must not be blank"))
            }
            ProvisionError::AlreadyProvisioned => {
                AppError::Conflict(anyhow::anyhow!("Tenant is already provisioned"))
            }
            ProvisionError::Crypto(e) => AppError::InternalError(e),
            // Storage details stay in the logs
            ProvisionError::Storage(_) => {
                AppError::InternalError(anyhow::anyhow!("Failed to provision tenant."))
            }
        }
    }
}

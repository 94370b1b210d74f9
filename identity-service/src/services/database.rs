//! PostgreSQL provisioning store.
//!
//! Every tenant lives in its own schema. A provisioning session is one
//! transaction holding a per-tenant advisory lock, so concurrent attempts for
//! the same tenant serialize and a failed attempt leaves nothing behind.

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::types::Json;
use sqlx::Transaction;

use crate::models::{
    AllowedOperation, PermissionType, Permittable, PermittableGroupEntity, RoleEntity,
    SignatureEntity, TenantEntity, TenantIdentifier, UserEntity,
};
use crate::services::error::StorageError;
use crate::services::store::{ProvisioningSession, ProvisioningStore, Table};

/// PostgreSQL-backed provisioning store.
#[derive(Clone)]
pub struct PgProvisioningStore {
    pool: PgPool,
}

impl PgProvisioningStore {
    /// Create a new store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ==================== Tenant Operations ====================

    /// Find the tenant configuration, if the tenant has been provisioned.
    pub async fn find_tenant(
        &self,
        tenant: &TenantIdentifier,
    ) -> Result<Option<TenantEntity>, StorageError> {
        if !self.schema_exists(tenant).await? {
            return Ok(None);
        }
        sqlx::query_as::<_, TenantEntity>(&format!(
            "SELECT fixed_salt, password_expires_in_days, \
             time_to_change_password_after_expiration_in_days, created_utc FROM {}.tenants",
            tenant.quoted()
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("tenant", e))
    }

    /// Drop a tenant's schema and everything in it.
    pub async fn drop_tenant(&self, tenant: &TenantIdentifier) -> Result<(), StorageError> {
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", tenant.quoted()))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Session {
                tenant: tenant.to_string(),
                source: e,
            })?;
        tracing::info!(tenant = %tenant, "Dropped tenant schema");
        Ok(())
    }

    async fn schema_exists(&self, tenant: &TenantIdentifier) -> Result<bool, StorageError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
        )
        .bind(tenant.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| query_error("schema", e))?;
        Ok(exists)
    }

    // ==================== Signature Operations ====================

    /// Find the tenant's signing key by its timestamp.
    pub async fn find_signature(
        &self,
        tenant: &TenantIdentifier,
        key_timestamp: &str,
    ) -> Result<Option<SignatureEntity>, StorageError> {
        sqlx::query_as::<_, SignatureEntity>(&format!(
            "SELECT key_timestamp, public_key_mod, public_key_exp, private_key_der, valid, \
             created_utc FROM {}.signatures WHERE key_timestamp = $1",
            tenant.quoted()
        ))
        .bind(key_timestamp)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("signature", e))
    }

    // ==================== Permission Operations ====================

    /// Find a permittable group by identifier.
    pub async fn find_permittable_group(
        &self,
        tenant: &TenantIdentifier,
        identifier: &str,
    ) -> Result<Option<PermittableGroupEntity>, StorageError> {
        let row: Option<(String, Json<Vec<PermittableRecord>>)> = sqlx::query_as(&format!(
            "SELECT identifier, permittables FROM {}.permittable_groups WHERE identifier = $1",
            tenant.quoted()
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("permittable group", e))?;

        row.map(|(identifier, Json(records))| {
            let permittables = records
                .into_iter()
                .map(PermittableRecord::into_permittable)
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StorageError>(PermittableGroupEntity::new(identifier, permittables))
        })
        .transpose()
    }

    /// Find a role and its permissions by identifier.
    pub async fn find_role(
        &self,
        tenant: &TenantIdentifier,
        identifier: &str,
    ) -> Result<Option<RoleEntity>, StorageError> {
        let role: Option<(String,)> = sqlx::query_as(&format!(
            "SELECT identifier FROM {}.roles WHERE identifier = $1",
            tenant.quoted()
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("role", e))?;

        let Some((identifier,)) = role else {
            return Ok(None);
        };

        let rows: Vec<(String, Vec<String>)> = sqlx::query_as(&format!(
            "SELECT permittable_group_identifier, allowed_operations FROM {}.role_permissions \
             WHERE role_identifier = $1 ORDER BY position",
            tenant.quoted()
        ))
        .bind(&identifier)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("role permission", e))?;

        let permissions = rows
            .into_iter()
            .map(|(group, operations)| {
                let operations = operations
                    .iter()
                    .map(|op| op.parse::<AllowedOperation>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|detail| StorageError::Decode {
                        entity: "role permission",
                        detail,
                    })?;
                Ok::<_, StorageError>(PermissionType::new(group, operations))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RoleEntity::new(identifier, permissions)))
    }

    // ==================== User Operations ====================

    /// Find a user by identifier.
    pub async fn find_user(
        &self,
        tenant: &TenantIdentifier,
        identifier: &str,
    ) -> Result<Option<UserEntity>, StorageError> {
        sqlx::query_as::<_, UserEntity>(&format!(
            "SELECT identifier, role, password, salt, password_must_change, \
             password_expires_on, created_utc FROM {}.users WHERE identifier = $1",
            tenant.quoted()
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("user", e))
    }
}

#[async_trait]
impl ProvisioningStore for PgProvisioningStore {
    async fn begin(
        &self,
        tenant: &TenantIdentifier,
    ) -> Result<Box<dyn ProvisioningSession>, StorageError> {
        let session_error = |e: sqlx::Error| StorageError::Session {
            tenant: tenant.to_string(),
            source: e,
        };

        let mut tx = self.pool.begin().await.map_err(session_error)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_lock_key(tenant))
            .execute(&mut *tx)
            .await
            .map_err(session_error)?;

        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", tenant.quoted()))
            .execute(&mut *tx)
            .await
            .map_err(session_error)?;

        sqlx::query(&format!("SET LOCAL search_path TO {}", tenant.quoted()))
            .execute(&mut *tx)
            .await
            .map_err(session_error)?;

        tracing::debug!(tenant = %tenant, "Provisioning session opened");

        Ok(Box::new(PgProvisioningSession { tx }))
    }
}

/// Derive the advisory lock key for a tenant from its schema name.
pub fn advisory_lock_key(tenant: &TenantIdentifier) -> i64 {
    let digest = Sha256::digest(format!("identity-provisioning:{}", tenant).as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

struct PgProvisioningSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ProvisioningSession for PgProvisioningSession {
    async fn build_schema(&mut self, table: Table) -> Result<(), StorageError> {
        sqlx::query(table_ddl(table))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StorageError::Schema { table, source: e })?;
        Ok(())
    }

    async fn find_tenant(&mut self) -> Result<Option<TenantEntity>, StorageError> {
        sqlx::query_as::<_, TenantEntity>(
            "SELECT fixed_salt, password_expires_in_days, \
             time_to_change_password_after_expiration_in_days, created_utc FROM tenants",
        )
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| query_error("tenant", e))
    }

    async fn add_signature(&mut self, signature: &SignatureEntity) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO signatures (key_timestamp, public_key_mod, public_key_exp, private_key_der, valid, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&signature.key_timestamp)
        .bind(&signature.public_key_mod)
        .bind(&signature.public_key_exp)
        .bind(&signature.private_key_der)
        .bind(signature.valid)
        .bind(signature.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| persist_error("signature", e))?;
        Ok(())
    }

    async fn add_tenant(&mut self, tenant: &TenantEntity) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (fixed_salt, password_expires_in_days, time_to_change_password_after_expiration_in_days, created_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&tenant.fixed_salt)
        .bind(tenant.password_expires_in_days)
        .bind(tenant.time_to_change_password_after_expiration_in_days)
        .bind(tenant.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| persist_error("tenant", e))?;
        Ok(())
    }

    async fn add_permittable_group(
        &mut self,
        group: &PermittableGroupEntity,
    ) -> Result<(), StorageError> {
        let records: Vec<PermittableRecord> =
            group.permittables.iter().map(PermittableRecord::from).collect();

        sqlx::query("INSERT INTO permittable_groups (identifier, permittables) VALUES ($1, $2)")
            .bind(&group.identifier)
            .bind(Json(records))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| persist_error("permittable group", e))?;
        Ok(())
    }

    async fn add_role(&mut self, role: &RoleEntity) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO roles (identifier) VALUES ($1)")
            .bind(&role.identifier)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| persist_error("role", e))?;

        for (position, permission) in role.permissions.iter().enumerate() {
            let operations: Vec<&str> = permission
                .allowed_operations
                .iter()
                .map(AllowedOperation::as_str)
                .collect();
            let position = i32::try_from(position).map_err(|_| StorageError::Decode {
                entity: "role permission",
                detail: format!("position {} out of range", position),
            })?;

            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_identifier, position, permittable_group_identifier, allowed_operations)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(&role.identifier)
            .bind(position)
            .bind(&permission.permittable_group_identifier)
            .bind(operations)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| persist_error("role permission", e))?;
        }
        Ok(())
    }

    async fn add_user(&mut self, user: &UserEntity) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO users (identifier, role, password, salt, password_must_change, password_expires_on, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&user.identifier)
        .bind(&user.role)
        .bind(&user.password)
        .bind(&user.salt)
        .bind(user.password_must_change)
        .bind(user.password_expires_on)
        .bind(user.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| persist_error("user", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.tx.commit().await.map_err(StorageError::Commit)
    }
}

/// JSONB shape of a permittable inside `permittable_groups.permittables`.
#[derive(Debug, Serialize, Deserialize)]
struct PermittableRecord {
    path: String,
    method: String,
}

impl From<&Permittable> for PermittableRecord {
    fn from(permittable: &Permittable) -> Self {
        Self {
            path: permittable.path.clone(),
            method: permittable.method.as_str().to_string(),
        }
    }
}

impl PermittableRecord {
    fn into_permittable(self) -> Result<Permittable, StorageError> {
        let method = Method::from_bytes(self.method.as_bytes()).map_err(|e| {
            StorageError::Decode {
                entity: "permittable group",
                detail: format!("invalid method {:?}: {}", self.method, e),
            }
        })?;
        Ok(Permittable::new(self.path, method))
    }
}

fn persist_error(entity: &'static str, e: sqlx::Error) -> StorageError {
    let unique = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        StorageError::Constraint {
            entity,
            detail: e.to_string(),
        }
    } else {
        StorageError::Persist { entity, source: e }
    }
}

fn query_error(entity: &'static str, e: sqlx::Error) -> StorageError {
    StorageError::Query { entity, source: e }
}

fn table_ddl(table: Table) -> &'static str {
    match table {
        Table::Signatures => {
            r#"
            CREATE TABLE IF NOT EXISTS signatures (
                key_timestamp TEXT PRIMARY KEY,
                public_key_mod BYTEA NOT NULL,
                public_key_exp BYTEA NOT NULL,
                private_key_der BYTEA NOT NULL,
                valid BOOLEAN NOT NULL,
                created_utc TIMESTAMPTZ NOT NULL
            )
            "#
        }
        // At most one row
        Table::Tenants => {
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                singleton BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
                fixed_salt BYTEA NOT NULL,
                password_expires_in_days INTEGER NOT NULL,
                time_to_change_password_after_expiration_in_days INTEGER NOT NULL,
                created_utc TIMESTAMPTZ NOT NULL
            )
            "#
        }
        Table::Users => {
            r#"
            CREATE TABLE IF NOT EXISTS users (
                identifier TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                password BYTEA NOT NULL,
                salt BYTEA NOT NULL,
                password_must_change BOOLEAN NOT NULL,
                password_expires_on DATE NOT NULL,
                created_utc TIMESTAMPTZ NOT NULL
            )
            "#
        }
        Table::PermittableGroups => {
            r#"
            CREATE TABLE IF NOT EXISTS permittable_groups (
                identifier TEXT PRIMARY KEY,
                permittables JSONB NOT NULL
            )
            "#
        }
        Table::Permissions => {
            r#"
            CREATE TABLE IF NOT EXISTS role_permissions (
                role_identifier TEXT NOT NULL,
                position INTEGER NOT NULL,
                permittable_group_identifier TEXT NOT NULL,
                allowed_operations TEXT[] NOT NULL,
                PRIMARY KEY (role_identifier, position)
            )
            "#
        }
        Table::Roles => {
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                identifier TEXT PRIMARY KEY
            )
            "#
        }
        Table::ApplicationSignatures => {
            r#"
            CREATE TABLE IF NOT EXISTS application_signatures (
                application_identifier TEXT NOT NULL,
                key_timestamp TEXT NOT NULL,
                public_key_mod BYTEA NOT NULL,
                public_key_exp BYTEA NOT NULL,
                PRIMARY KEY (application_identifier, key_timestamp)
            )
            "#
        }
        Table::ApplicationPermissions => {
            r#"
            CREATE TABLE IF NOT EXISTS application_permissions (
                application_identifier TEXT NOT NULL,
                permittable_group_identifier TEXT NOT NULL,
                allowed_operations TEXT[] NOT NULL,
                PRIMARY KEY (application_identifier, permittable_group_identifier)
            )
            "#
        }
        Table::ApplicationPermissionUsers => {
            r#"
            CREATE TABLE IF NOT EXISTS application_permission_users (
                application_identifier TEXT NOT NULL,
                permittable_group_identifier TEXT NOT NULL,
                user_identifier TEXT NOT NULL,
                enabled BOOLEAN NOT NULL,
                PRIMARY KEY (application_identifier, permittable_group_identifier, user_identifier)
            )
            "#
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_lock_key_is_stable_per_tenant() {
        let acme: TenantIdentifier = "acme".parse().unwrap();
        let globex: TenantIdentifier = "globex".parse().unwrap();

        assert_eq!(advisory_lock_key(&acme), advisory_lock_key(&acme));
        assert_ne!(advisory_lock_key(&acme), advisory_lock_key(&globex));
    }

    #[test]
    fn test_ddl_targets_matching_table() {
        for table in Table::ALL {
            let ddl = table_ddl(table);
            assert!(ddl.contains("CREATE TABLE IF NOT EXISTS"));
            assert!(
                ddl.contains(&format!(" {} (", table.name())),
                "DDL for {:?} should create {}",
                table,
                table.name()
            );
        }
    }

    #[test]
    fn test_permittable_record_round_trip() {
        let permittable = Permittable::new("identity-v1/users/*", Method::DELETE);
        let record = PermittableRecord::from(&permittable);

        assert_eq!(record.method, "DELETE");
        assert_eq!(record.into_permittable().unwrap(), permittable);
    }
}

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::models::{
    PermittableGroupEntity, RoleEntity, SignatureEntity, TenantEntity, TenantIdentifier, UserEntity,
};
use crate::services::error::StorageError;
use crate::services::store::{ProvisioningSession, ProvisioningStore, Table};

/// Everything stored for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantSnapshot {
    pub tables: BTreeSet<Table>,
    pub signatures: Vec<SignatureEntity>,
    pub tenant: Option<TenantEntity>,
    pub permittable_groups: Vec<PermittableGroupEntity>,
    pub roles: Vec<RoleEntity>,
    pub users: Vec<UserEntity>,
    /// Number of committed sessions.
    pub version: u64,
}

impl TenantSnapshot {
    pub fn permittable_group(&self, identifier: &str) -> Option<&PermittableGroupEntity> {
        self.permittable_groups
            .iter()
            .find(|g| g.identifier == identifier)
    }

    pub fn role(&self, identifier: &str) -> Option<&RoleEntity> {
        self.roles.iter().find(|r| r.identifier == identifier)
    }

    pub fn user(&self, identifier: &str) -> Option<&UserEntity> {
        self.users.iter().find(|u| u.identifier == identifier)
    }

    fn require_table(&self, table: Table, entity: &'static str) -> Result<(), StorageError> {
        if self.tables.contains(&table) {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "table {} does not exist for {}",
                table.name(),
                entity
            )))
        }
    }
}

/// Step at which the in-memory store reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    Begin,
    Schema(Table),
    Signature,
    Tenant,
    PermittableGroup,
    Role,
    User,
    Commit,
}

impl FailurePoint {
    /// Every step a provisioning run passes through.
    pub fn all() -> Vec<FailurePoint> {
        let mut points = vec![FailurePoint::Begin];
        points.extend(Table::ALL.into_iter().map(FailurePoint::Schema));
        points.extend([
            FailurePoint::Signature,
            FailurePoint::Tenant,
            FailurePoint::PermittableGroup,
            FailurePoint::Role,
            FailurePoint::User,
            FailurePoint::Commit,
        ]);
        points
    }
}

/// In-memory provisioning store with failure injection.
///
/// Sessions work on a private copy of the tenant's data and publish it on
/// commit, unless another session committed for the same tenant meanwhile.
#[derive(Clone, Default)]
pub struct MemoryProvisioningStore {
    tenants: Arc<Mutex<HashMap<String, TenantSnapshot>>>,
    failure: Arc<Mutex<Option<FailurePoint>>>,
}

impl MemoryProvisioningStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later session fail at `point`.
    pub fn fail_at(&self, point: Option<FailurePoint>) -> Result<(), StorageError> {
        let mut failure = self.failure.lock().map_err(poisoned)?;
        *failure = point;
        Ok(())
    }

    /// Committed state of a tenant.
    pub fn snapshot(&self, tenant: &TenantIdentifier) -> Result<TenantSnapshot, StorageError> {
        let tenants = self.tenants.lock().map_err(poisoned)?;
        Ok(tenants.get(tenant.as_str()).cloned().unwrap_or_default())
    }

    fn failure(&self) -> Result<Option<FailurePoint>, StorageError> {
        let failure = self.failure.lock().map_err(poisoned)?;
        Ok(*failure)
    }
}

#[async_trait]
impl ProvisioningStore for MemoryProvisioningStore {
    async fn begin(
        &self,
        tenant: &TenantIdentifier,
    ) -> Result<Box<dyn ProvisioningSession>, StorageError> {
        let failure = self.failure()?;
        if failure == Some(FailurePoint::Begin) {
            return Err(injected(FailurePoint::Begin));
        }
        let staged = self.snapshot(tenant)?;
        Ok(Box::new(MemoryProvisioningSession {
            store: self.clone(),
            tenant: tenant.to_string(),
            base_version: staged.version,
            staged,
            failure,
        }))
    }
}

struct MemoryProvisioningSession {
    store: MemoryProvisioningStore,
    tenant: String,
    base_version: u64,
    staged: TenantSnapshot,
    failure: Option<FailurePoint>,
}

impl MemoryProvisioningSession {
    fn check(&self, point: FailurePoint) -> Result<(), StorageError> {
        if self.failure == Some(point) {
            Err(injected(point))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProvisioningSession for MemoryProvisioningSession {
    async fn build_schema(&mut self, table: Table) -> Result<(), StorageError> {
        self.check(FailurePoint::Schema(table))?;
        self.staged.tables.insert(table);
        Ok(())
    }

    async fn find_tenant(&mut self) -> Result<Option<TenantEntity>, StorageError> {
        self.staged.require_table(Table::Tenants, "tenant")?;
        Ok(self.staged.tenant.clone())
    }

    async fn add_signature(&mut self, signature: &SignatureEntity) -> Result<(), StorageError> {
        self.check(FailurePoint::Signature)?;
        self.staged.require_table(Table::Signatures, "signature")?;
        if self
            .staged
            .signatures
            .iter()
            .any(|s| s.key_timestamp == signature.key_timestamp)
        {
            return Err(duplicate("signature", &signature.key_timestamp));
        }
        self.staged.signatures.push(signature.clone());
        Ok(())
    }

    async fn add_tenant(&mut self, tenant: &TenantEntity) -> Result<(), StorageError> {
        self.check(FailurePoint::Tenant)?;
        self.staged.require_table(Table::Tenants, "tenant")?;
        if self.staged.tenant.is_some() {
            return Err(duplicate("tenant", &self.tenant));
        }
        self.staged.tenant = Some(tenant.clone());
        Ok(())
    }

    async fn add_permittable_group(
        &mut self,
        group: &PermittableGroupEntity,
    ) -> Result<(), StorageError> {
        self.check(FailurePoint::PermittableGroup)?;
        self.staged
            .require_table(Table::PermittableGroups, "permittable group")?;
        if self.staged.permittable_group(&group.identifier).is_some() {
            return Err(duplicate("permittable group", &group.identifier));
        }
        self.staged.permittable_groups.push(group.clone());
        Ok(())
    }

    async fn add_role(&mut self, role: &RoleEntity) -> Result<(), StorageError> {
        self.check(FailurePoint::Role)?;
        self.staged.require_table(Table::Roles, "role")?;
        self.staged.require_table(Table::Permissions, "role")?;
        if self.staged.role(&role.identifier).is_some() {
            return Err(duplicate("role", &role.identifier));
        }
        self.staged.roles.push(role.clone());
        Ok(())
    }

    async fn add_user(&mut self, user: &UserEntity) -> Result<(), StorageError> {
        self.check(FailurePoint::User)?;
        self.staged.require_table(Table::Users, "user")?;
        if self.staged.user(&user.identifier).is_some() {
            return Err(duplicate("user", &user.identifier));
        }
        self.staged.users.push(user.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        self.check(FailurePoint::Commit)?;
        let MemoryProvisioningSession {
            store,
            tenant,
            base_version,
            mut staged,
            ..
        } = *self;

        let mut tenants = store.tenants.lock().map_err(poisoned)?;
        let current = tenants.get(&tenant).map(|s| s.version).unwrap_or_default();
        if current != base_version {
            return Err(StorageError::Constraint {
                entity: "tenant",
                detail: format!("{} was modified by a concurrent session", tenant),
            });
        }
        staged.version = base_version + 1;
        tenants.insert(tenant, staged);
        Ok(())
    }
}

fn injected(point: FailurePoint) -> StorageError {
    StorageError::Unavailable(format!("injected failure at {:?}", point))
}

fn duplicate(entity: &'static str, identifier: &str) -> StorageError {
    StorageError::Constraint {
        entity,
        detail: format!("{} already exists", identifier),
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Unavailable(format!("Memory store mutex poisoned: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantIdentifier {
        "acme".parse().unwrap()
    }

    fn tenant_entity() -> TenantEntity {
        TenantEntity::new(vec![9u8; 32], 93, 4)
    }

    #[tokio::test]
    async fn test_uncommitted_session_is_invisible() {
        let store = MemoryProvisioningStore::new();
        let mut session = store.begin(&tenant()).await.unwrap();
        session.build_schema(Table::Tenants).await.unwrap();
        session.add_tenant(&tenant_entity()).await.unwrap();
        drop(session);

        assert_eq!(store.snapshot(&tenant()).unwrap(), TenantSnapshot::default());
    }

    #[tokio::test]
    async fn test_commit_publishes_staged_state() {
        let store = MemoryProvisioningStore::new();
        let mut session = store.begin(&tenant()).await.unwrap();
        session.build_schema(Table::Tenants).await.unwrap();
        session.add_tenant(&tenant_entity()).await.unwrap();
        session.commit().await.unwrap();

        let snapshot = store.snapshot(&tenant()).unwrap();
        let stored = snapshot.tenant.expect("tenant should be committed");
        assert_eq!(stored.fixed_salt, vec![9u8; 32]);
        assert_eq!(stored.password_expires_in_days, 93);
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn test_writes_require_schema() {
        let store = MemoryProvisioningStore::new();
        let mut session = store.begin(&tenant()).await.unwrap();

        let result = session.add_tenant(&tenant_entity()).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_second_tenant_row_is_rejected() {
        let store = MemoryProvisioningStore::new();
        let mut session = store.begin(&tenant()).await.unwrap();
        session.build_schema(Table::Tenants).await.unwrap();
        session.add_tenant(&tenant_entity()).await.unwrap();

        let result = session.add_tenant(&tenant_entity()).await;
        assert!(matches!(result, Err(StorageError::Constraint { .. })));
    }

    #[tokio::test]
    async fn test_concurrent_commit_loses() {
        let store = MemoryProvisioningStore::new();
        let first = store.begin(&tenant()).await.unwrap();
        let second = store.begin(&tenant()).await.unwrap();

        first.commit().await.unwrap();
        let result = second.commit().await;
        assert!(matches!(result, Err(StorageError::Constraint { .. })));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryProvisioningStore::new();
        store.fail_at(Some(FailurePoint::Schema(Table::Users))).unwrap();
        let mut session = store.begin(&tenant()).await.unwrap();

        assert!(session.build_schema(Table::Signatures).await.is_ok());
        assert!(session.build_schema(Table::Users).await.is_err());
    }

    #[test]
    fn test_failure_points_cover_every_table() {
        let points = FailurePoint::all();
        assert_eq!(points.len(), 1 + Table::ALL.len() + 6);
    }
}

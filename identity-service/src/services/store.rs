use crate::models::{
    PermittableGroupEntity, RoleEntity, SignatureEntity, TenantEntity, TenantIdentifier, UserEntity,
};
use crate::services::error::StorageError;
use async_trait::async_trait;

/// Durable structures a tenant needs, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Signatures,
    Tenants,
    Users,
    PermittableGroups,
    Permissions,
    Roles,
    ApplicationSignatures,
    ApplicationPermissions,
    ApplicationPermissionUsers,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Signatures,
        Table::Tenants,
        Table::Users,
        Table::PermittableGroups,
        Table::Permissions,
        Table::Roles,
        Table::ApplicationSignatures,
        Table::ApplicationPermissions,
        Table::ApplicationPermissionUsers,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Signatures => "signatures",
            Table::Tenants => "tenants",
            Table::Users => "users",
            Table::PermittableGroups => "permittable_groups",
            Table::Permissions => "role_permissions",
            Table::Roles => "roles",
            Table::ApplicationSignatures => "application_signatures",
            Table::ApplicationPermissions => "application_permissions",
            Table::ApplicationPermissionUsers => "application_permission_users",
        }
    }
}

/// Opens provisioning sessions against a tenant's storage.
#[async_trait]
pub trait ProvisioningStore: Send + Sync {
    async fn begin(
        &self,
        tenant: &TenantIdentifier,
    ) -> Result<Box<dyn ProvisioningSession>, StorageError>;
}

/// One all-or-nothing unit of provisioning work for a single tenant.
///
/// Nothing written through a session is visible to others until `commit`
/// succeeds; dropping the session discards it.
#[async_trait]
pub trait ProvisioningSession: Send {
    /// Create the table if it does not exist yet.
    async fn build_schema(&mut self, table: Table) -> Result<(), StorageError>;

    async fn find_tenant(&mut self) -> Result<Option<TenantEntity>, StorageError>;

    async fn add_signature(&mut self, signature: &SignatureEntity) -> Result<(), StorageError>;

    async fn add_tenant(&mut self, tenant: &TenantEntity) -> Result<(), StorageError>;

    async fn add_permittable_group(
        &mut self,
        group: &PermittableGroupEntity,
    ) -> Result<(), StorageError>;

    async fn add_role(&mut self, role: &RoleEntity) -> Result<(), StorageError>;

    async fn add_user(&mut self, user: &UserEntity) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
}

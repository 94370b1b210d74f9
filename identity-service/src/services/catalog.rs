//! Bootstrap permission taxonomy.
//!
//! Every tenant starts with the same three permittable groups. Each declared
//! path pattern expands to one permittable per HTTP verb.

use crate::models::{
    AllowedOperation, PermissionType, Permittable, PermittableGroupEntity, RoleEntity,
};
use http::Method;

/// Identifier of the bootstrap super-user.
pub const SU_NAME: &str = "antony";

/// Identifier of the bootstrap super-user's role.
pub const SU_ROLE: &str = "su";

pub mod permittable_group_ids {
    pub const ROLE_MANAGEMENT: &str = "identity__v1__roles";
    pub const IDENTITY_MANAGEMENT: &str = "identity__v1__users";
    pub const SELF_MANAGEMENT: &str = "identity__v1__self";
}

/// Verbs every path pattern is expanded to, in order.
pub const PERMITTABLE_METHODS: [Method; 4] =
    [Method::GET, Method::POST, Method::PUT, Method::DELETE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapGroup {
    pub identifier: &'static str,
    pub paths: &'static [&'static str],
}

pub const BOOTSTRAP_GROUPS: [BootstrapGroup; 3] = [
    BootstrapGroup {
        identifier: permittable_group_ids::ROLE_MANAGEMENT,
        paths: &["/roles/*", "/permittablegroups/*"],
    },
    BootstrapGroup {
        identifier: permittable_group_ids::IDENTITY_MANAGEMENT,
        paths: &["/users/*"],
    },
    BootstrapGroup {
        identifier: permittable_group_ids::SELF_MANAGEMENT,
        paths: &[
            "/users/{useridentifier}/password",
            "/applications/*/permissions/*/users/{useridentifier}/enabled",
        ],
    },
];

/// Groups the super-user role gets full access to. Self-management is
/// deliberately absent.
pub const SUPER_USER_GROUPS: [&str; 2] = [
    permittable_group_ids::ROLE_MANAGEMENT,
    permittable_group_ids::IDENTITY_MANAGEMENT,
];

/// Expands path patterns into application-qualified permittables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCatalog {
    application_name: String,
}

impl PermissionCatalog {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
        }
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    /// Four permittables for one path pattern: GET, POST, PUT, DELETE.
    pub fn expand(&self, path: &str) -> [Permittable; 4] {
        let qualified = format!("{}{}", self.application_name, path);
        PERMITTABLE_METHODS.map(|method| Permittable::new(qualified.clone(), method))
    }

    pub fn permittable_group(&self, group: &BootstrapGroup) -> PermittableGroupEntity {
        let permittables = group
            .paths
            .iter()
            .flat_map(|path| self.expand(path))
            .collect();
        PermittableGroupEntity::new(group.identifier, permittables)
    }

    /// All bootstrap groups, in creation order.
    pub fn bootstrap_groups(&self) -> Vec<PermittableGroupEntity> {
        BOOTSTRAP_GROUPS
            .iter()
            .map(|group| self.permittable_group(group))
            .collect()
    }
}

pub fn full_access(permittable_group_identifier: &str) -> PermissionType {
    PermissionType::new(permittable_group_identifier, AllowedOperation::ALL)
}

/// The super-user role with full access to role and identity management.
pub fn super_user_role() -> RoleEntity {
    RoleEntity::new(
        SU_ROLE,
        SUPER_USER_GROUPS.into_iter().map(full_access).collect(),
    )
}

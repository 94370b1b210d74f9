//! Role model - tenant-scoped roles and the permissions they carry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Operation a permission allows on a permittable group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AllowedOperation {
    Read,
    Change,
    Delete,
}

impl AllowedOperation {
    pub const ALL: [AllowedOperation; 3] = [
        AllowedOperation::Read,
        AllowedOperation::Change,
        AllowedOperation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AllowedOperation::Read => "READ",
            AllowedOperation::Change => "CHANGE",
            AllowedOperation::Delete => "DELETE",
        }
    }
}

impl FromStr for AllowedOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "READ" => Ok(AllowedOperation::Read),
            "CHANGE" => Ok(AllowedOperation::Change),
            "DELETE" => Ok(AllowedOperation::Delete),
            other => Err(format!("Unknown allowed operation: {}", other)),
        }
    }
}

/// Grant of operations on one permittable group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionType {
    pub permittable_group_identifier: String,
    pub allowed_operations: BTreeSet<AllowedOperation>,
}

impl PermissionType {
    pub fn new(
        permittable_group_identifier: impl Into<String>,
        allowed_operations: impl IntoIterator<Item = AllowedOperation>,
    ) -> Self {
        Self {
            permittable_group_identifier: permittable_group_identifier.into(),
            allowed_operations: allowed_operations.into_iter().collect(),
        }
    }

    pub fn is_full_access(&self) -> bool {
        AllowedOperation::ALL
            .iter()
            .all(|op| self.allowed_operations.contains(op))
    }
}

/// Role entity (tenant-scoped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEntity {
    pub identifier: String,
    pub permissions: Vec<PermissionType>,
}

impl RoleEntity {
    pub fn new(identifier: impl Into<String>, permissions: Vec<PermissionType>) -> Self {
        Self {
            identifier: identifier.into(),
            permissions,
        }
    }

    /// Find the permission the role holds on a group, if any.
    pub fn permission_for(&self, permittable_group_identifier: &str) -> Option<&PermissionType> {
        self.permissions
            .iter()
            .find(|p| p.permittable_group_identifier == permittable_group_identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_string_round_trip() {
        for op in AllowedOperation::ALL {
            assert_eq!(op.as_str().parse::<AllowedOperation>(), Ok(op));
        }
        assert!("WRITE".parse::<AllowedOperation>().is_err());
    }

    #[test]
    fn test_full_access_requires_every_operation() {
        let full = PermissionType::new("identity__v1__roles", AllowedOperation::ALL);
        let partial = PermissionType::new(
            "identity__v1__roles",
            [AllowedOperation::Read, AllowedOperation::Change],
        );

        assert!(full.is_full_access());
        assert!(!partial.is_full_access());
    }

    #[test]
    fn test_duplicate_operations_collapse() {
        let permission = PermissionType::new(
            "identity__v1__users",
            [AllowedOperation::Read, AllowedOperation::Read],
        );
        assert_eq!(permission.allowed_operations.len(), 1);
    }

    #[test]
    fn test_permission_for_lookup() {
        let role = RoleEntity::new(
            "su",
            vec![PermissionType::new("identity__v1__users", AllowedOperation::ALL)],
        );
        assert!(role.permission_for("identity__v1__users").is_some());
        assert!(role.permission_for("identity__v1__self").is_none());
    }
}

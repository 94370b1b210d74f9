//! Permittable group model - named sets of (path, method) endpoints.

use http::Method;
use std::fmt;

/// A single endpoint a permission can grant access to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Permittable {
    /// Application-qualified path pattern, e.g. `identity-v1/roles/*`.
    pub path: String,
    pub method: Method,
}

impl Permittable {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self {
            path: path.into(),
            method,
        }
    }
}

impl fmt::Display for Permittable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Permittable group entity (tenant-scoped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermittableGroupEntity {
    pub identifier: String,
    pub permittables: Vec<Permittable>,
}

impl PermittableGroupEntity {
    pub fn new(identifier: impl Into<String>, permittables: Vec<Permittable>) -> Self {
        Self {
            identifier: identifier.into(),
            permittables,
        }
    }

    /// Check whether the group covers the given endpoint.
    pub fn grants(&self, path: &str, method: &Method) -> bool {
        self.permittables
            .iter()
            .any(|p| p.path == path && &p.method == method)
    }
}

//! Tenant model - per-tenant security parameters and tenant addressing.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Tenant identifier, usable verbatim as a PostgreSQL schema name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantIdentifier(String);

impl TenantIdentifier {
    /// PostgreSQL truncates identifiers beyond 63 bytes.
    pub const MAX_LEN: usize = 63;

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for splicing into DDL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl FromStr for TenantIdentifier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > Self::MAX_LEN {
            return Err(format!(
                "Tenant identifier must be 1 to {} characters long",
                Self::MAX_LEN
            ));
        }
        if !s.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(format!(
                "Tenant identifier must start with a lowercase letter: {}",
                s
            ));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(format!(
                "Tenant identifier may only contain lowercase letters, digits and '_': {}",
                s
            ));
        }
        if s.starts_with("pg_") {
            return Err(format!("Tenant identifier uses a reserved prefix: {}", s));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for TenantIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant security configuration. One row per tenant.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TenantEntity {
    pub fixed_salt: Vec<u8>,
    pub password_expires_in_days: i32,
    pub time_to_change_password_after_expiration_in_days: i32,
    pub created_utc: DateTime<Utc>,
}

impl TenantEntity {
    pub fn new(
        fixed_salt: Vec<u8>,
        password_expires_in_days: i32,
        time_to_change_password_after_expiration_in_days: i32,
    ) -> Self {
        Self {
            fixed_salt,
            password_expires_in_days,
            time_to_change_password_after_expiration_in_days,
            created_utc: Utc::now(),
        }
    }
}

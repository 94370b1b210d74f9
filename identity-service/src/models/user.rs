//! User model - tenant-scoped user accounts.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use std::fmt;

/// User entity (tenant-scoped).
#[derive(Clone, PartialEq, Eq, FromRow)]
pub struct UserEntity {
    pub identifier: String,
    pub role: String,
    /// Argon2 digest of the client-side password hash.
    pub password: Vec<u8>,
    /// Per-user salt followed by the tenant's fixed salt.
    pub salt: Vec<u8>,
    pub password_must_change: bool,
    pub password_expires_on: NaiveDate,
    pub created_utc: DateTime<Utc>,
}

impl UserEntity {
    /// Check if the password has expired as of `today`.
    pub fn password_expired(&self, today: NaiveDate) -> bool {
        self.password_expires_on < today
    }
}

impl fmt::Debug for UserEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEntity")
            .field("identifier", &self.identifier)
            .field("role", &self.role)
            .field("password", &"<redacted>")
            .field("salt", &"<redacted>")
            .field("password_must_change", &self.password_must_change)
            .field("password_expires_on", &self.password_expires_on)
            .field("created_utc", &self.created_utc)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    #[test]
    fn test_password_expiry_and_redaction() {
        let today = Utc::now().date_naive();
        let user = UserEntity {
            identifier: "antony".to_string(),
            role: "su".to_string(),
            password: vec![0xaa; 32],
            salt: vec![0xbb; 64],
            password_must_change: true,
            password_expires_on: today,
            created_utc: Utc::now(),
        };

        assert!(!user.password_expired(today));
        assert!(user.password_expired(today + Days::new(1)));

        let rendered = format!("{:?}", user);
        assert!(rendered.contains("antony"));
        assert!(!rendered.contains("170"));
    }
}

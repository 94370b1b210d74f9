use crate::models::UserEntity;
use crate::services::key_material::KeyMaterialProvider;
use crate::utils::password::{salted_digest, Password};
use chrono::{Days, Utc};
use std::sync::Arc;

/// Builds user entities with a salted password digest and expiry date.
#[derive(Clone)]
pub struct UserEntityCreator {
    salts: Arc<dyn KeyMaterialProvider>,
}

impl UserEntityCreator {
    pub fn new(salts: Arc<dyn KeyMaterialProvider>) -> Self {
        Self { salts }
    }

    /// Build a user whose stored digest covers `user salt ‖ fixed salt`.
    ///
    /// The password expires `days` from today whether or not the user must
    /// change it.
    pub fn build(
        &self,
        identifier: &str,
        role: &str,
        password: &Password,
        password_must_change: bool,
        fixed_salt: &[u8],
        days: i32,
    ) -> Result<UserEntity, anyhow::Error> {
        let days = u64::try_from(days).map_err(|_| {
            anyhow::anyhow!("Password expiry days must not be negative: {}", days)
        })?;

        let salt = self.salts.create_random_salt();
        let mut full_salt = Vec::with_capacity(salt.len() + fixed_salt.len());
        full_salt.extend_from_slice(&salt);
        full_salt.extend_from_slice(fixed_salt);
        let digest = salted_digest(password, &full_salt)?;

        let now = Utc::now();
        let password_expires_on = now
            .date_naive()
            .checked_add_days(Days::new(days))
            .ok_or_else(|| anyhow::anyhow!("Password expiry date out of range"))?;

        Ok(UserEntity {
            identifier: identifier.to_string(),
            role: role.to_string(),
            password: digest,
            salt: full_salt,
            password_must_change,
            password_expires_on,
            created_utc: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::key_material::RsaKeyMaterialProvider;
    use crate::utils::password::verify_digest;

    fn creator() -> UserEntityCreator {
        UserEntityCreator::new(Arc::new(RsaKeyMaterialProvider::new(1024, 16)))
    }

    #[test]
    fn test_digest_verifies_against_stored_salt() {
        let password = Password::new("abc123".to_string());
        let fixed_salt = [7u8; 32];
        let user = creator()
            .build("antony", "su", &password, true, &fixed_salt, 4)
            .expect("build");

        assert_eq!(user.salt.len(), 16 + 32);
        assert!(user.salt.ends_with(&fixed_salt));
        assert!(verify_digest(&password, &user.salt, &user.password).is_ok());
    }

    #[test]
    fn test_expiry_counts_days_regardless_of_must_change() {
        let password = Password::new("abc123".to_string());

        for must_change in [true, false] {
            let today = Utc::now().date_naive();
            let user = creator()
                .build("antony", "su", &password, must_change, &[1u8; 16], 4)
                .expect("build");
            let after = Utc::now().date_naive();

            assert!(user.password_expires_on >= today + Days::new(4));
            assert!(user.password_expires_on <= after + Days::new(4));
        }
    }

    #[test]
    fn test_zero_days_expires_today() {
        let password = Password::new("abc123".to_string());
        let today = Utc::now().date_naive();
        let user = creator()
            .build("antony", "su", &password, true, &[1u8; 16], 0)
            .expect("build");

        assert!(user.password_expires_on >= today);
        assert!(user.password_expires_on <= Utc::now().date_naive());
    }

    #[test]
    fn test_negative_days_rejected() {
        let password = Password::new("abc123".to_string());
        for must_change in [true, false] {
            assert!(creator()
                .build("bert", "su", &password, must_change, &[1u8; 16], -1)
                .is_err());
        }
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let password = Password::new("abc123".to_string());
        let first = creator()
            .build("a", "su", &password, true, &[1u8; 16], 4)
            .expect("build");
        let second = creator()
            .build("b", "su", &password, true, &[1u8; 16], 4)
            .expect("build");

        assert_ne!(first.salt, second.salt);
        assert_ne!(first.password, second.password);
    }
}

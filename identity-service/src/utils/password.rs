use argon2::Argon2;
use std::fmt;
use subtle::ConstantTimeEq;

/// Length in bytes of a stored password digest.
pub const DIGEST_LEN: usize = 32;

/// Newtype for a client-side password hash to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Derive the stored digest of a password using Argon2id.
///
/// The salt is supplied by the caller (user salt followed by the tenant's
/// fixed salt) and must be at least 8 bytes long.
pub fn salted_digest(password: &Password, salt: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    let mut digest = vec![0u8; DIGEST_LEN];
    Argon2::default()
        .hash_password_into(password.as_str().as_bytes(), salt, &mut digest)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(digest)
}

/// Verify a password against a stored digest using constant-time comparison
pub fn verify_digest(
    password: &Password,
    salt: &[u8],
    expected: &[u8],
) -> Result<(), anyhow::Error> {
    let actual = salted_digest(password, salt)?;
    if bool::from(actual.ct_eq(expected)) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Password verification failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_salted_digest() {
        let password = Password::new("abc123".to_string());
        let digest = salted_digest(&password, SALT).expect("Failed to hash password");

        assert_eq!(digest.len(), DIGEST_LEN);
        // Never the input bytes themselves
        assert_ne!(&digest[..6], b"abc123");
    }

    #[test]
    fn test_verify_digest_correct() {
        let password = Password::new("abc123".to_string());
        let digest = salted_digest(&password, SALT).expect("Failed to hash password");

        assert!(verify_digest(&password, SALT, &digest).is_ok());
    }

    #[test]
    fn test_verify_digest_incorrect() {
        let password = Password::new("abc123".to_string());
        let digest = salted_digest(&password, SALT).expect("Failed to hash password");

        let wrong_password = Password::new("abc124".to_string());
        assert!(verify_digest(&wrong_password, SALT, &digest).is_err());
    }

    #[test]
    fn test_different_salts_give_different_digests() {
        let password = Password::new("abc123".to_string());
        let digest1 = salted_digest(&password, SALT).expect("Failed to hash password");
        let digest2 =
            salted_digest(&password, b"fedcba9876543210").expect("Failed to hash password");

        assert_ne!(digest1, digest2);
    }

    #[test]
    fn test_short_salt_is_rejected() {
        let password = Password::new("abc123".to_string());
        assert!(salted_digest(&password, b"short").is_err());
    }

    #[test]
    fn test_blank_and_debug() {
        assert!(Password::new("  ".to_string()).is_blank());
        assert!(!Password::new("abc123".to_string()).is_blank());
        assert_eq!(
            format!("{:?}", Password::new("abc123".to_string())),
            "Password(<redacted>)"
        );
    }
}

use crate::models::{SignatureEntity, KEY_TIMESTAMP_FORMAT};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use rsa::{pkcs8::EncodePrivateKey, traits::PublicKeyParts, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;

/// Source of per-tenant key material.
///
/// Implementations block the calling thread; run them off the async runtime.
pub trait KeyMaterialProvider: Send + Sync {
    fn create_key_pair(&self) -> Result<KeyPairHolder, anyhow::Error>;
    fn create_random_salt(&self) -> Vec<u8>;
}

/// Freshly generated signing key pair, identified by its creation time.
#[derive(Clone)]
pub struct KeyPairHolder {
    pub timestamp: String,
    private_key: RsaPrivateKey,
}

impl KeyPairHolder {
    pub fn new(timestamp: String, private_key: RsaPrivateKey) -> Self {
        Self {
            timestamp,
            private_key,
        }
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// Short hex fingerprint of the modulus, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.private_key.n().to_bytes_be());
        hex::encode(&digest[..8])
    }

    /// Build the persistable signature entity for this key pair.
    pub fn to_entity(&self) -> Result<SignatureEntity, anyhow::Error> {
        let der = self
            .private_key
            .to_pkcs8_der()
            .map_err(|e| anyhow::anyhow!("Failed to encode private key: {}", e))?;
        Ok(SignatureEntity::new(
            self.timestamp.clone(),
            &self.public_key(),
            der.as_bytes().to_vec(),
        ))
    }
}

impl fmt::Debug for KeyPairHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPairHolder")
            .field("timestamp", &self.timestamp)
            .field("fingerprint", &self.fingerprint())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// RSA key pairs and salts from the operating system CSPRNG.
#[derive(Debug, Clone)]
pub struct RsaKeyMaterialProvider {
    key_bits: usize,
    salt_length: usize,
}

impl RsaKeyMaterialProvider {
    pub fn new(key_bits: usize, salt_length: usize) -> Self {
        Self {
            key_bits,
            salt_length,
        }
    }

    pub fn from_config(config: &crate::config::ProvisioningConfig) -> Self {
        Self::new(config.rsa_key_bits, config.salt_length)
    }
}

impl KeyMaterialProvider for RsaKeyMaterialProvider {
    fn create_key_pair(&self) -> Result<KeyPairHolder, anyhow::Error> {
        let timestamp = Utc::now().format(KEY_TIMESTAMP_FORMAT).to_string();
        let private_key = RsaPrivateKey::new(&mut OsRng, self.key_bits).map_err(|e| {
            tracing::error!(bits = self.key_bits, error = %e, "RSA key generation failed");
            anyhow::anyhow!("Failed to generate RSA key pair: {}", e)
        })?;
        Ok(KeyPairHolder::new(timestamp, private_key))
    }

    fn create_random_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; self.salt_length];
        OsRng.fill_bytes(&mut salt);
        salt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rsa::pkcs8::DecodePrivateKey;

    fn provider() -> RsaKeyMaterialProvider {
        RsaKeyMaterialProvider::new(1024, 32)
    }

    #[test]
    fn test_key_pair_has_requested_size_and_timestamp() {
        let keys = provider().create_key_pair().expect("key generation");

        assert_eq!(keys.public_key().size(), 128);
        assert!(NaiveDateTime::parse_from_str(&keys.timestamp, KEY_TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_entity_private_key_decodes() {
        let keys = provider().create_key_pair().expect("key generation");
        let entity = keys.to_entity().expect("entity");

        let decoded = RsaPrivateKey::from_pkcs8_der(&entity.private_key_der).expect("pkcs8");
        assert_eq!(decoded.to_public_key(), keys.public_key());
        assert_eq!(entity.public_key_mod, keys.public_key().n().to_bytes_be());
    }

    #[test]
    fn test_salts_are_fresh() {
        let provider = provider();
        let first = provider.create_random_salt();
        let second = provider.create_random_salt();

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }

    #[test]
    fn test_debug_hides_private_key() {
        let keys = provider().create_key_pair().expect("key generation");
        let rendered = format!("{:?}", keys);

        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains(&keys.fingerprint()));
    }
}

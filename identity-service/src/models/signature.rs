//! Signature model - a tenant's RSA signing identity and its public view.

use chrono::{DateTime, Utc};
use rsa::{traits::PublicKeyParts, BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Key identifiers are the UTC creation time in this format.
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H_%M_%S";

/// Persisted signing key pair of a tenant.
#[derive(Clone, PartialEq, Eq, FromRow)]
pub struct SignatureEntity {
    pub key_timestamp: String,
    /// Big-endian modulus.
    pub public_key_mod: Vec<u8>,
    /// Big-endian public exponent.
    pub public_key_exp: Vec<u8>,
    /// PKCS#8 DER encoding of the private key.
    pub private_key_der: Vec<u8>,
    pub valid: bool,
    pub created_utc: DateTime<Utc>,
}

impl SignatureEntity {
    pub fn new(key_timestamp: String, public_key: &RsaPublicKey, private_key_der: Vec<u8>) -> Self {
        Self {
            key_timestamp,
            public_key_mod: public_key.n().to_bytes_be(),
            public_key_exp: public_key.e().to_bytes_be(),
            private_key_der,
            valid: true,
            created_utc: Utc::now(),
        }
    }
}

impl fmt::Debug for SignatureEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureEntity")
            .field("key_timestamp", &self.key_timestamp)
            .field("public_key_bits", &(self.public_key_mod.len() * 8))
            .field("private_key_der", &"<redacted>")
            .field("valid", &self.valid)
            .field("created_utc", &self.created_utc)
            .finish()
    }
}

/// Public half of an RSA signing key, as handed to other services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(with = "base64url")]
    pub public_key_mod: Vec<u8>,
    #[serde(with = "base64url")]
    pub public_key_exp: Vec<u8>,
}

impl Signature {
    /// Rebuild the RSA public key for verification.
    pub fn to_public_key(&self) -> Result<RsaPublicKey, anyhow::Error> {
        RsaPublicKey::new(
            BigUint::from_bytes_be(&self.public_key_mod),
            BigUint::from_bytes_be(&self.public_key_exp),
        )
        .map_err(|e| anyhow::anyhow!("Invalid RSA public key: {}", e))
    }
}

/// Signing identity returned once a tenant has been provisioned.
///
/// The identity manager signs tenant tokens with the same key the
/// application registers, so both signatures carry the tenant key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSignatureSet {
    pub timestamp: String,
    pub application_signature: Signature,
    pub identity_manager_signature: Signature,
}

impl From<&SignatureEntity> for ApplicationSignatureSet {
    fn from(entity: &SignatureEntity) -> Self {
        let signature = Signature {
            public_key_mod: entity.public_key_mod.clone(),
            public_key_exp: entity.public_key_exp.clone(),
        };
        Self {
            timestamp: entity.key_timestamp.clone(),
            application_signature: signature.clone(),
            identity_manager_signature: signature,
        }
    }
}

mod base64url {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

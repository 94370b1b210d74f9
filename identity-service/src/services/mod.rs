//! Services layer for identity-service.
//!
//! Tenant provisioning and the collaborators it is assembled from.

pub mod catalog;
mod database;
pub mod error;
pub mod key_material;
pub mod memory;
pub mod metrics;
pub mod provisioner;
pub mod store;
pub mod user_creator;

pub use catalog::{PermissionCatalog, SU_NAME, SU_ROLE};
pub use database::{advisory_lock_key, PgProvisioningStore};
pub use error::{ProvisionError, StorageError};
pub use key_material::{KeyMaterialProvider, KeyPairHolder, RsaKeyMaterialProvider};
pub use memory::{FailurePoint, MemoryProvisioningStore, TenantSnapshot};
pub use provisioner::TenantProvisioner;
pub use store::{ProvisioningSession, ProvisioningStore, Table};
pub use user_creator::UserEntityCreator;

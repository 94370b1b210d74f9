pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use models::{ApplicationSignatureSet, TenantIdentifier};
pub use services::{ProvisionError, TenantProvisioner};

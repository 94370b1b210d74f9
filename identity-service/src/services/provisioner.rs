//! Tenant bootstrap.
//!
//! Creates everything a new tenant needs before its first login: the signing
//! key, the tenant's password policy, the permission taxonomy, the super-user
//! role and the super-user. All writes go through one storage session, so a
//! tenant is either fully provisioned or not at all.

use std::sync::Arc;
use std::time::Instant;

use crate::config::ProvisioningConfig;
use crate::models::{ApplicationSignatureSet, TenantEntity, TenantIdentifier};
use crate::services::catalog::{super_user_role, PermissionCatalog, SU_NAME, SU_ROLE};
use crate::services::error::ProvisionError;
use crate::services::key_material::{KeyMaterialProvider, KeyPairHolder};
use crate::services::metrics;
use crate::services::store::{ProvisioningSession, ProvisioningStore, Table};
use crate::services::user_creator::UserEntityCreator;
use crate::utils::password::Password;

#[derive(Clone)]
pub struct TenantProvisioner {
    store: Arc<dyn ProvisioningStore>,
    keys: Arc<dyn KeyMaterialProvider>,
    user_creator: UserEntityCreator,
    catalog: PermissionCatalog,
    config: ProvisioningConfig,
}

impl TenantProvisioner {
    pub fn new(
        store: Arc<dyn ProvisioningStore>,
        keys: Arc<dyn KeyMaterialProvider>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            store,
            user_creator: UserEntityCreator::new(Arc::clone(&keys)),
            keys,
            catalog: PermissionCatalog::new(config.application_name.clone()),
            config,
        }
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Provision a new tenant and return its public signing identity.
    ///
    /// # Errors
    ///
    /// `InvalidPasswordHash` for a blank hash, `AlreadyProvisioned` when the
    /// tenant exists, `Crypto` when key or digest generation fails, and
    /// `Storage` for any storage failure. Nothing is persisted on error.
    #[tracing::instrument(skip(self, tenant, initial_password_hash), fields(tenant = %tenant))]
    pub async fn provision_tenant(
        &self,
        tenant: &TenantIdentifier,
        initial_password_hash: &str,
    ) -> Result<ApplicationSignatureSet, ProvisionError> {
        let started = Instant::now();
        let password = Password::new(initial_password_hash.to_string());

        let result = self.provision(tenant, &password).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        let elapsed = started.elapsed();
        metrics::record_provisioning(outcome, elapsed);

        match &result {
            Ok(signatures) => tracing::info!(
                key_timestamp = %signatures.timestamp,
                elapsed_secs = elapsed.as_secs_f64(),
                "Tenant provisioned"
            ),
            Err(ProvisionError::Storage(e)) => {
                tracing::error!(error = %e, "Failed to provision storage for tenant")
            }
            Err(e) => tracing::warn!(error = %e, "Tenant provisioning rejected"),
        }

        result
    }

    /// Create any missing tables for a tenant without writing data.
    #[tracing::instrument(skip(self, tenant), fields(tenant = %tenant))]
    pub async fn ensure_schema(&self, tenant: &TenantIdentifier) -> Result<(), ProvisionError> {
        let mut session = self.store.begin(tenant).await?;
        build_schema(session.as_mut()).await?;
        session.commit().await?;
        Ok(())
    }

    async fn provision(
        &self,
        tenant: &TenantIdentifier,
        password: &Password,
    ) -> Result<ApplicationSignatureSet, ProvisionError> {
        if password.is_blank() {
            return Err(ProvisionError::InvalidPasswordHash);
        }

        let keys = self.generate_key_pair().await?;
        let fixed_salt = self.keys.create_random_salt();
        let signature = keys.to_entity().map_err(ProvisionError::Crypto)?;
        tracing::debug!(
            key_timestamp = %keys.timestamp,
            fingerprint = %keys.fingerprint(),
            "Generated tenant key material"
        );

        let mut session = self.store.begin(tenant).await?;
        build_schema(session.as_mut()).await?;

        if session.find_tenant().await?.is_some() {
            return Err(ProvisionError::AlreadyProvisioned);
        }

        session.add_signature(&signature).await?;
        session
            .add_tenant(&TenantEntity::new(
                fixed_salt.clone(),
                self.config.password_expires_in_days,
                self.config.time_to_change_password_after_expiration_in_days,
            ))
            .await?;

        for group in self.catalog.bootstrap_groups() {
            session.add_permittable_group(&group).await?;
            tracing::debug!(
                group = %group.identifier,
                permittables = group.permittables.len(),
                "Created permittable group"
            );
        }

        session.add_role(&super_user_role()).await?;

        let super_user = self
            .user_creator
            .build(
                SU_NAME,
                SU_ROLE,
                password,
                true,
                &fixed_salt,
                self.config.time_to_change_password_after_expiration_in_days,
            )
            .map_err(ProvisionError::Crypto)?;
        session.add_user(&super_user).await?;

        session.commit().await?;

        Ok(ApplicationSignatureSet::from(&signature))
    }

    async fn generate_key_pair(&self) -> Result<KeyPairHolder, ProvisionError> {
        let keys = Arc::clone(&self.keys);
        tokio::task::spawn_blocking(move || keys.create_key_pair())
            .await
            .map_err(|e| {
                ProvisionError::Crypto(anyhow::anyhow!("Key generation task failed: {}", e))
            })?
            .map_err(ProvisionError::Crypto)
    }
}

async fn build_schema(session: &mut dyn ProvisioningSession) -> Result<(), ProvisionError> {
    for table in Table::ALL {
        session.build_schema(table).await?;
    }
    Ok(())
}

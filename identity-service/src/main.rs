use identity_service::{
    config::IdentityConfig,
    db,
    models::TenantIdentifier,
    services::{metrics, PgProvisioningStore, RsaKeyMaterialProvider, TenantProvisioner},
};
use service_core::error::AppError;
use service_core::observability::logging::{init_tracing, shutdown_tracing};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let result = run().await;
    shutdown_tracing();

    if let Err(e) = result {
        tracing::error!(error = %e, "Tenant provisioning failed");
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )?;

    metrics::init_metrics().map_err(|e| {
        AppError::InternalError(anyhow::anyhow!("Failed to initialize metrics: {}", e))
    })?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let tenant: TenantIdentifier = required_env("TENANT_IDENTIFIER")?
        .parse()
        .map_err(|e: String| AppError::BadRequest(anyhow::anyhow!(e)))?;
    let initial_password_hash = required_env("SU_PASSWORD_HASH")?;

    let pool = db::create_pool(&config.database).await?;
    db::health_check(&pool).await?;

    let provisioner = TenantProvisioner::new(
        Arc::new(PgProvisioningStore::new(pool.clone())),
        Arc::new(RsaKeyMaterialProvider::from_config(&config.provisioning)),
        config.provisioning.clone(),
    );

    let result = provisioner
        .provision_tenant(&tenant, &initial_password_hash)
        .await;
    tracing::debug!(metrics = %metrics::get_metrics(), "Provisioning metrics");
    pool.close().await;
    let signatures = result?;

    let json = serde_json::to_string_pretty(&signatures)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
    println!("{}", json);

    Ok(())
}

fn required_env(key: &str) -> Result<String, AppError> {
    env::var(key)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("{} is required but not set", key)))
}

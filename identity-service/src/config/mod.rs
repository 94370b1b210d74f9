use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use validator::Validate;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub database: DatabaseConfig,
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Parameters every newly provisioned tenant is created with.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Validate)]
pub struct ProvisioningConfig {
    /// Prefix of every permittable path, e.g. `identity-v1`.
    #[validate(length(min = 1))]
    pub application_name: String,
    #[validate(range(min = 1))]
    pub password_expires_in_days: i32,
    #[validate(range(min = 0))]
    pub time_to_change_password_after_expiration_in_days: i32,
    #[validate(range(min = 1024, max = 8192))]
    pub rsa_key_bits: usize,
    #[validate(range(min = 16, max = 256))]
    pub salt_length: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            application_name: "identity-v1".to_string(),
            password_expires_in_days: 93,
            time_to_change_password_after_expiration_in_days: 4,
            rsa_key_bits: 2048,
            salt_length: 32,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let mut common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        if let Ok(level) = env::var("LOG_LEVEL") {
            common_config.log_level = level;
        }
        if let Ok(endpoint) = env::var("OTLP_ENDPOINT") {
            common_config.otlp_endpoint = Some(endpoint);
        }

        let defaults = ProvisioningConfig::default();

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            provisioning: ProvisioningConfig {
                application_name: get_env(
                    "APPLICATION_NAME",
                    Some(defaults.application_name.as_str()),
                    false,
                )?,
                password_expires_in_days: parse_env(
                    "PASSWORD_EXPIRES_IN_DAYS",
                    &defaults.password_expires_in_days.to_string(),
                )?,
                time_to_change_password_after_expiration_in_days: parse_env(
                    "TIME_TO_CHANGE_PASSWORD_AFTER_EXPIRATION_IN_DAYS",
                    &defaults
                        .time_to_change_password_after_expiration_in_days
                        .to_string(),
                )?,
                rsa_key_bits: parse_env("RSA_KEY_BITS", &defaults.rsa_key_bits.to_string())?,
                salt_length: parse_env("SALT_LENGTH", &defaults.salt_length.to_string())?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be greater than 0"
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        self.provisioning.validate().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid provisioning config: {}", e))
        })?;

        // In production, ensure stricter validation
        if self.environment == Environment::Prod && self.provisioning.rsa_key_bits < 2048 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RSA_KEY_BITS below 2048 not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env(key, Some(default), false)?)
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has invalid value {:?}: {}", key, raw, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provisioning: ProvisioningConfig) -> IdentityConfig {
        IdentityConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "identity-service".to_string(),
            service_version: "test".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/identity".to_string(),
                max_connections: 5,
                min_connections: 1,
            },
            provisioning,
        }
    }

    #[test]
    fn test_provisioning_defaults() {
        let defaults = ProvisioningConfig::default();

        assert_eq!(defaults.password_expires_in_days, 93);
        assert_eq!(defaults.time_to_change_password_after_expiration_in_days, 4);
        assert!(defaults.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_provisioning_values() {
        let blank_name = ProvisioningConfig {
            application_name: String::new(),
            ..Default::default()
        };
        let tiny_key = ProvisioningConfig {
            rsa_key_bits: 512,
            ..Default::default()
        };
        let negative_grace = ProvisioningConfig {
            time_to_change_password_after_expiration_in_days: -1,
            ..Default::default()
        };

        for provisioning in [blank_name, tiny_key, negative_grace] {
            assert!(config(provisioning).validate().is_err());
        }
    }

    #[test]
    fn test_prod_requires_full_size_keys() {
        let mut config = config(ProvisioningConfig {
            rsa_key_bits: 1024,
            ..Default::default()
        });
        assert!(config.validate().is_ok());

        config.environment = Environment::Prod;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_connections_bounded_by_max() {
        let mut config = config(ProvisioningConfig::default());
        config.database.min_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_value_reports_key() {
        let err = parse_value::<i32>("PASSWORD_EXPIRES_IN_DAYS", "ninety").unwrap_err();
        assert!(err.to_string().contains("PASSWORD_EXPIRES_IN_DAYS"));
        assert_eq!(parse_value::<usize>("SALT_LENGTH", " 32 ").unwrap(), 32);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }
}

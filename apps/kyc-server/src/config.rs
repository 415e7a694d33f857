// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into
//! [`KycConfig`]. Loading goes through a lookup closure so tests never touch
//! the process environment.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for applications, audit, documents and queue | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `KYC_ENVIRONMENT` | `production`, `staging` or `development` | `development` |
//! | `KYC_DEFAULT_PROVIDER` | `onfido`, `jumio` or `sumsub` | `onfido` |
//! | `KYC_ENCRYPTION_KEY` | 64 hex characters | Required for production |
//! | `KYC_DEV_KEY_SEED` | Seed for the development fallback key | none |
//! | `KYC_ALLOW_UNSIGNED_WEBHOOKS` | Accept webhooks when no secret is set | `false` |
//! | `KYC_PROVIDER_TIMEOUT_SECS` | Per-attempt vendor timeout | `30` |
//! | `KYC_PROVIDER_MAX_RETRIES` | Retries after the first attempt | `3` |
//! | `KYC_PROVIDER_BACKOFF_MS` | Exponential backoff base | `500` |
//! | `KYC_RATE_LIMIT_DELAY_SECS` | Delay on 429 without `Retry-After` | `5` |
//! | `KYC_SIMULATION_DELAY_SECS` | Delay before a simulated check completes | `5` |
//!
//! Vendor credentials: `ONFIDO_API_TOKEN`, `ONFIDO_WEBHOOK_SECRET`,
//! `ONFIDO_API_BASE_URL`; `JUMIO_API_TOKEN`, `JUMIO_API_SECRET`,
//! `JUMIO_WEBHOOK_SECRET`, `JUMIO_API_BASE_URL`; `SUMSUB_APP_TOKEN`,
//! `SUMSUB_SECRET_KEY`, `SUMSUB_WEBHOOK_SECRET`, `SUMSUB_API_BASE_URL`,
//! `SUMSUB_LEVEL_NAME`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::crypto::{CryptoError, KeySource};
use crate::providers::jumio::{self, JumioSettings};
use crate::providers::onfido::{self, OnfidoSettings};
use crate::providers::sumsub::{self, SumsubSettings};
use crate::providers::{retry, ProviderKind, RetryPolicy};

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "/data";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

pub const ENVIRONMENT_ENV: &str = "KYC_ENVIRONMENT";
pub const DEFAULT_PROVIDER_ENV: &str = "KYC_DEFAULT_PROVIDER";
pub const ENCRYPTION_KEY_ENV: &str = "KYC_ENCRYPTION_KEY";
pub const DEV_KEY_SEED_ENV: &str = "KYC_DEV_KEY_SEED";
pub const ALLOW_UNSIGNED_WEBHOOKS_ENV: &str = "KYC_ALLOW_UNSIGNED_WEBHOOKS";
pub const PROVIDER_TIMEOUT_ENV: &str = "KYC_PROVIDER_TIMEOUT_SECS";
pub const PROVIDER_MAX_RETRIES_ENV: &str = "KYC_PROVIDER_MAX_RETRIES";
pub const PROVIDER_BACKOFF_ENV: &str = "KYC_PROVIDER_BACKOFF_MS";
pub const RATE_LIMIT_DELAY_ENV: &str = "KYC_RATE_LIMIT_DELAY_SECS";
pub const SIMULATION_DELAY_ENV: &str = "KYC_SIMULATION_DELAY_SECS";

pub const DEFAULT_SIMULATION_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("refusing to start in production: {0}")]
    Refused(String),

    #[error(transparent)]
    Key(#[from] CryptoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentEnvironment {
    Production,
    Staging,
    Development,
}

impl DeploymentEnvironment {
    pub fn is_production(self) -> bool {
        self == DeploymentEnvironment::Production
    }
}

impl FromStr for DeploymentEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" | "dev" | "local" => Ok(Self::Development),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for DeploymentEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Development => "development",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Vendor credentials and the shared call policy.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub default_provider: ProviderKind,
    pub onfido: OnfidoSettings,
    pub jumio: JumioSettings,
    pub sumsub: SumsubSettings,
    pub retry: RetryPolicy,
    /// Force every adapter into simulation mode.
    pub simulate: bool,
}

impl ProvidersConfig {
    pub fn has_credentials(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::Onfido => self.onfido.has_credentials(),
            ProviderKind::Jumio => self.jumio.has_credentials(),
            ProviderKind::Sumsub => self.sumsub.has_credentials(),
        }
    }

    /// All adapters simulated with the given default.
    pub fn simulated(default_provider: ProviderKind) -> Self {
        Self {
            default_provider,
            onfido: OnfidoSettings {
                base_url: onfido::DEFAULT_API_BASE_URL.to_string(),
                ..Default::default()
            },
            jumio: JumioSettings {
                base_url: jumio::DEFAULT_API_BASE_URL.to_string(),
                ..Default::default()
            },
            sumsub: SumsubSettings {
                base_url: sumsub::DEFAULT_API_BASE_URL.to_string(),
                level_name: sumsub::DEFAULT_LEVEL_NAME.to_string(),
                ..Default::default()
            },
            retry: RetryPolicy::default(),
            simulate: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KycConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_format: LogFormat,
    pub environment: DeploymentEnvironment,
    pub providers: ProvidersConfig,
    pub encryption_key: KeySource,
    pub allow_unsigned_webhooks: bool,
    pub simulation_delay: Duration,
}

impl KycConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let get_or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let environment = parse_or(&get, ENVIRONMENT_ENV, DeploymentEnvironment::Development)?;
        let default_provider = parse_or(&get, DEFAULT_PROVIDER_ENV, ProviderKind::Onfido)?;

        let retry = RetryPolicy {
            timeout: Duration::from_secs(parse_or(
                &get,
                PROVIDER_TIMEOUT_ENV,
                retry::DEFAULT_TIMEOUT.as_secs(),
            )?),
            max_retries: parse_or(&get, PROVIDER_MAX_RETRIES_ENV, retry::DEFAULT_MAX_RETRIES)?,
            base_delay: Duration::from_millis(parse_or(
                &get,
                PROVIDER_BACKOFF_ENV,
                retry::DEFAULT_BASE_DELAY.as_millis() as u64,
            )?),
            rate_limit_delay: Duration::from_secs(parse_or(
                &get,
                RATE_LIMIT_DELAY_ENV,
                retry::DEFAULT_RATE_LIMIT_DELAY.as_secs(),
            )?),
            max_backoff: retry::MAX_BACKOFF,
        };

        let providers = ProvidersConfig {
            default_provider,
            onfido: OnfidoSettings {
                api_token: get("ONFIDO_API_TOKEN"),
                webhook_secret: get("ONFIDO_WEBHOOK_SECRET"),
                base_url: get_or("ONFIDO_API_BASE_URL", onfido::DEFAULT_API_BASE_URL),
            },
            jumio: JumioSettings {
                api_token: get("JUMIO_API_TOKEN"),
                api_secret: get("JUMIO_API_SECRET"),
                webhook_secret: get("JUMIO_WEBHOOK_SECRET"),
                base_url: get_or("JUMIO_API_BASE_URL", jumio::DEFAULT_API_BASE_URL),
            },
            sumsub: SumsubSettings {
                app_token: get("SUMSUB_APP_TOKEN"),
                secret_key: get("SUMSUB_SECRET_KEY"),
                webhook_secret: get("SUMSUB_WEBHOOK_SECRET"),
                base_url: get_or("SUMSUB_API_BASE_URL", sumsub::DEFAULT_API_BASE_URL),
                level_name: get_or("SUMSUB_LEVEL_NAME", sumsub::DEFAULT_LEVEL_NAME),
            },
            retry,
            simulate: environment == DeploymentEnvironment::Development,
        };

        let encryption_key = match get(ENCRYPTION_KEY_ENV) {
            Some(hex_key) => KeySource::from_hex(&hex_key)?,
            None if environment.is_production() => {
                return Err(ConfigError::Refused(format!(
                    "{ENCRYPTION_KEY_ENV} is not set"
                )))
            }
            None => KeySource::development_fallback(get(DEV_KEY_SEED_ENV).as_deref()),
        };

        let allow_unsigned_webhooks = parse_bool(&get, ALLOW_UNSIGNED_WEBHOOKS_ENV)?;
        if environment.is_production() {
            if allow_unsigned_webhooks {
                return Err(ConfigError::Refused(format!(
                    "{ALLOW_UNSIGNED_WEBHOOKS_ENV} cannot be enabled"
                )));
            }
            if !providers.has_credentials(default_provider) {
                return Err(ConfigError::Refused(format!(
                    "default provider {default_provider} has no credentials"
                )));
            }
        }

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: get_or(HOST_ENV, "0.0.0.0"),
            port: parse_or(&get, PORT_ENV, 8080)?,
            data_dir: PathBuf::from(get_or(DATA_DIR_ENV, DEFAULT_DATA_DIR)),
            log_format,
            environment,
            providers,
            encryption_key,
            allow_unsigned_webhooks,
            simulation_delay: Duration::from_secs(parse_or(
                &get,
                SIMULATION_DELAY_ENV,
                DEFAULT_SIMULATION_DELAY.as_secs(),
            )?),
        })
    }
}

fn parse_or<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(name) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, name: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<KycConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KycConfig::from_lookup(|name| map.get(name).cloned())
    }

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn defaults_are_development_and_simulated() {
        let config = load(&[]).unwrap();
        assert_eq!(config.environment, DeploymentEnvironment::Development);
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.providers.default_provider, ProviderKind::Onfido);
        assert!(config.providers.simulate);
        assert!(config.encryption_key.is_fallback());
        assert_eq!(config.providers.retry, RetryPolicy::default());
        assert_eq!(config.simulation_delay, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn production_requires_encryption_key() {
        let err = load(&[
            (ENVIRONMENT_ENV, "production"),
            ("ONFIDO_API_TOKEN", "token"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Refused(_)));
    }

    #[test]
    fn production_refuses_unsigned_webhooks() {
        let err = load(&[
            (ENVIRONMENT_ENV, "production"),
            (ENCRYPTION_KEY_ENV, KEY),
            ("ONFIDO_API_TOKEN", "token"),
            (ALLOW_UNSIGNED_WEBHOOKS_ENV, "true"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Refused(_)));
    }

    #[test]
    fn production_refuses_default_provider_without_credentials() {
        let err = load(&[
            (ENVIRONMENT_ENV, "production"),
            (ENCRYPTION_KEY_ENV, KEY),
            (DEFAULT_PROVIDER_ENV, "jumio"),
            ("JUMIO_API_TOKEN", "token"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Refused(_)));
    }

    #[test]
    fn production_with_credentials_is_live() {
        let config = load(&[
            (ENVIRONMENT_ENV, "production"),
            (ENCRYPTION_KEY_ENV, KEY),
            (DEFAULT_PROVIDER_ENV, "sumsub"),
            ("SUMSUB_APP_TOKEN", "app"),
            ("SUMSUB_SECRET_KEY", "secret"),
            (PROVIDER_MAX_RETRIES_ENV, "5"),
            (LOG_FORMAT_ENV, "JSON"),
        ])
        .unwrap();
        assert!(!config.providers.simulate);
        assert!(!config.encryption_key.is_fallback());
        assert_eq!(config.providers.default_provider, ProviderKind::Sumsub);
        assert_eq!(config.providers.retry.max_retries, 5);
        assert_eq!(config.providers.sumsub.level_name, "basic-kyc-level");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        let err = load(&[(PORT_ENV, "eighty")]).unwrap_err();
        assert!(err.to_string().starts_with("PORT is invalid"));
        let err = load(&[(ALLOW_UNSIGNED_WEBHOOKS_ENV, "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        let err = load(&[(ENCRYPTION_KEY_ENV, "abcd")]).unwrap_err();
        assert!(matches!(err, ConfigError::Key(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = load(&[("ONFIDO_API_TOKEN", "  "), (HOST_ENV, "")]).unwrap();
        assert!(!config.providers.has_credentials(ProviderKind::Onfido));
        assert_eq!(config.host, "0.0.0.0");
    }
}

use std::net::SocketAddr;

use env_helpers::get_env_default;
use secrecy::SecretString;
use url::Url;

use crate::infra::error::InfraError;
use crate::infra::stripe_signature::DEFAULT_SIGNATURE_TOLERANCE_SECS;
use crate::use_cases::price_cache::DEFAULT_PRICE_CACHE_TTL_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Docker,
    Production,
}

impl AppEnvironment {
    /// Unknown values fall back to production.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => AppEnvironment::Development,
            "docker" => AppEnvironment::Docker,
            _ => AppEnvironment::Production,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub struct AppConfig {
    pub app_env: AppEnvironment,
    pub debug: bool,
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub stripe_secret_key: SecretString,
    /// Unset means webhook bodies are accepted unverified.
    pub stripe_webhook_secret: Option<SecretString>,
    pub stripe_webhook_tolerance_secs: i64,
    pub price_cache_ttl_secs: i64,
    /// Base for the checkout success/cancel URLs handed to Stripe.
    pub public_base_url: Url,
    pub seed_vps_plans: bool,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let app_env = AppEnvironment::parse(&get_env_default("APP_ENV", "production".to_string()));
        let debug: bool = get_env_default("DEBUG", false);
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let database_url = required("DATABASE_URL")?;
        let stripe_secret_key = SecretString::new(required("STRIPE_SECRET_KEY")?.into());
        let stripe_webhook_secret = optional("STRIPE_WEBHOOK_SECRET").map(|s| SecretString::new(s.into()));
        let stripe_webhook_tolerance_secs: i64 = get_env_default(
            "STRIPE_WEBHOOK_TOLERANCE_SECS",
            DEFAULT_SIGNATURE_TOLERANCE_SECS,
        );
        let price_cache_ttl_secs: i64 =
            get_env_default("PRICE_CACHE_TTL_SECS", DEFAULT_PRICE_CACHE_TTL_SECS);
        let public_base_url: Url = get_env_default(
            "PUBLIC_BASE_URL",
            "http://localhost:3001".to_string(),
        )
        .parse()
        .map_err(|_| InfraError::ConfigInvalid {
            var: "PUBLIC_BASE_URL",
        })?;
        let seed_vps_plans: bool = get_env_default("SEED_VPS_PLANS", false);
        let log_format = match get_env_default("LOG_FORMAT", "pretty".to_string()).as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            app_env,
            debug,
            bind_addr,
            database_url,
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_webhook_tolerance_secs,
            price_cache_ttl_secs,
            public_base_url,
            seed_vps_plans,
            log_format,
        })
    }

    /// Unsigned webhook mode is never allowed in production.
    pub fn validate(&self) -> Result<(), InfraError> {
        if self.app_env == AppEnvironment::Production && self.stripe_webhook_secret.is_none() {
            return Err(InfraError::ConfigMissing {
                var: "STRIPE_WEBHOOK_SECRET",
            });
        }
        if self.price_cache_ttl_secs <= 0 {
            return Err(InfraError::ConfigInvalid {
                var: "PRICE_CACHE_TTL_SECS",
            });
        }
        Ok(())
    }

    /// The price-map inspection endpoint is only served outside production
    /// or when DEBUG is on.
    pub fn allows_dev_tools(&self) -> bool {
        self.debug || self.app_env != AppEnvironment::Production
    }
}

fn required(var: &'static str) -> Result<String, InfraError> {
    optional(var).ok_or(InfraError::ConfigMissing { var })
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::fulfillment::FulfillmentConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub fulfillment: FulfillmentConfig,
    /// Activation sidecar. Without it orders can be created and stock
    /// managed, but nothing can be fulfilled.
    #[serde(default)]
    pub driver: Option<DriverConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when `method = "api_key"`.
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file shared by stock, orders, workers and audit.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Audit channel capacity.
    #[serde(default = "default_audit_buffer")]
    pub audit_buffer: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            audit_buffer: default_audit_buffer(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("redeemer.db")
}

fn default_audit_buffer() -> usize {
    1000
}

/// HTTP activation sidecar configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    /// Endpoint receiving activation requests (e.g. "http://localhost:3001/activate")
    pub url: String,
    /// Sent as `X-API-Key` when set
    #[serde(default)]
    pub api_key: Option<String>,
    /// HTTP client timeout in seconds. The orchestrator applies its own
    /// per-activation timeout on top of this.
    #[serde(default = "default_driver_timeout")]
    pub timeout_secs: u64,
}

fn default_driver_timeout() -> u64 {
    180
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fulfillment: FulfillmentConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<SanitizedDriverConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_key_configured: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDriverConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                api_key_configured: config.auth.api_key.is_some(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            fulfillment: config.fulfillment.clone(),
            driver: config.driver.as_ref().map(|d| SanitizedDriverConfig {
                url: d.url.clone(),
                api_key_configured: d.api_key.as_deref().is_some_and(|k| !k.is_empty()),
                timeout_secs: d.timeout_secs,
            }),
        }
    }
}

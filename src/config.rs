//! Configuration management for chatsweep
//!
//! Loads configuration from environment variables, with a `.env` file
//! picked up automatically when present.

use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default per-request timeout for gateway calls, long poll included
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 60;

/// Default per-request timeout for backend record calls
const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// Default REST API version for the backend record store
const DEFAULT_BACKEND_API_VERSION: &str = "59.0";

/// Chat gateway connection settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Gateway host name, without scheme
    pub host: String,
    /// Value sent in the X-API-VERSION header
    pub api_version: String,
    /// Organization id sent with the presence login
    pub organization_id: String,
    /// Presence status id that marks the agent online
    pub status_id: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Delay between "not ready" poll retries, in milliseconds (0 = none)
    pub poll_retry_delay_ms: u64,
}

impl GatewayConfig {
    /// Per-request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Inter-retry delay for the message poller as a Duration
    pub fn poll_retry_delay(&self) -> Duration {
        Duration::from_millis(self.poll_retry_delay_ms)
    }
}

/// Backend record store connection settings
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Login host for the record store, without scheme
    pub host: String,
    /// Connected-app client id
    pub client_id: String,
    /// Connected-app client secret
    pub client_secret: SecretString,
    /// API user name
    pub username: String,
    /// API user password
    pub password: SecretString,
    /// Security token appended to the password (empty if none issued)
    pub security_token: SecretString,
    /// REST API version, e.g. "59.0"
    pub api_version: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl BackendConfig {
    /// Per-request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Recovery workflow settings
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// User that takes ownership of stuck conversations
    pub agent_user_id: String,
    /// Service channel the recovery work records are routed through
    pub service_channel_id: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level filter
    pub level: String,
    /// Log format (pretty, json)
    pub format: String,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat gateway settings
    pub gateway: GatewayConfig,
    /// Backend record store settings
    pub backend: BackendConfig,
    /// Recovery workflow settings
    pub workflow: WorkflowConfig,
    /// Logging settings
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Config {
            gateway: GatewayConfig {
                host: std::env::var("GATEWAY_HOST").unwrap_or_default(),
                api_version: std::env::var("GATEWAY_API_VERSION").unwrap_or_default(),
                organization_id: std::env::var("GATEWAY_ORG_ID").unwrap_or_default(),
                status_id: std::env::var("GATEWAY_STATUS_ID").unwrap_or_default(),
                timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECS),
                poll_retry_delay_ms: std::env::var("GATEWAY_POLL_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            },
            backend: BackendConfig {
                host: std::env::var("BACKEND_HOST").unwrap_or_default(),
                client_id: std::env::var("BACKEND_CLIENT_ID").unwrap_or_default(),
                client_secret: SecretString::from(
                    std::env::var("BACKEND_CLIENT_SECRET").unwrap_or_default(),
                ),
                username: std::env::var("BACKEND_USERNAME").unwrap_or_default(),
                password: SecretString::from(
                    std::env::var("BACKEND_PASSWORD").unwrap_or_default(),
                ),
                security_token: SecretString::from(
                    std::env::var("BACKEND_SECURITY_TOKEN").unwrap_or_default(),
                ),
                api_version: std::env::var("BACKEND_API_VERSION")
                    .unwrap_or_else(|_| DEFAULT_BACKEND_API_VERSION.to_string()),
                timeout_secs: std::env::var("BACKEND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BACKEND_TIMEOUT_SECS),
            },
            workflow: WorkflowConfig {
                agent_user_id: std::env::var("AGENT_USER_ID").unwrap_or_default(),
                service_channel_id: std::env::var("AGENT_CHANNEL_ID").unwrap_or_default(),
            },
            log: LogConfig {
                level: std::env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info,chatsweep=debug".to_string()),
                format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
        })
    }

    /// Validate that all required configuration is present
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("GATEWAY_HOST", &self.gateway.host),
            ("GATEWAY_API_VERSION", &self.gateway.api_version),
            ("GATEWAY_ORG_ID", &self.gateway.organization_id),
            ("GATEWAY_STATUS_ID", &self.gateway.status_id),
            ("BACKEND_HOST", &self.backend.host),
            ("BACKEND_CLIENT_ID", &self.backend.client_id),
            ("BACKEND_USERNAME", &self.backend.username),
            ("AGENT_USER_ID", &self.workflow.agent_user_id),
            ("AGENT_CHANNEL_ID", &self.workflow.service_channel_id),
        ];
        for (name, value) in required {
            if value.is_empty() {
                return Err(Error::Config(format!("{} is required", name)));
            }
        }
        if self.backend.client_secret.expose_secret().is_empty() {
            return Err(Error::Config("BACKEND_CLIENT_SECRET is required".to_string()));
        }
        if self.backend.password.expose_secret().is_empty() {
            return Err(Error::Config("BACKEND_PASSWORD is required".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            gateway: GatewayConfig {
                host: "gateway.example.test".to_string(),
                api_version: "60".to_string(),
                organization_id: "00Dtest".to_string(),
                status_id: "0N5test".to_string(),
                timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
                poll_retry_delay_ms: 0,
            },
            backend: BackendConfig {
                host: "records.example.test".to_string(),
                client_id: "client".to_string(),
                client_secret: SecretString::from("secret"),
                username: "agent@example.test".to_string(),
                password: SecretString::from("password"),
                security_token: SecretString::from(""),
                api_version: DEFAULT_BACKEND_API_VERSION.to_string(),
                timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            },
            workflow: WorkflowConfig {
                agent_user_id: "005test".to_string(),
                service_channel_id: "0N9test".to_string(),
            },
            log: LogConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let mut config = test_config();
        config.gateway.host = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("GATEWAY_HOST"));
    }

    #[test]
    fn test_missing_secret_is_named() {
        let mut config = test_config();
        config.backend.password = SecretString::from("");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("BACKEND_PASSWORD"));
    }

    #[test]
    fn test_durations() {
        let config = test_config();
        assert_eq!(config.gateway.timeout(), Duration::from_secs(60));
        assert_eq!(config.gateway.poll_retry_delay(), Duration::from_millis(0));
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
    }
}

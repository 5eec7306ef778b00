//! Fulfillment configuration.

use serde::{Deserialize, Serialize};

use crate::driver::default_lockout_markers;

/// Configuration for the fulfillment orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentConfig {
    /// Run the background loop that picks up pending orders on its own.
    /// When disabled, orders are fulfilled only through the API.
    #[serde(default)]
    pub enabled: bool,

    /// How often the background loop looks for ready orders (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Minimum age of a pending order before the loop picks it up, leaving
    /// the operator a window to cancel it and handle it by hand.
    #[serde(default = "default_auto_fulfill_delay")]
    pub auto_fulfill_delay_secs: u64,

    /// Upper bound on a single activation call.
    #[serde(default = "default_activation_timeout")]
    pub activation_timeout_secs: u64,

    /// Basket reservation attempts when other orders race for the same codes.
    #[serde(default = "default_allocation_retries")]
    pub allocation_retries: u32,

    /// Driver error substrings that mean the worker, not the code, failed.
    #[serde(default = "default_lockout_markers")]
    pub lockout_markers: Vec<String>,
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_auto_fulfill_delay() -> u64 {
    120
}

fn default_activation_timeout() -> u64 {
    180
}

fn default_allocation_retries() -> u32 {
    5
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: default_poll_interval(),
            auto_fulfill_delay_secs: default_auto_fulfill_delay(),
            activation_timeout_secs: default_activation_timeout(),
            allocation_retries: default_allocation_retries(),
            lockout_markers: default_lockout_markers(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FulfillmentConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.poll_interval_ms, 5000);
        assert_eq!(config.auto_fulfill_delay_secs, 120);
        assert_eq!(config.activation_timeout_secs, 180);
        assert_eq!(config.allocation_retries, 5);
        assert!(config.lockout_markers.iter().any(|m| m == "captcha"));
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            enabled = true
            lockout_markers = ["rate limit"]
        "#;
        let config: FulfillmentConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.lockout_markers, vec!["rate limit".to_string()]);
        assert_eq!(config.poll_interval_ms, 5000);
    }
}

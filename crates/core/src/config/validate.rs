use super::{types::Config, AuthMethod, ConfigError};

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

/// Validate configuration beyond what serde enforces.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().is_none_or(str::is_empty)
    {
        return Err(invalid("auth.api_key is required when auth.method = \"api_key\""));
    }

    if config.database.audit_buffer == 0 {
        return Err(invalid("database.audit_buffer must be at least 1"));
    }

    let f = &config.fulfillment;
    if f.poll_interval_ms == 0 {
        return Err(invalid("fulfillment.poll_interval_ms cannot be 0"));
    }
    if f.activation_timeout_secs == 0 {
        return Err(invalid("fulfillment.activation_timeout_secs cannot be 0"));
    }
    if f.allocation_retries == 0 {
        return Err(invalid("fulfillment.allocation_retries must be at least 1"));
    }
    if f.lockout_markers.iter().any(|m| m.trim().is_empty()) {
        return Err(invalid("fulfillment.lockout_markers cannot contain empty entries"));
    }

    if let Some(driver) = &config.driver {
        if !(driver.url.starts_with("http://") || driver.url.starts_with("https://")) {
            return Err(invalid(format!(
                "driver.url must be an http(s) URL, got {:?}",
                driver.url
            )));
        }
        if driver.timeout_secs == 0 {
            return Err(invalid("driver.timeout_secs cannot be 0"));
        }
    }

    if f.enabled && config.driver.is_none() {
        return Err(invalid(
            "fulfillment.enabled requires a [driver] section",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn parse(toml: &str) -> Config {
        load_config_from_str(toml).unwrap()
    }

    fn assert_invalid(toml: &str) {
        let result = validate_config(&parse(toml));
        assert!(
            matches!(result, Err(ConfigError::ValidationError(_))),
            "expected validation error for:\n{}",
            toml
        );
    }

    #[test]
    fn test_validate_minimal_config() {
        assert!(validate_config(&parse("[auth]\nmethod = \"none\"\n")).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        assert_invalid("[auth]\nmethod = \"none\"\n[server]\nport = 0\n");
    }

    #[test]
    fn test_api_key_method_needs_key() {
        assert_invalid("[auth]\nmethod = \"api_key\"\n");
        assert_invalid("[auth]\nmethod = \"api_key\"\napi_key = \"\"\n");
    }

    #[test]
    fn test_fulfillment_bounds() {
        assert_invalid("[auth]\nmethod = \"none\"\n[fulfillment]\nactivation_timeout_secs = 0\n");
        assert_invalid("[auth]\nmethod = \"none\"\n[fulfillment]\nallocation_retries = 0\n");
        assert_invalid("[auth]\nmethod = \"none\"\n[fulfillment]\nlockout_markers = [\"captcha\", \" \"]\n");
    }

    #[test]
    fn test_enabled_loop_needs_driver() {
        assert_invalid("[auth]\nmethod = \"none\"\n[fulfillment]\nenabled = true\n");

        let ok = parse(
            r#"
[auth]
method = "none"

[fulfillment]
enabled = true

[driver]
url = "http://localhost:3001/activate"
"#,
        );
        assert!(validate_config(&ok).is_ok());
    }

    #[test]
    fn test_driver_url_scheme() {
        assert_invalid("[auth]\nmethod = \"none\"\n[driver]\nurl = \"localhost:3001\"\n");
    }
}

//! Request authentication for operator endpoints.

mod api_key;
mod identity;

pub use api_key::ApiKeyAuthenticator;
pub use identity::{AuthRequest, Identity};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{AuthConfig, AuthMethod};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a request and return the caller's identity.
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    fn method_name(&self) -> &'static str;
}

/// Accepts every request as anonymous. Must be configured explicitly.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}

/// Build the authenticator selected in config.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    match config.method {
        AuthMethod::None => Ok(Box::new(NoneAuthenticator)),
        AuthMethod::ApiKey => {
            let key = config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    AuthError::ConfigurationError(
                        "auth.api_key must be set when method = \"api_key\"".to_string(),
                    )
                })?;
            Ok(Box::new(ApiKeyAuthenticator::new(key)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(method: AuthMethod, api_key: Option<&str>) -> AuthConfig {
        AuthConfig {
            method,
            api_key: api_key.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_none_accepts_anything() {
        let auth = create_authenticator(&config(AuthMethod::None, None)).unwrap();
        assert_eq!(auth.method_name(), "none");
        let identity = auth.authenticate(&AuthRequest::default()).await.unwrap();
        assert_eq!(identity.user_id, "anonymous");
    }

    #[test]
    fn test_api_key_requires_key() {
        assert!(matches!(
            create_authenticator(&config(AuthMethod::ApiKey, None)),
            Err(AuthError::ConfigurationError(_))
        ));
        assert!(matches!(
            create_authenticator(&config(AuthMethod::ApiKey, Some(""))),
            Err(AuthError::ConfigurationError(_))
        ));
        let auth = create_authenticator(&config(AuthMethod::ApiKey, Some("k"))).unwrap();
        assert_eq!(auth.method_name(), "api_key");
    }
}

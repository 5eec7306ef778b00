//! Shared-secret operator authentication.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Accepts `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub struct ApiKeyAuthenticator {
    expected_key: Vec<u8>,
}

impl ApiKeyAuthenticator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            expected_key: api_key.into().into_bytes(),
        }
    }

    fn presented_key(request: &AuthRequest) -> Option<&str> {
        let bearer = request.header("authorization").and_then(|value| {
            let (scheme, token) = value.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        });
        bearer.or_else(|| request.header("x-api-key"))
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let presented = Self::presented_key(request).ok_or(AuthError::NotAuthenticated)?;

        if constant_time_eq(presented.as_bytes(), &self.expected_key) {
            Ok(Identity::operator())
        } else {
            Err(AuthError::InvalidCredentials("Invalid API key".to_string()))
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new("s3cret")
    }

    #[tokio::test]
    async fn test_bearer_any_case() {
        for header in ["Bearer s3cret", "bearer s3cret", "BEARER s3cret"] {
            let request = AuthRequest::default().with_header("Authorization", header);
            let identity = auth().authenticate(&request).await.unwrap();
            assert_eq!(identity, Identity::operator());
        }
    }

    #[tokio::test]
    async fn test_x_api_key() {
        let request = AuthRequest::default().with_header("X-API-Key", "s3cret");
        assert!(auth().authenticate(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_or_missing_key() {
        let wrong = AuthRequest::default().with_header("x-api-key", "nope");
        assert!(matches!(
            auth().authenticate(&wrong).await,
            Err(AuthError::InvalidCredentials(_))
        ));
        assert!(matches!(
            auth().authenticate(&AuthRequest::default()).await,
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }
}

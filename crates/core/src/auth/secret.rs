//! Shared-secret authentication.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator};

/// Authenticator that validates requests against the configured shared
/// secret. The secret is accepted as a URL token prefix, an
/// `Authorization: Bearer` header or an `X-Api-Key` header.
pub struct SecretAuthenticator {
    expected: String,
}

impl SecretAuthenticator {
    pub fn new(shared_secret: String) -> Self {
        Self {
            expected: shared_secret,
        }
    }
}

#[async_trait]
impl Authenticator for SecretAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<(), AuthError> {
        let provided = request.credential().ok_or(AuthError::NotAuthenticated)?;

        if !self.expected.is_empty()
            && constant_time_eq(provided.as_bytes(), self.expected.as_bytes())
        {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials(
                "Invalid shared secret".to_string(),
            ))
        }
    }

    fn method_name(&self) -> &'static str {
        "shared_secret"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request(token: Option<&str>) -> AuthRequest {
        AuthRequest::new(token.map(|t| t.to_string()), HashMap::new())
    }

    #[tokio::test]
    async fn test_valid_token() {
        let auth = SecretAuthenticator::new("secret-123".to_string());
        assert!(auth.authenticate(&request(Some("secret-123"))).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let auth = SecretAuthenticator::new("secret-123".to_string());
        let result = auth.authenticate(&request(Some("wrong"))).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_missing_token() {
        let auth = SecretAuthenticator::new("secret-123".to_string());
        let result = auth.authenticate(&request(None)).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_empty_secret_rejects_everything() {
        // An unset secret must never authenticate; startup validation
        // rejects it, this is belt and braces for test configs.
        let auth = SecretAuthenticator::new(String::new());
        let result = auth.authenticate(&request(Some(""))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_header_fallback() {
        let auth = SecretAuthenticator::new("secret-123".to_string());
        let mut headers = HashMap::new();
        headers.insert("authorization".to_string(), "Bearer secret-123".to_string());
        let request = AuthRequest::new(None, headers);
        assert!(auth.authenticate(&request).await.is_ok());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }
}

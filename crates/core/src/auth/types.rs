use std::collections::HashMap;

/// Request information for authentication.
///
/// The token is whatever the transport layer found first: the URL path
/// prefix, a bearer header, or a `token` query parameter.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub token: Option<String>,
    pub headers: HashMap<String, String>,
}

impl AuthRequest {
    /// Build an auth request from a path token plus lowercased headers.
    pub fn new(token: Option<String>, headers: HashMap<String, String>) -> Self {
        Self { token, headers }
    }

    /// The credential to check: explicit token first, then the
    /// `Authorization: Bearer` header, then `X-Api-Key`.
    pub fn credential(&self) -> Option<String> {
        if let Some(token) = &self.token {
            return Some(token.clone());
        }
        if let Some(auth_header) = self.headers.get("authorization") {
            if let Some(key) = auth_header
                .strip_prefix("Bearer ")
                .or_else(|| auth_header.strip_prefix("bearer "))
            {
                return Some(key.to_string());
            }
        }
        self.headers.get("x-api-key").cloned()
    }
}

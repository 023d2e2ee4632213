mod secret;
mod traits;
mod types;

pub use secret::*;
pub use traits::*;
pub use types::*;

use crate::config::ServerConfig;

/// Factory function to create the authenticator from server config.
pub fn create_authenticator(server: &ServerConfig) -> SecretAuthenticator {
    SecretAuthenticator::new(server.shared_secret.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_authenticator_uses_shared_secret() {
        let server = ServerConfig {
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            shared_secret: "tok".to_string(),
            addon_name: "Streamnab".to_string(),
        };
        let auth = create_authenticator(&server);
        assert_eq!(auth.method_name(), "shared_secret");
    }
}

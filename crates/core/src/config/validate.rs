//! Configuration validation.

use super::{types::Config, ConfigError, IndexerManager};

/// Validate configuration beyond what parsing enforces.
///
/// Checks:
/// - server port is not 0 and the shared secret is set
/// - an aggregator selection carries a URL and API key
/// - enabled triage carries NNTP connection settings
/// - enabled Easynews carries credentials
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "PORT cannot be 0".to_string(),
        ));
    }

    if config.server.shared_secret.is_empty() {
        return Err(ConfigError::ValidationError(
            "ADDON_SHARED_SECRET must be set".to_string(),
        ));
    }

    if config.aggregator.manager != IndexerManager::None {
        if config.aggregator.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "INDEXER_MANAGER_URL must be set when an indexer manager is selected".to_string(),
            ));
        }
        if config.aggregator.api_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "INDEXER_MANAGER_API_KEY must be set when an indexer manager is selected"
                    .to_string(),
            ));
        }
    }

    if config.triage.enabled {
        if config.triage.nntp_host.is_empty() {
            return Err(ConfigError::ValidationError(
                "NZB_TRIAGE_NNTP_HOST must be set when triage is enabled".to_string(),
            ));
        }
        if config.triage.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "NZB_TRIAGE_MAX_CONNECTIONS cannot be 0 when triage is enabled".to_string(),
            ));
        }
        if config.triage.download_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "NZB_TRIAGE_DOWNLOAD_CONCURRENCY cannot be 0 when triage is enabled".to_string(),
            ));
        }
    }

    if config.easynews.enabled
        && (config.easynews.username.is_empty() || config.easynews.password.is_empty())
    {
        return Err(ConfigError::ValidationError(
            "EASYNEWS_USERNAME and EASYNEWS_PASSWORD must be set when Easynews is enabled"
                .to_string(),
        ));
    }

    Ok(())
}

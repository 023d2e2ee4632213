//! Configuration loading.
//!
//! The settings surface is a single flat JSON object of string keys
//! (`PORT`, `NEWZNAB_ENDPOINT_01`, `NZB_TRIAGE_ENABLED`, ...). The loader
//! merges the file with environment-variable overrides for the same keys,
//! then converts the flat map into the typed [`Config`].

use figment::{
    providers::{Format, Json},
    Figment,
};
use std::path::Path;

use crate::release::Resolution;

use super::types::{
    AggregatorConfig, CacheConfig, Config, EasynewsConfig, IndexerManager, MetadataConfig,
    MountConfig, NewznabConfig, RankingConfig, ServerConfig, SortMode, TriageConfig,
    NEWZNAB_SLOTS,
};
use super::ConfigError;

/// The flat key/value settings object.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Load the flat settings object from a JSON file, then overlay any
/// environment variables that name a known settings key.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let mut settings: Settings = Figment::new()
        .merge(Json::file(path))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    for key in known_keys() {
        if let Ok(value) = std::env::var(&key) {
            settings.insert(key, serde_json::Value::String(value));
        }
    }

    Ok(settings)
}

/// Load and convert in one step.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let settings = load_settings(path)?;
    Config::from_settings(&settings)
}

/// Parse a flat settings object from a JSON string (useful for testing).
pub fn load_config_from_str(json: &str) -> Result<Config, ConfigError> {
    let settings: Settings =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    Config::from_settings(&settings)
}

/// Every key the settings surface understands, in declaration order.
fn known_keys() -> Vec<String> {
    let mut keys: Vec<String> = [
        "PORT",
        "ADDON_BASE_URL",
        "ADDON_SHARED_SECRET",
        "ADDON_NAME",
        "INDEXER_MANAGER",
        "INDEXER_MANAGER_URL",
        "INDEXER_MANAGER_API_KEY",
        "INDEXER_MANAGER_BACKOFF_SECONDS",
        "NZB_SORT_MODE",
        "NZB_PREFERRED_LANGUAGE",
        "NZB_MAX_RESULT_SIZE_GB",
        "NZB_ALLOWED_RESOLUTIONS",
        "NZB_RESOLUTION_LIMIT_PER_QUALITY",
        "NZB_DEDUP_ENABLED",
        "NZB_HIDE_BLOCKED_RESULTS",
        "NZB_TRIAGE_ENABLED",
        "NZB_TRIAGE_TIME_BUDGET_MS",
        "NZB_TRIAGE_MAX_CANDIDATES",
        "NZB_TRIAGE_DOWNLOAD_CONCURRENCY",
        "NZB_TRIAGE_MAX_CONNECTIONS",
        "NZB_TRIAGE_STAT_SAMPLE_COUNT",
        "NZB_TRIAGE_ARCHIVE_SAMPLE_COUNT",
        "NZB_TRIAGE_NNTP_HOST",
        "NZB_TRIAGE_NNTP_PORT",
        "NZB_TRIAGE_NNTP_TLS",
        "NZB_TRIAGE_NNTP_USER",
        "NZB_TRIAGE_NNTP_PASS",
        "NZB_TRIAGE_NNTP_KEEP_ALIVE_MS",
        "NZB_TRIAGE_REUSE_POOL",
        "NZB_TRIAGE_PREFETCH_FIRST_VERIFIED",
        "NZB_TRIAGE_PRIORITY_INDEXERS",
        "NZB_TRIAGE_SERIALIZED_INDEXERS",
        "STREAM_CACHE_TTL_MINUTES",
        "STREAM_CACHE_MAX_SIZE_MB",
        "VERIFIED_NZB_CACHE_TTL_MINUTES",
        "VERIFIED_NZB_CACHE_MAX_SIZE_MB",
        "NZBDAV_CACHE_TTL_MINUTES",
        "NZBDAV_URL",
        "NZBDAV_API_KEY",
        "NZBDAV_WEBDAV_URL",
        "NZBDAV_WEBDAV_USER",
        "NZBDAV_WEBDAV_PASS",
        "NZBDAV_CATEGORY_MOVIES",
        "NZBDAV_CATEGORY_SERIES",
        "EASYNEWS_ENABLED",
        "EASYNEWS_USERNAME",
        "EASYNEWS_PASSWORD",
        "TMDB_API_KEY",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect();

    for slot in 1..=NEWZNAB_SLOTS {
        for prefix in [
            "NEWZNAB_ENDPOINT",
            "NEWZNAB_API_KEY",
            "NEWZNAB_API_PATH",
            "NEWZNAB_NAME",
            "NEWZNAB_INDEXER_ENABLED",
            "NEWZNAB_PAID",
        ] {
            keys.push(format!("{prefix}_{slot:02}"));
        }
    }

    keys
}

impl Config {
    /// Convert the flat settings object into the typed configuration.
    ///
    /// Missing keys fall back to defaults; malformed values are parse
    /// errors rather than silent fallbacks.
    pub fn from_settings(settings: &Settings) -> Result<Config, ConfigError> {
        let port = get_u64(settings, "PORT", 8080)? as u16;

        let server = ServerConfig {
            port,
            base_url: get_str(settings, "ADDON_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            shared_secret: get_str(settings, "ADDON_SHARED_SECRET").unwrap_or_default(),
            addon_name: get_str(settings, "ADDON_NAME")
                .unwrap_or_else(|| "Streamnab".to_string()),
        };

        let manager_raw = get_str(settings, "INDEXER_MANAGER").unwrap_or_default();
        let manager = IndexerManager::from_setting(&manager_raw).ok_or_else(|| {
            ConfigError::ParseError(format!("INDEXER_MANAGER: unknown value '{manager_raw}'"))
        })?;

        let aggregator = AggregatorConfig {
            manager,
            url: get_str(settings, "INDEXER_MANAGER_URL").unwrap_or_default(),
            api_key: get_str(settings, "INDEXER_MANAGER_API_KEY").unwrap_or_default(),
            backoff_seconds: get_u64(settings, "INDEXER_MANAGER_BACKOFF_SECONDS", 120)?,
        };

        let mut newznab = Vec::new();
        for slot in 1..=NEWZNAB_SLOTS {
            let endpoint =
                get_str(settings, &format!("NEWZNAB_ENDPOINT_{slot:02}")).unwrap_or_default();
            let api_key =
                get_str(settings, &format!("NEWZNAB_API_KEY_{slot:02}")).unwrap_or_default();
            let name = get_str(settings, &format!("NEWZNAB_NAME_{slot:02}")).unwrap_or_default();

            // A slot exists once anything is filled in; unusable slots are
            // kept so the sanitized view can show them.
            if endpoint.is_empty() && api_key.is_empty() && name.is_empty() {
                continue;
            }

            newznab.push(NewznabConfig {
                slot,
                endpoint,
                api_key,
                api_path: get_str(settings, &format!("NEWZNAB_API_PATH_{slot:02}"))
                    .unwrap_or_else(|| "/api".to_string()),
                name,
                enabled: get_bool(settings, &format!("NEWZNAB_INDEXER_ENABLED_{slot:02}"), true)?,
                paid: get_bool(settings, &format!("NEWZNAB_PAID_{slot:02}"), false)?,
            });
        }

        let sort_mode_raw =
            get_str(settings, "NZB_SORT_MODE").unwrap_or_else(|| "quality_then_size".to_string());
        let sort_mode = match sort_mode_raw.as_str() {
            "quality_then_size" => SortMode::QualityThenSize,
            "language_quality_size" => SortMode::LanguageQualitySize,
            other => {
                return Err(ConfigError::ParseError(format!(
                    "NZB_SORT_MODE: unknown value '{other}'"
                )))
            }
        };

        let max_size_gb = get_f64(settings, "NZB_MAX_RESULT_SIZE_GB", 0.0)?;
        let max_result_size_bytes = if max_size_gb > 0.0 {
            Some((max_size_gb * 1024.0 * 1024.0 * 1024.0) as u64)
        } else {
            None
        };

        let allowed_resolutions = match get_str(settings, "NZB_ALLOWED_RESOLUTIONS") {
            Some(raw) if !raw.trim().is_empty() => {
                let mut resolutions = Vec::new();
                for label in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let res = Resolution::from_label(label).ok_or_else(|| {
                        ConfigError::ParseError(format!(
                            "NZB_ALLOWED_RESOLUTIONS: unknown resolution '{label}'"
                        ))
                    })?;
                    resolutions.push(res);
                }
                Some(resolutions)
            }
            _ => None,
        };

        let per_quality = get_u64(settings, "NZB_RESOLUTION_LIMIT_PER_QUALITY", 0)?;
        let ranking = RankingConfig {
            sort_mode,
            preferred_languages: comma_list(settings, "NZB_PREFERRED_LANGUAGE"),
            max_result_size_bytes,
            allowed_resolutions,
            resolution_limit_per_quality: (per_quality > 0).then_some(per_quality as usize),
            dedup_enabled: get_bool(settings, "NZB_DEDUP_ENABLED", true)?,
            hide_blocked_results: get_bool(settings, "NZB_HIDE_BLOCKED_RESULTS", false)?,
        };

        let triage = TriageConfig {
            enabled: get_bool(settings, "NZB_TRIAGE_ENABLED", false)?,
            time_budget_ms: get_u64(settings, "NZB_TRIAGE_TIME_BUDGET_MS", 20_000)?,
            max_candidates: get_u64(settings, "NZB_TRIAGE_MAX_CANDIDATES", 25)? as usize,
            download_concurrency: get_u64(settings, "NZB_TRIAGE_DOWNLOAD_CONCURRENCY", 8)?
                as usize,
            max_connections: get_u64(settings, "NZB_TRIAGE_MAX_CONNECTIONS", 8)? as usize,
            stat_sample_count: get_u64(settings, "NZB_TRIAGE_STAT_SAMPLE_COUNT", 3)? as usize,
            archive_sample_count: get_u64(settings, "NZB_TRIAGE_ARCHIVE_SAMPLE_COUNT", 2)?
                as usize,
            nntp_host: get_str(settings, "NZB_TRIAGE_NNTP_HOST").unwrap_or_default(),
            nntp_port: get_u64(settings, "NZB_TRIAGE_NNTP_PORT", 563)? as u16,
            nntp_tls: get_bool(settings, "NZB_TRIAGE_NNTP_TLS", true)?,
            nntp_user: get_str(settings, "NZB_TRIAGE_NNTP_USER").unwrap_or_default(),
            nntp_pass: get_str(settings, "NZB_TRIAGE_NNTP_PASS").unwrap_or_default(),
            nntp_keep_alive_ms: get_u64(settings, "NZB_TRIAGE_NNTP_KEEP_ALIVE_MS", 60_000)?,
            reuse_pool: get_bool(settings, "NZB_TRIAGE_REUSE_POOL", true)?,
            prefetch_first_verified: get_bool(
                settings,
                "NZB_TRIAGE_PREFETCH_FIRST_VERIFIED",
                false,
            )?,
            priority_indexers: comma_list(settings, "NZB_TRIAGE_PRIORITY_INDEXERS"),
            serialized_indexers: comma_list(settings, "NZB_TRIAGE_SERIALIZED_INDEXERS"),
        };

        let cache = CacheConfig {
            stream_ttl_minutes: get_u64(settings, "STREAM_CACHE_TTL_MINUTES", 1440)?,
            stream_max_size_mb: get_u64(settings, "STREAM_CACHE_MAX_SIZE_MB", 200)?,
            verified_nzb_ttl_minutes: get_u64(settings, "VERIFIED_NZB_CACHE_TTL_MINUTES", 1440)?,
            verified_nzb_max_size_mb: get_u64(settings, "VERIFIED_NZB_CACHE_MAX_SIZE_MB", 300)?,
            mount_ttl_minutes: get_u64(settings, "NZBDAV_CACHE_TTL_MINUTES", 30)?,
        };

        let mount = MountConfig {
            url: get_str(settings, "NZBDAV_URL").unwrap_or_default(),
            api_key: get_str(settings, "NZBDAV_API_KEY").unwrap_or_default(),
            webdav_url: get_str(settings, "NZBDAV_WEBDAV_URL").unwrap_or_default(),
            webdav_user: get_str(settings, "NZBDAV_WEBDAV_USER").unwrap_or_default(),
            webdav_pass: get_str(settings, "NZBDAV_WEBDAV_PASS").unwrap_or_default(),
            category_movies: get_str(settings, "NZBDAV_CATEGORY_MOVIES")
                .unwrap_or_else(|| "movies".to_string()),
            category_series: get_str(settings, "NZBDAV_CATEGORY_SERIES")
                .unwrap_or_else(|| "series".to_string()),
        };

        let easynews = EasynewsConfig {
            enabled: get_bool(settings, "EASYNEWS_ENABLED", false)?,
            username: get_str(settings, "EASYNEWS_USERNAME").unwrap_or_default(),
            password: get_str(settings, "EASYNEWS_PASSWORD").unwrap_or_default(),
        };

        let metadata = MetadataConfig {
            tmdb_api_key: get_str(settings, "TMDB_API_KEY").unwrap_or_default(),
        };

        Ok(Config {
            server,
            aggregator,
            newznab,
            ranking,
            triage,
            cache,
            mount,
            easynews,
            metadata,
        })
    }
}

fn get_str(settings: &Settings, key: &str) -> Option<String> {
    match settings.get(key)? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn get_bool(settings: &Settings, key: &str, default: bool) -> Result<bool, ConfigError> {
    match settings.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(serde_json::Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(ConfigError::ParseError(format!(
                "{key}: expected a boolean, got '{other}'"
            ))),
        },
        Some(other) => Err(ConfigError::ParseError(format!(
            "{key}: expected a boolean, got {other}"
        ))),
    }
}

fn get_u64(settings: &Settings, key: &str, default: u64) -> Result<u64, ConfigError> {
    match settings.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Number(n)) => n.as_u64().ok_or_else(|| {
            ConfigError::ParseError(format!("{key}: expected a non-negative integer, got {n}"))
        }),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(default);
            }
            trimmed.parse::<u64>().map_err(|_| {
                ConfigError::ParseError(format!(
                    "{key}: expected a non-negative integer, got '{trimmed}'"
                ))
            })
        }
        Some(other) => Err(ConfigError::ParseError(format!(
            "{key}: expected a non-negative integer, got {other}"
        ))),
    }
}

fn get_f64(settings: &Settings, key: &str, default: f64) -> Result<f64, ConfigError> {
    match settings.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or_else(|| {
            ConfigError::ParseError(format!("{key}: expected a number, got {n}"))
        }),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(default);
            }
            trimmed.parse::<f64>().map_err(|_| {
                ConfigError::ParseError(format!("{key}: expected a number, got '{trimmed}'"))
            })
        }
        Some(other) => Err(ConfigError::ParseError(format!(
            "{key}: expected a number, got {other}"
        ))),
    }
}

fn comma_list(settings: &Settings, key: &str) -> Vec<String> {
    get_str(settings, key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_settings_use_defaults() {
        let config = load_config_from_str(r#"{"ADDON_SHARED_SECRET": "s3cret"}"#).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.base_url, "http://localhost:8080");
        assert_eq!(config.server.addon_name, "Streamnab");
        assert_eq!(config.aggregator.manager, IndexerManager::None);
        assert_eq!(config.aggregator.backoff_seconds, 120);
        assert!(config.newznab.is_empty());
        assert_eq!(config.ranking.sort_mode, SortMode::QualityThenSize);
        assert!(config.ranking.dedup_enabled);
        assert!(!config.triage.enabled);
        assert_eq!(config.triage.max_candidates, 25);
        assert_eq!(config.triage.download_concurrency, 8);
        assert_eq!(config.cache.stream_ttl_minutes, 1440);
        assert_eq!(config.cache.verified_nzb_max_size_mb, 300);
    }

    #[test]
    fn test_numbers_accept_strings() {
        let config = load_config_from_str(
            r#"{"ADDON_SHARED_SECRET": "s", "PORT": "9090", "NZB_TRIAGE_TIME_BUDGET_MS": "5000"}"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.triage.time_budget_ms, 5000);
    }

    #[test]
    fn test_bools_accept_strings() {
        let config = load_config_from_str(
            r#"{"ADDON_SHARED_SECRET": "s", "NZB_TRIAGE_ENABLED": "1", "NZB_DEDUP_ENABLED": "false"}"#,
        )
        .unwrap();
        assert!(config.triage.enabled);
        assert!(!config.ranking.dedup_enabled);
    }

    #[test]
    fn test_newznab_slots_collected_in_ordinal_order() {
        let config = load_config_from_str(
            r#"{
                "ADDON_SHARED_SECRET": "s",
                "NEWZNAB_ENDPOINT_03": "https://three.example",
                "NEWZNAB_API_KEY_03": "k3",
                "NEWZNAB_ENDPOINT_01": "https://one.example",
                "NEWZNAB_API_KEY_01": "k1",
                "NEWZNAB_NAME_01": "One",
                "NEWZNAB_PAID_01": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.newznab.len(), 2);
        assert_eq!(config.newznab[0].slot, 1);
        assert_eq!(config.newznab[0].name, "One");
        assert!(config.newznab[0].paid);
        assert_eq!(config.newznab[1].slot, 3);
        assert_eq!(config.newznab[1].api_path, "/api");
        assert!(config.newznab[1].enabled, "enabled defaults to true");
    }

    #[test]
    fn test_size_cap_conversion() {
        let config = load_config_from_str(
            r#"{"ADDON_SHARED_SECRET": "s", "NZB_MAX_RESULT_SIZE_GB": 2.5}"#,
        )
        .unwrap();
        assert_eq!(
            config.ranking.max_result_size_bytes,
            Some((2.5 * 1024.0 * 1024.0 * 1024.0) as u64)
        );
    }

    #[test]
    fn test_allowed_resolutions_parsing() {
        let config = load_config_from_str(
            r#"{"ADDON_SHARED_SECRET": "s", "NZB_ALLOWED_RESOLUTIONS": "1080p, 2160p,unknown"}"#,
        )
        .unwrap();
        assert_eq!(
            config.ranking.allowed_resolutions,
            Some(vec![
                Resolution::R1080p,
                Resolution::R2160p,
                Resolution::Unknown
            ])
        );
    }

    #[test]
    fn test_unknown_resolution_label_is_an_error() {
        let result = load_config_from_str(
            r#"{"ADDON_SHARED_SECRET": "s", "NZB_ALLOWED_RESOLUTIONS": "1080p,potato"}"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_unknown_sort_mode_is_an_error() {
        let result =
            load_config_from_str(r#"{"ADDON_SHARED_SECRET": "s", "NZB_SORT_MODE": "random"}"#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_comma_lists() {
        let config = load_config_from_str(
            r#"{
                "ADDON_SHARED_SECRET": "s",
                "NZB_PREFERRED_LANGUAGE": "Tamil, Hindi",
                "NZB_TRIAGE_SERIALIZED_INDEXERS": "nzbgeek,,drunkenslug "
            }"#,
        )
        .unwrap();
        assert_eq!(config.ranking.preferred_languages, vec!["Tamil", "Hindi"]);
        assert_eq!(
            config.triage.serialized_indexers,
            vec!["nzbgeek", "drunkenslug"]
        );
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/settings.json"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            r#"{{"ADDON_SHARED_SECRET": "file-secret", "PORT": 3000}}"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.shared_secret, "file-secret");
    }
}

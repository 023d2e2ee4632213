use std::sync::Arc;

use streamnab_core::cache::{MountHandleCache, ResponseCache, VerifiedNzbCache};
use streamnab_core::indexer::EasynewsClient;
use streamnab_core::metadata::{MetadataClient, TmdbClient};
use streamnab_core::mount::MountService;
use streamnab_core::nntp::PoolRegistry;
use streamnab_core::{create_authenticator, Authenticator, Config, Orchestrator, SanitizedConfig};

/// Shared application state: config, authenticator, the orchestrator
/// and the process-wide singletons it composes.
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    orchestrator: Orchestrator,
    response_cache: Arc<ResponseCache>,
    nzb_cache: Arc<VerifiedNzbCache>,
    mount_cache: Arc<MountHandleCache>,
    pool_registry: Arc<PoolRegistry>,
    mount: Option<Arc<MountService>>,
    easynews: Option<Arc<EasynewsClient>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let authenticator: Arc<dyn Authenticator> =
            Arc::new(create_authenticator(&config.server));

        let response_cache = Arc::new(ResponseCache::new(&config.cache));
        let nzb_cache = Arc::new(VerifiedNzbCache::new(&config.cache));
        let mount_cache = Arc::new(MountHandleCache::new(&config.cache));
        let pool_registry = Arc::new(PoolRegistry::new());

        let metadata: Option<Arc<dyn MetadataClient>> =
            match TmdbClient::new(config.metadata.clone()) {
                Ok(client) => Some(Arc::new(client)),
                Err(_) => None,
            };

        let mount = (!config.mount.url.is_empty())
            .then(|| Arc::new(MountService::new(config.mount.clone())));

        let easynews = config
            .easynews
            .enabled
            .then(|| Arc::new(EasynewsClient::new(config.easynews.clone())));

        let orchestrator = Orchestrator::new(
            config.clone(),
            metadata,
            mount.clone(),
            response_cache.clone(),
            nzb_cache.clone(),
            mount_cache.clone(),
            pool_registry.clone(),
        );

        Self {
            config,
            authenticator,
            orchestrator,
            response_cache,
            nzb_cache,
            mount_cache,
            pool_registry,
            mount,
            easynews,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn nzb_cache(&self) -> &Arc<VerifiedNzbCache> {
        &self.nzb_cache
    }

    pub fn mount_cache(&self) -> &Arc<MountHandleCache> {
        &self.mount_cache
    }

    pub fn mount(&self) -> Option<&Arc<MountService>> {
        self.mount.as_ref()
    }

    pub fn easynews(&self) -> Option<&Arc<EasynewsClient>> {
        self.easynews.as_ref()
    }

    /// Flush every cache and tear down the NNTP pool; used when the
    /// configuration changes under a running process.
    pub async fn flush_all(&self) {
        self.response_cache.flush();
        self.nzb_cache.flush();
        self.mount_cache.flush();
        self.pool_registry.teardown().await;
        tracing::info!("Caches flushed and NNTP pool torn down");
    }
}

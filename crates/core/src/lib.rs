//! streamnab-core: a streaming-catalog adapter for the Usenet
//! ecosystem.
//!
//! For each title request the library discovers candidate NZB releases
//! across indexer backends, ranks and deduplicates them, optionally
//! verifies a sample over a pooled NNTP connection, and produces a
//! prioritized stream list. Playback goes through an on-demand mount
//! service that turns an NZB into ranged HTTP reads.
//!
//! The server binary in `streamnab-server` wires this library to HTTP.

pub mod auth;
pub mod cache;
pub mod config;
pub mod indexer;
pub mod metadata;
pub mod mount;
pub mod nntp;
pub mod nzb;
pub mod orchestrator;
pub mod planner;
pub mod ranker;
pub mod release;
pub mod sniffer;
pub mod testing;
pub mod triage;

pub use auth::{create_authenticator, AuthError, AuthRequest, Authenticator, SecretAuthenticator};
pub use cache::{
    response_cache_key, CachedResponse, MountHandleCache, MountKey, ResponseCache, VerifiedNzb,
    VerifiedNzbCache,
};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError,
    SanitizedConfig};
pub use indexer::{EasynewsClient, IndexerClient, PayloadToken, Release, SearchPlan};
pub use metadata::{MetadataClient, MetadataError, TmdbClient};
pub use mount::{MountError, MountHandle, MountService, NzbSource};
pub use nntp::{NntpPool, PoolConfig, PoolRegistry};
pub use orchestrator::{Orchestrator, OrchestratorError, Stream, StreamRequest, StreamsResponse};
pub use triage::{TriageDecision, TriageRunner, TriageStatus};

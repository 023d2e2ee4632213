//! The three process-wide caches.
//!
//! Response and verified-NZB caches share one FIFO bookkeeping core:
//! TTL, entry/byte caps, strict insertion-order eviction. The mount
//! cache is a single-flight status machine.

mod fifo;
mod mount;
mod nzb_store;
mod response;

pub use fifo::{CacheWeight, FifoCache};
pub use mount::{MountHandleCache, MountKey};
pub use nzb_store::{VerifiedNzb, VerifiedNzbCache};
pub use response::{response_cache_key, CachedResponse, ResponseCache, RESPONSE_CACHE_VERSION};

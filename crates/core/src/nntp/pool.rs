//! Fixed-size NNTP connection pool.
//!
//! Capacity N is an invariant: once warm, `idle + in_use + replacing`
//! always equals N. Waiters are served FIFO. A client that fails with a
//! transport error is dropped and its slot refilled by a background
//! task that retries every second until success or shutdown.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::client::NntpClient;
use super::NntpError;

/// Delay between replacement attempts.
const REPLACEMENT_RETRY: Duration = Duration::from_secs(1);

/// A pool whose owner has not touched it for this many keep-alive
/// windows stops probing its idle clients.
const DORMANT_WINDOWS: u32 = 10;

/// Connection settings plus pool shape.
///
/// Pool identity for process-wide reuse is (host, port, user, tls,
/// capacity, keep_alive); the password is deliberately not part of it.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub user: String,
    pub pass: String,
    pub capacity: usize,
    pub keep_alive: Duration,
}

impl PoolConfig {
    /// Whether an existing pool built from `self` can serve `other`.
    pub fn matches(&self, other: &PoolConfig) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.tls == other.tls
            && self.user == other.user
            && self.capacity == other.capacity
            && self.keep_alive == other.keep_alive
    }
}

/// Point-in-time pool accounting, attached to triage summaries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PoolMetrics {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
    pub replacing: usize,
    pub waiters: usize,
}

struct IdleClient {
    client: NntpClient,
    last_used: Instant,
}

struct PoolState {
    idle: VecDeque<IdleClient>,
    waiters: VecDeque<oneshot::Sender<NntpClient>>,
    in_use: usize,
    replacing: usize,
    shutdown: bool,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    last_touch: Mutex<Instant>,
}

/// The shared pool handle.
#[derive(Clone)]
pub struct NntpPool {
    inner: Arc<PoolInner>,
}

impl NntpPool {
    /// Build a pool and start warming `capacity` connections in the
    /// background. Returns immediately; acquirers wait until warm-up
    /// lands clients.
    pub fn connect(config: PoolConfig) -> NntpPool {
        let capacity = config.capacity;
        let pool = NntpPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    waiters: VecDeque::new(),
                    in_use: 0,
                    replacing: capacity,
                    shutdown: false,
                }),
                last_touch: Mutex::new(Instant::now()),
            }),
        };

        for _ in 0..capacity {
            spawn_replacement(pool.inner.clone());
        }
        spawn_keep_alive(pool.inner.clone());

        pool
    }

    /// Acquire a client, waiting FIFO behind earlier acquirers when
    /// none is idle.
    pub async fn acquire(&self) -> Result<PooledClient, NntpError> {
        let rx = {
            let mut state = self.inner.state.lock().expect("pool lock poisoned");
            if state.shutdown {
                return Err(NntpError::ShuttingDown);
            }
            if let Some(idle) = state.idle.pop_front() {
                state.in_use += 1;
                return Ok(PooledClient {
                    client: Some(idle.client),
                    inner: self.inner.clone(),
                    drop_client: false,
                });
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };

        match rx.await {
            Ok(client) => Ok(PooledClient {
                client: Some(client),
                inner: self.inner.clone(),
                drop_client: false,
            }),
            Err(_) => Err(NntpError::ShuttingDown),
        }
    }

    /// Record pool activity; gates background eviction of idle clients.
    pub fn touch(&self) {
        *self.inner.last_touch.lock().expect("pool lock poisoned") = Instant::now();
    }

    /// Whether an existing pool can be reused for this config.
    pub fn config_matches(&self, config: &PoolConfig) -> bool {
        self.inner.config.matches(config)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("pool lock poisoned")
            .shutdown
    }

    /// Current accounting snapshot.
    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock().expect("pool lock poisoned");
        PoolMetrics {
            capacity: self.inner.config.capacity,
            idle: state.idle.len(),
            in_use: state.in_use,
            replacing: state.replacing,
            waiters: state.waiters.len(),
        }
    }

    /// Stop the pool: wake waiters with an error, QUIT idle clients.
    pub fn shutdown(&self) {
        let (idle, waiters) = {
            let mut state = self.inner.state.lock().expect("pool lock poisoned");
            state.shutdown = true;
            (
                std::mem::take(&mut state.idle),
                std::mem::take(&mut state.waiters),
            )
        };
        drop(waiters); // dropped senders resolve acquirers with an error
        for idle_client in idle {
            tokio::spawn(idle_client.client.quit());
        }
        debug!("NNTP pool shut down");
    }
}

/// A client checked out of the pool. Returning it to the pool happens
/// on drop; transport failures must be flagged with [`mark_drop`] so
/// the slot is refilled instead.
///
/// [`mark_drop`]: PooledClient::mark_drop
pub struct PooledClient {
    client: Option<NntpClient>,
    inner: Arc<PoolInner>,
    drop_client: bool,
}

impl PooledClient {
    /// Flag this client as poisoned; on drop its slot is refilled with
    /// a fresh connection.
    pub fn mark_drop(&mut self) {
        self.drop_client = true;
    }

    /// STAT through the pooled session; transport errors flag the
    /// client for drop.
    pub async fn stat(&mut self, message_id: &str) -> Result<super::StatOutcome, NntpError> {
        let result = self
            .client
            .as_mut()
            .expect("client taken before drop")
            .stat(message_id)
            .await;
        self.flag_on_transport_error(&result);
        result
    }

    /// BODY through the pooled session.
    pub async fn body(&mut self, message_id: &str) -> Result<Option<Vec<u8>>, NntpError> {
        let result = self
            .client
            .as_mut()
            .expect("client taken before drop")
            .body(message_id)
            .await;
        self.flag_on_transport_error(&result);
        result
    }

    /// BODY plus bounded yEnc decode.
    pub async fn body_decoded(
        &mut self,
        message_id: &str,
        max_decoded_bytes: usize,
    ) -> Result<Option<Vec<u8>>, NntpError> {
        let result = self
            .client
            .as_mut()
            .expect("client taken before drop")
            .body_decoded(message_id, max_decoded_bytes)
            .await;
        self.flag_on_transport_error(&result);
        result
    }

    fn flag_on_transport_error<T>(&mut self, result: &Result<T, NntpError>) {
        if let Err(e) = result {
            if e.is_transport_error() {
                self.drop_client = true;
            }
        }
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let runtime = tokio::runtime::Handle::try_current();
        let mut state = self.inner.state.lock().expect("pool lock poisoned");
        state.in_use -= 1;

        if state.shutdown {
            if let Ok(handle) = runtime {
                handle.spawn(client.quit());
            }
            return;
        }

        if self.drop_client {
            state.replacing += 1;
            drop(state);
            if let Ok(handle) = runtime {
                handle.spawn(client.quit());
                spawn_replacement(self.inner.clone());
            }
        } else {
            give_back(&mut state, client);
        }
    }
}

/// Hand a client to the oldest live waiter, or park it idle.
fn give_back(state: &mut PoolState, mut client: NntpClient) {
    loop {
        match state.waiters.pop_front() {
            Some(waiter) => match waiter.send(client) {
                Ok(()) => {
                    state.in_use += 1;
                    return;
                }
                // Waiter gave up; try the next one.
                Err(returned) => client = returned,
            },
            None => {
                state.idle.push_back(IdleClient {
                    client,
                    last_used: Instant::now(),
                });
                return;
            }
        }
    }
}

/// Background slot refill: retry every second until connected or the
/// pool shuts down. The slot is accounted in `replacing` the whole
/// time.
fn spawn_replacement(inner: Arc<PoolInner>) {
    tokio::spawn(async move {
        loop {
            if inner.state.lock().expect("pool lock poisoned").shutdown {
                inner.state.lock().expect("pool lock poisoned").replacing -= 1;
                return;
            }

            let config = &inner.config;
            match NntpClient::connect(
                &config.host,
                config.port,
                config.tls,
                &config.user,
                &config.pass,
            )
            .await
            {
                Ok(client) => {
                    let mut state = inner.state.lock().expect("pool lock poisoned");
                    state.replacing -= 1;
                    if state.shutdown {
                        drop(state);
                        tokio::spawn(client.quit());
                    } else {
                        give_back(&mut state, client);
                    }
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "NNTP replacement connect failed, retrying");
                    tokio::time::sleep(REPLACEMENT_RETRY).await;
                }
            }
        }
    });
}

/// Periodic liveness probing of idle clients: a bogus STAT whose 430
/// answer proves the session alive. Stale clients that fail the probe
/// are replaced.
fn spawn_keep_alive(inner: Arc<PoolInner>) {
    tokio::spawn(async move {
        let window = inner.config.keep_alive;
        let tick = window.max(Duration::from_secs(2)) / 2;

        loop {
            tokio::time::sleep(tick).await;

            {
                let state = inner.state.lock().expect("pool lock poisoned");
                if state.shutdown {
                    return;
                }
            }

            // A dormant pool (owner stopped touching it) is left alone.
            let last_touch = *inner.last_touch.lock().expect("pool lock poisoned");
            if last_touch.elapsed() > window * DORMANT_WINDOWS {
                continue;
            }

            let stale: Vec<NntpClient> = {
                let mut state = inner.state.lock().expect("pool lock poisoned");
                let mut stale = Vec::new();
                while let Some(front) = state.idle.front() {
                    if front.last_used.elapsed() >= window {
                        let idle = state.idle.pop_front().expect("front checked");
                        state.replacing += 1;
                        stale.push(idle.client);
                    } else {
                        break;
                    }
                }
                stale
            };

            for mut client in stale {
                let inner = inner.clone();
                tokio::spawn(async move {
                    let nonce: u64 = rand::random();
                    let probe_id = format!("keepalive-{nonce:x}@streamnab.invalid");
                    match client.stat(&probe_id).await {
                        // Either answer proves the session alive.
                        Ok(_) => {
                            let mut state = inner.state.lock().expect("pool lock poisoned");
                            state.replacing -= 1;
                            if state.shutdown {
                                drop(state);
                                tokio::spawn(client.quit());
                            } else {
                                give_back(&mut state, client);
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "Idle NNTP client failed keep-alive, replacing");
                            tokio::spawn(client.quit());
                            spawn_replacement(inner);
                        }
                    }
                });
            }
        }
    });
}

/// Process-wide pool reuse keyed on the pool identity. Only one build
/// runs at a time; concurrent warm-ups await the first.
pub struct PoolRegistry {
    current: tokio::sync::Mutex<Option<NntpPool>>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self {
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Get the live pool for this config, reusing a matching one when
    /// allowed and rebuilding otherwise.
    pub async fn get_or_build(&self, config: PoolConfig, reuse: bool) -> NntpPool {
        let mut current = self.current.lock().await;

        if reuse {
            if let Some(pool) = current.as_ref() {
                if pool.config_matches(&config) && !pool.is_shut_down() {
                    pool.touch();
                    return pool.clone();
                }
            }
        }

        if let Some(stale) = current.take() {
            stale.shutdown();
        }

        let pool = NntpPool::connect(config);
        *current = Some(pool.clone());
        pool
    }

    /// Tear down the current pool (config reloads, shutdown).
    pub async fn teardown(&self) {
        if let Some(pool) = self.current.lock().await.take() {
            pool.shutdown();
        }
    }
}

//! Single-flight coordination of server publisher lookups.
//!
//! State machine per publisher key:
//!
//! ```text
//! NoEntry ──fetch──▶ Pending ──fetch──▶ Pending (+1 waiter)
//!                       │
//!              ┌────────┴────────┐
//!          completed        max wait exceeded
//!              │                 │
//!              ▼                 ▼
//!          Resolved           Purged
//!   (waiters get result)  (waiters get Abandoned)
//! ```
//!
//! The pending map lives behind one mutex which is never held across an
//! `.await` or while waiters run.

use super::clock::{Clock, SystemClock};
use super::record::{ServerPublisherRecord, ServerPublisherResponse};
use super::FetchError;
use crate::config::FetchConfig;
use crate::event::{VerifierEvent, VerifierEventsSender};
use crate::transport::{Transport, UrlResponse};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Url;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result delivered to every waiter of a fetch.
pub type FetchOutcome = Result<ServerPublisherRecord, FetchError>;

type Waiter = Box<dyn FnOnce(FetchOutcome) + Send + 'static>;

struct PendingFetch {
    /// Distinguishes this fetch from a later one for the same key.
    generation: u64,
    started: Instant,
    waiters: Vec<Waiter>,
}

struct Shared {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    events: Option<VerifierEventsSender>,
    pending: Mutex<HashMap<String, PendingFetch>>,
    next_generation: AtomicU64,
}

/// Builder for a [`FetchCoordinator`].
pub struct FetchCoordinatorBuilder {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    events: Option<VerifierEventsSender>,
}

impl FetchCoordinatorBuilder {
    /// Use `clock` for timestamps and expiry checks.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish completion and purge events on `events`.
    #[must_use]
    pub fn events(mut self, events: VerifierEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the coordinator. The purge sweep is not started.
    #[must_use]
    pub fn build(self) -> FetchCoordinator {
        info!(
            "Fetch coordinator initialized (endpoint={}, ttl={}s, max_pending_wait={}s)",
            self.config.endpoint, self.config.ttl_secs, self.config.max_pending_wait_secs
        );

        FetchCoordinator {
            shared: Arc::new(Shared {
                config: self.config,
                transport: self.transport,
                clock: self.clock,
                events: self.events,
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
            sweep: Mutex::new(None),
        }
    }
}

/// Resolves publisher keys to server records with at most one in-flight
/// request per key.
///
/// The coordinator keeps no record cache. Callers consult their record store
/// and [`is_expired`](Self::is_expired) first, and only fetch on a miss.
pub struct FetchCoordinator {
    shared: Arc<Shared>,
    sweep: Mutex<Option<PurgeSweep>>,
}

impl FetchCoordinator {
    /// Start building a coordinator.
    #[must_use]
    pub fn builder(config: FetchConfig, transport: Arc<dyn Transport>) -> FetchCoordinatorBuilder {
        FetchCoordinatorBuilder {
            config,
            transport,
            clock: Arc::new(SystemClock),
            events: None,
        }
    }

    /// Create a coordinator using the system clock and no event channel.
    #[must_use]
    pub fn new(config: FetchConfig, transport: Arc<dyn Transport>) -> Self {
        Self::builder(config, transport).build()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.shared.config
    }

    /// Current time according to the coordinator's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    /// Whether a record last updated at `last_update` is stale.
    ///
    /// A record is expired once its age reaches the TTL. Timestamps in the
    /// future are never expired.
    #[must_use]
    pub fn is_expired(&self, last_update: DateTime<Utc>) -> bool {
        let age = self.now().signed_duration_since(last_update);
        chrono::Duration::from_std(self.shared.config.ttl()).is_ok_and(|ttl| age >= ttl)
    }

    /// Whether `record` is stale.
    #[must_use]
    pub fn is_expired_record(&self, record: &ServerPublisherRecord) -> bool {
        self.is_expired(record.updated_at)
    }

    /// Fetch the server record for `publisher_key`, invoking `callback` once
    /// with the outcome.
    ///
    /// If a fetch for the key is already in flight the callback joins it and
    /// no new request is made. Callbacks for one key run in the order they
    /// were registered. A panicking callback is logged and does not affect
    /// the others, unless the build aborts on panic. Must be called from
    /// within a Tokio runtime.
    pub fn fetch_with<F>(&self, publisher_key: &str, callback: F)
    where
        F: FnOnce(FetchOutcome) + Send + 'static,
    {
        let generation = {
            let mut pending = self.shared.pending.lock();
            if let Some(entry) = pending.get_mut(publisher_key) {
                entry.waiters.push(Box::new(callback));
                debug!(
                    "Joined in-flight fetch for {publisher_key} ({} waiters)",
                    entry.waiters.len()
                );
                return;
            }

            let generation = self.shared.next_generation.fetch_add(1, Ordering::Relaxed);
            pending.insert(
                publisher_key.to_string(),
                PendingFetch {
                    generation,
                    started: Instant::now(),
                    waiters: vec![Box::new(callback) as Waiter],
                },
            );
            generation
        };

        let shared = Arc::clone(&self.shared);
        let publisher_key = publisher_key.to_string();
        tokio::spawn(async move {
            let outcome = shared.request(&publisher_key).await;
            shared.run_callbacks(&publisher_key, generation, outcome);
        });
    }

    /// Fetch the server record for `publisher_key`.
    ///
    /// The request is registered when this method is called, not when the
    /// returned future is first polled.
    pub fn fetch(&self, publisher_key: &str) -> impl Future<Output = FetchOutcome> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.fetch_with(publisher_key, move |outcome| {
            let _ = tx.send(outcome);
        });
        async move { rx.await.unwrap_or(Err(FetchError::Cancelled)) }
    }

    /// Fail and remove every pending fetch older than the configured maximum
    /// wait. Returns the number of keys purged.
    pub fn purge_expired_records(&self) -> usize {
        self.shared.purge_expired()
    }

    /// Start the periodic purge sweep if it is not running.
    ///
    /// The sweep stops when the coordinator is dropped or
    /// [`stop_purge_sweep`](Self::stop_purge_sweep) is called.
    pub fn start_purge_sweep(&self) {
        let mut sweep = self.sweep.lock();
        if sweep.is_none() {
            *sweep = Some(PurgeSweep::spawn(
                Arc::downgrade(&self.shared),
                self.shared.config.purge_interval(),
            ));
        }
    }

    /// Stop the purge sweep. Returns false if it was not running.
    pub fn stop_purge_sweep(&self) -> bool {
        self.sweep.lock().take().is_some()
    }

    /// Number of keys with a fetch in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Whether a fetch for `publisher_key` is in flight.
    #[must_use]
    pub fn is_pending(&self, publisher_key: &str) -> bool {
        self.shared.pending.lock().contains_key(publisher_key)
    }

    /// Number of waiters on the in-flight fetch for `publisher_key`.
    #[must_use]
    pub fn waiter_count(&self, publisher_key: &str) -> usize {
        self.shared
            .pending
            .lock()
            .get(publisher_key)
            .map_or(0, |entry| entry.waiters.len())
    }
}

impl Shared {
    fn publisher_url(&self, publisher_key: &str) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| FetchError::Transport(format!("Invalid endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| FetchError::Transport("Endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["publishers", publisher_key]);
        Ok(url)
    }

    async fn request(&self, publisher_key: &str) -> FetchOutcome {
        let url = self.publisher_url(publisher_key)?;
        let timeout = self.config.request_timeout();
        debug!("Fetching server publisher info for {publisher_key}");

        match tokio::time::timeout(timeout, self.transport.get(url.as_str())).await {
            Ok(Ok(response)) => self.parse_response(publisher_key, &response),
            Ok(Err(e)) => {
                warn!("Publisher fetch for {publisher_key} failed: {e}");
                Err(FetchError::Transport(e.to_string()))
            }
            Err(_) => {
                warn!("Publisher fetch for {publisher_key} timed out");
                Err(FetchError::TimedOut(timeout))
            }
        }
    }

    fn parse_response(&self, publisher_key: &str, response: &UrlResponse) -> FetchOutcome {
        if !response.is_success() {
            warn!(
                "Publisher fetch for {publisher_key} returned status {}",
                response.status
            );
            return Err(FetchError::Status(response.status));
        }

        let now = self.clock.now();

        // An empty body means the server has no record. Stamping the
        // synthesized record lets the TTL throttle re-checks.
        if response.body.iter().all(u8::is_ascii_whitespace) {
            debug!("Empty publisher response for {publisher_key}, treating as not verified");
            return Ok(ServerPublisherRecord::not_verified(publisher_key, now));
        }

        serde_json::from_slice::<ServerPublisherResponse>(&response.body)
            .map(|parsed| parsed.into_record(publisher_key, now))
            .map_err(|e| {
                warn!("Malformed publisher response for {publisher_key}: {e}");
                FetchError::MalformedResponse(e.to_string())
            })
    }

    fn run_callbacks(&self, publisher_key: &str, generation: u64, outcome: FetchOutcome) {
        let waiters = {
            let mut pending = self.pending.lock();
            match pending.get(publisher_key) {
                Some(entry) if entry.generation == generation => pending
                    .remove(publisher_key)
                    .map(|entry| entry.waiters)
                    .unwrap_or_default(),
                _ => {
                    debug!("Dropping late result for {publisher_key}: fetch was purged");
                    return;
                }
            }
        };

        debug!(
            "Fetch for {publisher_key} completed (success={}), notifying {} waiters",
            outcome.is_ok(),
            waiters.len()
        );
        if let Some(events) = &self.events {
            let _ = events.send(VerifierEvent::FetchCompleted {
                publisher_key: publisher_key.to_string(),
                success: outcome.is_ok(),
                waiters: waiters.len(),
            });
        }

        notify(publisher_key, waiters, &outcome);
    }

    fn purge_expired(&self) -> usize {
        let max_wait = self.config.max_pending_wait();
        let now = Instant::now();

        let expired: Vec<(String, PendingFetch)> = {
            let mut pending = self.pending.lock();
            let keys: Vec<String> = pending
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.started) > max_wait)
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter()
                .filter_map(|key| pending.remove_entry(key))
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        if let Some(events) = &self.events {
            let _ = events.send(VerifierEvent::FetchesPurged {
                publisher_keys: expired.iter().map(|(key, _)| key.clone()).collect(),
            });
        }

        for (publisher_key, entry) in &expired {
            warn!(
                "Abandoning fetch for {publisher_key} after {:?} ({} waiters)",
                now.duration_since(entry.started),
                entry.waiters.len()
            );
        }
        let count = expired.len();
        for (publisher_key, entry) in expired {
            let waited = now.duration_since(entry.started);
            notify(&publisher_key, entry.waiters, &Err(FetchError::Abandoned(waited)));
        }
        count
    }
}

/// Invoke every waiter once, in order. A panicking waiter does not stop the
/// ones queued behind it.
fn notify(publisher_key: &str, waiters: Vec<Waiter>, outcome: &FetchOutcome) {
    for waiter in waiters {
        let outcome = outcome.clone();
        if panic::catch_unwind(AssertUnwindSafe(move || waiter(outcome))).is_err() {
            warn!("Waiter for {publisher_key} panicked");
        }
    }
}

/// Owned handle to the periodic purge task. Dropping it stops the task.
struct PurgeSweep {
    handle: JoinHandle<()>,
}

impl PurgeSweep {
    fn spawn(shared: Weak<Shared>, interval: std::time::Duration) -> Self {
        debug!("Starting purge sweep every {interval:?}");
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let purged = shared.purge_expired();
                if purged > 0 {
                    debug!("Purge sweep abandoned {purged} pending fetches");
                }
            }
        });
        Self { handle }
    }
}

impl Drop for PurgeSweep {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

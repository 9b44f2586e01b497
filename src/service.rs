//! Long-running verifier service: purge sweep, prefix list refresh and
//! shutdown handling around a [`PublisherVerifier`].

use crate::config::VerifierConfig;
use crate::error::Result;
use crate::event::{create_event_channel, VerifierEventsChannel, VerifierEventsSender};
use crate::fetch::FetchCoordinator;
use crate::store::{MemoryRecordStore, RecordStore};
use crate::transport::{HttpTransport, Transport};
use crate::updater::PrefixListUpdater;
use crate::verifier::PublisherVerifier;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Builder for a [`RunningService`].
pub struct ServiceBuilder {
    config: VerifierConfig,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn RecordStore>>,
}

impl ServiceBuilder {
    /// Create a builder with the given configuration.
    #[must_use]
    pub fn new(config: VerifierConfig) -> Self {
        Self {
            config,
            transport: None,
            store: None,
        }
    }

    /// Use `transport` instead of an HTTP client.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use `store` instead of an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wire up the verifier and load any cached prefix list.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the cached list
    /// cannot be read.
    pub async fn build(self) -> Result<RunningService> {
        info!("Building publisher verifier with config: {:?}", self.config);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.fetch.request_timeout())?),
        };
        let store = self.store.unwrap_or_else(|| {
            Arc::new(MemoryRecordStore::with_capacity(self.config.store.capacity))
        });

        let coordinator = FetchCoordinator::builder(self.config.fetch.clone(), Arc::clone(&transport))
            .events(events_tx.clone())
            .build();
        let verifier =
            Arc::new(PublisherVerifier::new(coordinator, store).with_events(events_tx.clone()));

        let updater = if self.config.prefix_list.enabled {
            let updater = PrefixListUpdater::new(
                Arc::clone(&verifier),
                transport,
                self.config.prefix_list.clone(),
                &self.config.fetch.endpoint,
            )
            .with_events(events_tx.clone());
            updater.load_cached().await?;
            Some(Arc::new(updater))
        } else {
            None
        };

        Ok(RunningService {
            verifier,
            updater,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// A built verifier service.
pub struct RunningService {
    verifier: Arc<PublisherVerifier>,
    updater: Option<Arc<PrefixListUpdater>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: VerifierEventsSender,
    events_rx: Option<VerifierEventsChannel>,
}

impl RunningService {
    /// The verifier hosts query.
    #[must_use]
    pub fn verifier(&self) -> &Arc<PublisherVerifier> {
        &self.verifier
    }

    /// Get a receiver for verifier events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<VerifierEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to verifier events.
    #[must_use]
    pub fn subscribe_events(&self) -> VerifierEventsChannel {
        self.events_tx.subscribe()
    }

    /// Run background tasks until shutdown or Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if a background task fails fatally.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting publisher verifier");

        self.verifier.coordinator().start_purge_sweep();

        let updater_task = self
            .updater
            .as_ref()
            .map(|updater| Arc::clone(updater).spawn(self.shutdown_rx.clone()));

        info!("Verifier running, waiting for shutdown signal");

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    self.shutdown();
                    break;
                }
            }
        }

        self.verifier.coordinator().stop_purge_sweep();
        if let Some(task) = updater_task {
            if let Err(e) = task.await {
                warn!("Prefix list updater task failed: {e}");
            }
        }

        info!("Verifier shutdown complete");
        Ok(())
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// A handle that can request shutdown from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }
}

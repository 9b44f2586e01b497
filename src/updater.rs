//! Periodic prefix list downloads.
//!
//! A downloaded list replaces the active one only if it parses. The last good
//! list is cached on disk so a restart has a list before the first download.

use crate::config::PrefixListConfig;
use crate::error::{Error, Result};
use crate::event::{VerifierEvent, VerifierEventsSender};
use crate::transport::Transport;
use crate::verifier::PublisherVerifier;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Downloads prefix lists and installs them into a [`PublisherVerifier`].
pub struct PrefixListUpdater {
    verifier: Arc<PublisherVerifier>,
    transport: Arc<dyn Transport>,
    config: PrefixListConfig,
    url: String,
    events: Option<VerifierEventsSender>,
}

impl PrefixListUpdater {
    /// Create an updater downloading from the configured URL, or from
    /// `{endpoint}/publishers/prefix-list` when none is set.
    #[must_use]
    pub fn new(
        verifier: Arc<PublisherVerifier>,
        transport: Arc<dyn Transport>,
        config: PrefixListConfig,
        endpoint: &str,
    ) -> Self {
        let url = config.resolved_url(endpoint);
        Self {
            verifier,
            transport,
            config,
            url,
            events: None,
        }
    }

    /// Publish download failures on `events`.
    #[must_use]
    pub fn with_events(mut self, events: VerifierEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Load the cached list from disk, if present and valid.
    ///
    /// A corrupt cache is logged and ignored. Returns the number of prefixes
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file exists but cannot be read.
    pub async fn load_cached(&self) -> Result<Option<usize>> {
        let path = &self.config.cache_path;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cached prefix list at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match self.verifier.load_prefix_list(&bytes) {
            Ok(count) => {
                info!("Loaded cached prefix list from {}", path.display());
                Ok(Some(count))
            }
            Err(e) => {
                warn!("Ignoring cached prefix list at {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Download, validate and install the list once, then cache it.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails, the server returns a non-2xx
    /// status, or the list is rejected. The active list is unchanged on error.
    pub async fn refresh_once(&self) -> Result<usize> {
        debug!("Downloading prefix list from {}", self.url);

        let response = match self.transport.get(&self.url).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                let message = format!("Prefix list download returned status {}", response.status);
                return Err(self.download_failed(message));
            }
            Err(e) => return Err(self.download_failed(e.to_string())),
        };

        let count = self.verifier.load_prefix_list(&response.body)?;

        if let Err(e) = self.write_cache(&response.body).await {
            warn!(
                "Failed to cache prefix list at {}: {e}",
                self.config.cache_path.display()
            );
        }
        Ok(count)
    }

    /// Run the refresh loop until `shutdown` is set to true or its sender is
    /// dropped. An in-flight download is abandoned on shutdown.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let delay = tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                    delay = self.next_delay() => delay,
                };
                debug!("Next prefix list refresh in {delay:?}");

                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            info!("Prefix list updater stopping");
        })
    }

    async fn next_delay(&self) -> Duration {
        match self.refresh_once().await {
            Ok(count) => {
                info!("Prefix list refreshed ({count} prefixes)");
                self.config.refresh_interval()
            }
            Err(e) => {
                warn!("Prefix list refresh failed: {e}");
                self.config.retry_delay()
            }
        }
    }

    async fn write_cache(&self, bytes: &[u8]) -> Result<()> {
        let path = &self.config.cache_path;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!("Cached prefix list at {}", path.display());
        Ok(())
    }

    fn download_failed(&self, message: String) -> Error {
        warn!("{message}");
        if let Some(events) = &self.events {
            let _ = events.send(VerifierEvent::PrefixListDownloadFailed {
                message: message.clone(),
            });
        }
        Error::Network(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::event::create_event_channel;
    use crate::fetch::FetchCoordinator;
    use crate::prefix_list::{encode_prefix_list, publisher_prefix, CompressionKind, ParseError};
    use crate::store::MemoryRecordStore;
    use crate::transport::UrlResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves queued responses, repeating the last one.
    struct ListServer {
        responses: Mutex<Vec<(u16, Bytes)>>,
        requests: AtomicUsize,
    }

    impl ListServer {
        fn new(responses: Vec<(u16, Bytes)>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Transport for ListServer {
        async fn get(&self, url: &str) -> crate::Result<UrlResponse> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock();
            let (status, body) = if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses.first().cloned().unwrap_or((404, Bytes::new()))
            };
            Ok(UrlResponse {
                url: url.to_string(),
                status,
                body,
                headers: Default::default(),
            })
        }
    }

    fn list_of(keys: &[&str]) -> Bytes {
        let mut prefixes: Vec<Vec<u8>> = keys.iter().map(|k| publisher_prefix(k, 4)).collect();
        prefixes.sort();
        Bytes::from(
            encode_prefix_list(1, 4, &prefixes.concat(), CompressionKind::None).expect("encode"),
        )
    }

    fn verifier(transport: Arc<dyn Transport>) -> Arc<PublisherVerifier> {
        let coordinator = FetchCoordinator::new(FetchConfig::default(), transport);
        Arc::new(PublisherVerifier::new(
            coordinator,
            Arc::new(MemoryRecordStore::new()),
        ))
    }

    fn config(dir: &tempfile::TempDir) -> PrefixListConfig {
        PrefixListConfig {
            cache_path: dir.path().join("lists").join("prefix-list.bin"),
            refresh_interval_hours: 1,
            retry_delay_secs: 60,
            ..PrefixListConfig::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_installs_and_caches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = ListServer::new(vec![(200, list_of(&["a.com", "b.com"]))]);
        let verifier = verifier(server.clone());
        let updater =
            PrefixListUpdater::new(verifier.clone(), server, config(&dir), "https://pub.test");

        assert_eq!(updater.url(), "https://pub.test/publishers/prefix-list");
        assert_eq!(updater.refresh_once().await.expect("refresh"), 2);
        assert!(verifier.prefix_list().expect("list").contains_publisher("a.com"));
        assert!(dir.path().join("lists/prefix-list.bin").exists());

        // A fresh verifier picks the list up from the cache.
        let restarted = verifier_with_cache(&dir).await;
        assert_eq!(restarted, Some(2));
    }

    async fn verifier_with_cache(dir: &tempfile::TempDir) -> Option<usize> {
        let server = ListServer::new(vec![(500, Bytes::new())]);
        let updater =
            PrefixListUpdater::new(verifier(server.clone()), server, config(dir), "https://pub.test");
        updater.load_cached().await.expect("load cached")
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_cache_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(verifier_with_cache(&dir).await, None);

        let path = dir.path().join("lists/prefix-list.bin");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, [0x08]).expect("write");
        assert_eq!(verifier_with_cache(&dir).await, None);
    }

    #[tokio::test]
    async fn test_bad_download_keeps_active_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (events_tx, mut events_rx) = create_event_channel();
        let server = ListServer::new(vec![
            (200, list_of(&["a.com"])),
            (503, Bytes::new()),
            (200, Bytes::from_static(&[0x08])),
        ]);
        let verifier = verifier(server.clone());
        let updater =
            PrefixListUpdater::new(verifier.clone(), server, config(&dir), "https://pub.test")
                .with_events(events_tx);

        updater.refresh_once().await.expect("first refresh");

        let err = updater.refresh_once().await.unwrap_err();
        assert!(matches!(err, Error::Network(msg) if msg.contains("503")));
        assert!(matches!(
            events_rx.try_recv(),
            Ok(VerifierEvent::PrefixListDownloadFailed { .. })
        ));

        let err = updater.refresh_once().await.unwrap_err();
        assert!(matches!(
            err,
            Error::PrefixList(ParseError::InvalidProtobufMessage)
        ));

        assert!(verifier.prefix_list().expect("list").contains_publisher("a.com"));
    }

    struct HangingServer;

    #[async_trait]
    impl Transport for HangingServer {
        async fn get(&self, _url: &str) -> crate::Result<UrlResponse> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_download() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server: Arc<dyn Transport> = Arc::new(HangingServer);
        let updater = Arc::new(PrefixListUpdater::new(
            verifier(server.clone()),
            server,
            config(&dir),
            "https://pub.test",
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = updater.spawn(shutdown_rx);
        tokio::task::yield_now().await;

        shutdown_tx.send(true).expect("send");
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("updater stopped while downloading")
            .expect("join");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_retries_then_stops() {
        let dir = tempfile::tempdir().expect("tempdir");
        let server = ListServer::new(vec![(503, Bytes::new()), (200, list_of(&["a.com"]))]);
        let verifier = verifier(server.clone());
        let updater = Arc::new(PrefixListUpdater::new(
            verifier.clone(),
            server.clone(),
            config(&dir),
            "https://pub.test",
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = updater.spawn(shutdown_rx);

        // First attempt fails, the retry after 60s succeeds.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(server.requests.load(Ordering::SeqCst), 2);
        assert!(verifier.prefix_list().is_some());

        shutdown_tx.send(true).expect("send");
        handle.await.expect("join");
    }
}

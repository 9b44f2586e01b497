//! Publisher verifier combining the prefix list, record store and
//! coordinated server lookups.
//!
//! ```text
//! lookup(key)
//!      │
//!      ▼
//! ┌──────────────────────┐
//! │ Prefix list loaded?  │──no──────────────┐
//! └─────────┬────────────┘                  │
//!          yes                              │
//!    ┌──────┴──────┐                        │
//!  ABSENT    POSSIBLY PRESENT               │
//!    │             └──────────┬─────────────┘
//!    ▼                        ▼
//! NotVerified         Store hit and fresh? ──yes──▶ stored record
//! (no network)                │ no
//!                             ▼
//!                   FetchCoordinator (single-flight)
//!                             │
//!                ┌────────────┴────────────┐
//!             success                    failure
//!                │                         │
//!                ▼                         ▼
//!         save + return          stale record, else error
//! ```

use crate::error::{Error, Result};
use crate::event::{VerifierEvent, VerifierEventsSender};
use crate::fetch::{FetchCoordinator, ServerPublisherRecord};
use crate::prefix_list::{ParseError, PrefixListReader};
use crate::store::RecordStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of testing a publisher against the local prefix list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMembership {
    /// No prefix list is loaded.
    NoList,
    /// The publisher's prefix is not in the list: definitely not registered.
    Absent,
    /// The publisher's prefix is in the list: possibly registered.
    PossiblyPresent,
}

/// Where a lookup result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    /// Synthesized because the prefix list rules the publisher out.
    PrefixList,
    /// Fresh record from the record store.
    Store,
    /// Fetched from the server.
    Server,
    /// Expired stored record returned because the server fetch failed.
    StaleStore,
}

/// A resolved publisher record and its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PublisherLookup {
    /// The record.
    pub record: ServerPublisherRecord,
    /// Where it came from.
    pub source: LookupSource,
}

/// Resolves publishers to verification records.
pub struct PublisherVerifier {
    coordinator: FetchCoordinator,
    store: Arc<dyn RecordStore>,
    prefix_list: RwLock<Option<Arc<PrefixListReader>>>,
    events: Option<VerifierEventsSender>,
}

impl PublisherVerifier {
    /// Create a verifier with no prefix list loaded.
    #[must_use]
    pub fn new(coordinator: FetchCoordinator, store: Arc<dyn RecordStore>) -> Self {
        Self {
            coordinator,
            store,
            prefix_list: RwLock::new(None),
            events: None,
        }
    }

    /// Publish prefix list events on `events`.
    #[must_use]
    pub fn with_events(mut self, events: VerifierEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    /// The fetch coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    /// The record store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Parse `bytes` and make it the active prefix list.
    ///
    /// Parsing happens outside the lock; readers see either the old list or
    /// the new one, never a partial parse. Returns the number of prefixes.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`] if the blob is rejected. The previous list
    /// stays active.
    pub fn load_prefix_list(&self, bytes: &[u8]) -> std::result::Result<usize, ParseError> {
        match PrefixListReader::from_bytes(bytes) {
            Ok(reader) => Ok(self.install_prefix_list(reader)),
            Err(reason) => {
                warn!("Prefix list rejected, keeping previous list: {reason}");
                self.emit(VerifierEvent::PrefixListRejected { reason });
                Err(reason)
            }
        }
    }

    /// Make an already parsed reader the active prefix list.
    pub fn install_prefix_list(&self, reader: PrefixListReader) -> usize {
        let version = reader.header().version;
        let prefixes = reader.len();
        *self.prefix_list.write() = Some(Arc::new(reader));

        info!("Prefix list version {version} active with {prefixes} prefixes");
        self.emit(VerifierEvent::PrefixListLoaded { version, prefixes });
        prefixes
    }

    /// Snapshot of the active prefix list.
    #[must_use]
    pub fn prefix_list(&self) -> Option<Arc<PrefixListReader>> {
        self.prefix_list.read().clone()
    }

    /// Test `publisher_key` against the active prefix list.
    #[must_use]
    pub fn check_prefix_list(&self, publisher_key: &str) -> ListMembership {
        match self.prefix_list() {
            None => ListMembership::NoList,
            Some(list) if list.contains_publisher(publisher_key) => {
                ListMembership::PossiblyPresent
            }
            Some(_) => ListMembership::Absent,
        }
    }

    /// Resolve `publisher_key` to a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fetch fails and no stored record exists.
    pub async fn lookup(&self, publisher_key: &str) -> Result<PublisherLookup> {
        if self.check_prefix_list(publisher_key) == ListMembership::Absent {
            debug!("{publisher_key} not in prefix list, not verified");
            return Ok(PublisherLookup {
                record: ServerPublisherRecord::not_verified(publisher_key, self.coordinator.now()),
                source: LookupSource::PrefixList,
            });
        }

        let stored = match self.store.get(publisher_key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Record store lookup for {publisher_key} failed: {e}");
                None
            }
        };

        if let Some(record) = &stored {
            if !self.coordinator.is_expired_record(record) {
                debug!("{publisher_key} served from record store");
                return Ok(PublisherLookup {
                    record: record.clone(),
                    source: LookupSource::Store,
                });
            }
            debug!("Stored record for {publisher_key} expired, refetching");
        }

        match self.coordinator.fetch(publisher_key).await {
            Ok(record) => {
                if let Err(e) = self.store.save(record.clone()).await {
                    warn!("Failed to save record for {publisher_key}: {e}");
                }
                Ok(PublisherLookup {
                    record,
                    source: LookupSource::Server,
                })
            }
            Err(e) => match stored {
                Some(record) => {
                    warn!("Fetch for {publisher_key} failed ({e}), using stale record");
                    Ok(PublisherLookup {
                        record,
                        source: LookupSource::StaleStore,
                    })
                }
                None => Err(Error::Fetch(e)),
            },
        }
    }

    /// Resolve `publisher_key` to a record, discarding its source.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fetch fails and no stored record exists.
    pub async fn get_server_publisher_info(
        &self,
        publisher_key: &str,
    ) -> Result<ServerPublisherRecord> {
        self.lookup(publisher_key).await.map(|lookup| lookup.record)
    }

    fn emit(&self, event: VerifierEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

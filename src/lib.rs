//! # publisher-verifier
//!
//! Publisher verification for a creator-rewards client.
//!
//! Two components answer "is this publisher registered?":
//!
//! - [`PrefixListReader`] holds a bulk, sorted list of hashed publisher
//!   prefixes for cheap local membership checks. A miss is definitive.
//! - [`FetchCoordinator`] resolves one publisher against the server,
//!   coalescing concurrent lookups for the same key into a single request.
//!
//! [`PublisherVerifier`] composes them with a [`RecordStore`], and
//! [`PrefixListUpdater`] keeps the list fresh in the background.
//!
//! ## Example
//!
//! ```no_run
//! use publisher_verifier::{FetchCoordinator, MemoryRecordStore, PublisherVerifier};
//! use publisher_verifier::config::FetchConfig;
//! use publisher_verifier::transport::HttpTransport;
//! use std::sync::Arc;
//!
//! # async fn example() -> publisher_verifier::Result<()> {
//! let config = FetchConfig::default();
//! let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
//! let coordinator = FetchCoordinator::new(config, transport);
//! let verifier = PublisherVerifier::new(coordinator, Arc::new(MemoryRecordStore::new()));
//!
//! let record = verifier.get_server_publisher_info("example.com").await?;
//! println!("{}: {:?}", record.publisher_key, record.status);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod event;
pub mod fetch;
pub mod prefix_list;
pub mod service;
pub mod store;
pub mod transport;
pub mod updater;
pub mod verifier;

pub use config::VerifierConfig;
pub use error::{Error, Result};
pub use event::{create_event_channel, VerifierEvent, VerifierEventsChannel};
pub use fetch::{
    FetchCoordinator, FetchError, FetchOutcome, PublisherStatus, ServerPublisherRecord,
};
pub use prefix_list::{ParseError, PrefixListReader};
pub use service::{RunningService, ServiceBuilder};
pub use store::{MemoryRecordStore, RecordStore};
pub use updater::PrefixListUpdater;
pub use verifier::{ListMembership, LookupSource, PublisherLookup, PublisherVerifier};

//! Verifier event system.

use crate::prefix_list::ParseError;
use tokio::sync::broadcast;

/// Events emitted by the verifier components.
#[derive(Debug, Clone)]
pub enum VerifierEvent {
    /// A new prefix list was loaded.
    PrefixListLoaded {
        /// List version.
        version: u32,
        /// Number of prefixes.
        prefixes: usize,
    },

    /// A downloaded prefix list was rejected; the previous list stays active.
    PrefixListRejected {
        /// Why the list was rejected.
        reason: ParseError,
    },

    /// Downloading the prefix list failed.
    PrefixListDownloadFailed {
        /// Error message.
        message: String,
    },

    /// A coordinated publisher fetch finished.
    FetchCompleted {
        /// Publisher key.
        publisher_key: String,
        /// Whether a record was produced.
        success: bool,
        /// Number of waiters that received the result.
        waiters: usize,
    },

    /// Pending fetches were abandoned by the purge sweep.
    FetchesPurged {
        /// Keys whose waiters were failed.
        publisher_keys: Vec<String>,
    },
}

/// Channel for receiving verifier events.
pub type VerifierEventsChannel = broadcast::Receiver<VerifierEvent>;

/// Sender for verifier events.
pub type VerifierEventsSender = broadcast::Sender<VerifierEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (VerifierEventsSender, VerifierEventsChannel) {
    broadcast::channel(256)
}

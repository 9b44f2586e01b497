//! Targeted publisher verification.
//!
//! [`FetchCoordinator`] resolves a single publisher key to a
//! [`ServerPublisherRecord`], issuing at most one request per key at a time
//! and fanning the result out to every caller that asked while it was in
//! flight.

mod clock;
mod coordinator;
mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{FetchCoordinator, FetchCoordinatorBuilder, FetchOutcome};
pub use record::{PublisherBanner, PublisherStatus, ServerPublisherRecord};

use std::time::Duration;
use thiserror::Error;

/// Failure delivered to fetch waiters.
///
/// Cloned once per waiter, so variants carry owned descriptions rather than
/// source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("server returned status {0}")]
    Status(u16),

    /// The request could not be made or completed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The request did not finish within the configured timeout.
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),

    /// A successful response body could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The fetch was pending too long and was purged.
    #[error("fetch abandoned after {0:?}")]
    Abandoned(Duration),

    /// The coordinator went away before delivering a result.
    #[error("fetch cancelled")]
    Cancelled,
}

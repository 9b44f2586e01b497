//! Server publisher records and response parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Verification status of a publisher as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherStatus {
    /// Not registered with the rewards network.
    #[default]
    NotVerified,
    /// Registered, but not yet able to receive contributions.
    Connected,
    /// Registered and verified.
    Verified,
}

/// Display metadata a publisher configured for its tip banner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherBanner {
    /// Banner title.
    pub title: String,
    /// Banner description.
    pub description: String,
    /// Background image URL.
    pub background: String,
    /// Logo image URL.
    pub logo: String,
    /// Suggested tip amounts.
    pub amounts: Vec<f64>,
    /// Social links keyed by provider.
    pub links: BTreeMap<String, String>,
}

/// Verification record for a single publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPublisherRecord {
    /// Publisher key the record belongs to.
    pub publisher_key: String,
    /// Verification status.
    pub status: PublisherStatus,
    /// Payout address, empty when unknown.
    #[serde(default)]
    pub address: String,
    /// Optional banner metadata.
    #[serde(default)]
    pub banner: Option<PublisherBanner>,
    /// When this record was produced.
    pub updated_at: DateTime<Utc>,
}

impl ServerPublisherRecord {
    /// Record for a publisher the server does not know about.
    #[must_use]
    pub fn not_verified(publisher_key: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            publisher_key: publisher_key.into(),
            status: PublisherStatus::NotVerified,
            address: String::new(),
            banner: None,
            updated_at,
        }
    }

    /// Returns true if the publisher is fully verified.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == PublisherStatus::Verified
    }

    /// Returns true if the publisher is known to the network in any state.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.status != PublisherStatus::NotVerified
    }
}

/// Body of a successful publisher lookup.
#[derive(Debug, Deserialize)]
pub(crate) struct ServerPublisherResponse {
    status: PublisherStatus,
    #[serde(default)]
    address: String,
    #[serde(default)]
    banner: Option<PublisherBanner>,
}

impl ServerPublisherResponse {
    pub(crate) fn into_record(
        self,
        publisher_key: &str,
        updated_at: DateTime<Utc>,
    ) -> ServerPublisherRecord {
        ServerPublisherRecord {
            publisher_key: publisher_key.to_string(),
            status: self.status,
            address: self.address,
            banner: self.banner,
            updated_at,
        }
    }
}

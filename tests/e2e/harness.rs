//! Test harness wrapping a mock publisher service.
//!
//! The `TestHarness` owns a mockito server, a temporary cache directory and a
//! configuration pointing at both.

use mockito::{Mock, ServerGuard};
use publisher_verifier::config::{FetchConfig, PrefixListConfig, StoreConfig, VerifierConfig};
use publisher_verifier::prefix_list::{encode_prefix_list, publisher_prefix, CompressionKind};
use std::path::PathBuf;
use tempfile::TempDir;

/// Path the prefix list is served from.
pub const LIST_PATH: &str = "/publishers/prefix-list";

/// Test harness that manages the mock service and scratch directory.
pub struct TestHarness {
    server: ServerGuard,
    dir: TempDir,
}

impl TestHarness {
    /// Start a mock publisher service.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[allow(clippy::expect_used)]
    pub async fn setup() -> Self {
        let server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().expect("tempdir");
        Self { server, dir }
    }

    /// Base URL of the mock service.
    pub fn endpoint(&self) -> String {
        self.server.url()
    }

    /// Where the prefix list cache lives for this harness.
    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("cache").join("prefix-list.bin")
    }

    /// Configuration pointing at the mock service and scratch directory.
    pub fn config(&self) -> VerifierConfig {
        VerifierConfig {
            fetch: FetchConfig {
                endpoint: self.endpoint(),
                request_timeout_secs: 5,
                ..FetchConfig::default()
            },
            prefix_list: PrefixListConfig {
                cache_path: self.cache_path(),
                retry_delay_secs: 1,
                ..PrefixListConfig::default()
            },
            store: StoreConfig { capacity: 100 },
            log_level: "debug".to_string(),
        }
    }

    /// Serve a publisher response body with the given status, expecting
    /// exactly `hits` requests.
    pub async fn serve_publisher(&mut self, key: &str, status: usize, body: &str, hits: usize) -> Mock {
        self.server
            .mock("GET", format!("/publishers/{key}").as_str())
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    /// Serve a prefix list built from `keys`.
    pub async fn serve_list(&mut self, keys: &[&str], compression: CompressionKind) -> Mock {
        let body = prefix_list(keys, compression);
        self.server
            .mock("GET", LIST_PATH)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    /// Serve arbitrary bytes as the prefix list.
    pub async fn serve_raw_list(&mut self, status: usize, body: Vec<u8>) -> Mock {
        self.server
            .mock("GET", LIST_PATH)
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }
}

/// Build an encoded 4-byte prefix list containing `keys`.
///
/// # Panics
///
/// Panics if encoding fails.
#[allow(clippy::expect_used)]
pub fn prefix_list(keys: &[&str], compression: CompressionKind) -> Vec<u8> {
    let mut prefixes: Vec<Vec<u8>> = keys.iter().map(|k| publisher_prefix(k, 4)).collect();
    prefixes.sort();
    encode_prefix_list(1, 4, &prefixes.concat(), compression).expect("encode")
}

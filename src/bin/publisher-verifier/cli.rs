//! Command-line interface definition.

use clap::{Parser, Subcommand};
use publisher_verifier::config::VerifierConfig;
use std::path::PathBuf;

/// Publisher verification: prefix list inspection and server lookups.
#[derive(Parser, Debug)]
#[command(name = "publisher-verifier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the publisher service.
    #[arg(long, env = "PUBLISHER_VERIFIER_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Record time-to-live in seconds.
    #[arg(long, env = "PUBLISHER_VERIFIER_TTL_SECS")]
    pub ttl_secs: Option<u64>,

    /// Prefix list download URL.
    #[arg(long, env = "PUBLISHER_VERIFIER_LIST_URL")]
    pub list_url: Option<String>,

    /// Where the downloaded prefix list is cached.
    #[arg(long, env = "PUBLISHER_VERIFIER_CACHE_PATH")]
    pub cache_path: Option<PathBuf>,

    /// Disable periodic prefix list downloads.
    #[arg(long)]
    pub no_prefix_list: bool,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a prefix list file and print its header.
    Inspect {
        /// Prefix list file.
        file: PathBuf,

        /// Also print every prefix.
        #[arg(long)]
        all: bool,
    },

    /// Resolve a publisher and print its record as JSON.
    Lookup {
        /// Publisher key, e.g. a domain.
        publisher: String,

        /// Prefix list file to check against before asking the server.
        #[arg(long)]
        list: Option<PathBuf>,
    },

    /// Run the verifier service until Ctrl-C.
    Run,
}

impl Cli {
    /// Convert CLI arguments into a `VerifierConfig`, returning the command
    /// alongside it.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<(VerifierConfig, Command)> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            VerifierConfig::from_file(path)?
        } else {
            VerifierConfig::default()
        };

        // Override with CLI arguments
        if let Some(endpoint) = self.endpoint {
            config.fetch.endpoint = endpoint;
        }
        if let Some(ttl_secs) = self.ttl_secs {
            config.fetch.ttl_secs = ttl_secs;
        }
        if let Some(url) = self.list_url {
            config.prefix_list.url = Some(url);
        }
        if let Some(cache_path) = self.cache_path {
            config.prefix_list.cache_path = cache_path;
        }
        if self.no_prefix_list {
            config.prefix_list.enabled = false;
        }
        config.log_level = self.log_level;

        Ok((config, self.command))
    }
}

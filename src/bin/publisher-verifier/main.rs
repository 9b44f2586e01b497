//! publisher-verifier CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::eyre;
use publisher_verifier::config::VerifierConfig;
use publisher_verifier::transport::HttpTransport;
use publisher_verifier::{
    FetchCoordinator, MemoryRecordStore, PrefixListReader, PublisherVerifier, ServiceBuilder,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("publisher-verifier v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration
    let (config, command) = cli.into_config()?;

    match command {
        Command::Inspect { file, all } => inspect(&file, all),
        Command::Lookup { publisher, list } => lookup(config, &publisher, list.as_deref()).await,
        Command::Run => {
            let mut service = ServiceBuilder::new(config).build().await?;
            service.run().await?;
            info!("Goodbye!");
            Ok(())
        }
    }
}

fn inspect(file: &Path, all: bool) -> color_eyre::Result<()> {
    let bytes = std::fs::read(file)?;
    let reader = PrefixListReader::from_bytes(&bytes)
        .map_err(|e| eyre!("{} is not a valid prefix list: {e}", file.display()))?;

    let header = reader.header();
    println!("version:           {}", header.version);
    println!("prefix size:       {}", header.prefix_size);
    println!("compression:       {:?}", header.compression);
    println!("uncompressed size: {}", header.uncompressed_size);
    println!("prefixes:          {}", reader.len());

    if all {
        for prefix in &reader {
            println!("{}", hex::encode(prefix));
        }
    }
    Ok(())
}

async fn lookup(
    config: VerifierConfig,
    publisher: &str,
    list: Option<&Path>,
) -> color_eyre::Result<()> {
    let transport = Arc::new(HttpTransport::new(config.fetch.request_timeout())?);
    let coordinator = FetchCoordinator::new(config.fetch, transport);
    let store = Arc::new(MemoryRecordStore::with_capacity(config.store.capacity));
    let verifier = PublisherVerifier::new(coordinator, store);

    if let Some(path) = list {
        let bytes = std::fs::read(path)?;
        verifier
            .load_prefix_list(&bytes)
            .map_err(|e| eyre!("{} is not a valid prefix list: {e}", path.display()))?;
    }

    let lookup = verifier.lookup(publisher).await?;
    info!("Resolved {publisher} via {:?}", lookup.source);
    println!("{}", serde_json::to_string_pretty(&lookup.record)?);
    Ok(())
}

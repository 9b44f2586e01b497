//! End-to-end verification flows against the mock publisher service.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use super::harness::prefix_list;
use super::TestHarness;
use publisher_verifier::fetch::FetchError;
use publisher_verifier::prefix_list::{encode_prefix_list, CompressionKind};
use publisher_verifier::transport::HttpTransport;
use publisher_verifier::{
    Error, FetchCoordinator, ListMembership, LookupSource, MemoryRecordStore, PrefixListUpdater,
    PublisherStatus, PublisherVerifier, RecordStore, ServerPublisherRecord, ServiceBuilder,
    VerifierEvent,
};
use std::sync::Arc;
use std::time::Duration;

fn verifier_for(harness: &TestHarness) -> (Arc<PublisherVerifier>, Arc<HttpTransport>) {
    let config = harness.config();
    let transport =
        Arc::new(HttpTransport::new(config.fetch.request_timeout()).expect("http client"));
    let coordinator = FetchCoordinator::new(config.fetch, transport.clone());
    let verifier = Arc::new(PublisherVerifier::new(
        coordinator,
        Arc::new(MemoryRecordStore::new()),
    ));
    (verifier, transport)
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_request() {
    let mut harness = TestHarness::setup().await;
    let mock = harness
        .serve_publisher("example.com", 200, r#"{"status":"verified"}"#, 1)
        .await;
    let (verifier, _) = verifier_for(&harness);

    let first = verifier.coordinator().fetch("example.com");
    let second = verifier.coordinator().fetch("example.com");
    assert_eq!(verifier.coordinator().waiter_count("example.com"), 2);

    let (first, second) = tokio::join!(first, second);
    let first = first.expect("first");
    let second = second.expect("second");

    assert_eq!(first.status, PublisherStatus::Verified);
    assert_eq!(first, second);
    assert_eq!(verifier.coordinator().pending_count(), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_empty_body_is_not_verified() {
    let mut harness = TestHarness::setup().await;
    let mock = harness.serve_publisher("unknown.com", 200, "", 1).await;
    let (verifier, _) = verifier_for(&harness);

    let lookup = verifier.lookup("unknown.com").await.expect("lookup");

    assert_eq!(lookup.source, LookupSource::Server);
    assert_eq!(lookup.record.status, PublisherStatus::NotVerified);
    assert!(!lookup.record.is_registered());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_error_surfaces_status() {
    let mut harness = TestHarness::setup().await;
    let mock = harness.serve_publisher("broken.com", 404, "", 1).await;
    let (verifier, _) = verifier_for(&harness);

    let err = verifier.lookup("broken.com").await.unwrap_err();

    assert!(matches!(err, Error::Fetch(FetchError::Status(404))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stale_record_served_when_server_fails() {
    let mut harness = TestHarness::setup().await;
    let mock = harness.serve_publisher("stale.com", 500, "", 1).await;

    let mut config = harness.config();
    config.fetch.ttl_secs = 0;
    let transport = Arc::new(HttpTransport::new(Duration::from_secs(5)).expect("http client"));
    let store = Arc::new(MemoryRecordStore::new());
    let mut old = ServerPublisherRecord::not_verified("stale.com", chrono::Utc::now());
    old.status = PublisherStatus::Connected;
    store.save(old.clone()).await.expect("save");

    let verifier =
        PublisherVerifier::new(FetchCoordinator::new(config.fetch, transport), store);
    let lookup = verifier.lookup("stale.com").await.expect("lookup");

    assert_eq!(lookup.source, LookupSource::StaleStore);
    assert_eq!(lookup.record, old);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_prefix_list_gates_server_lookups() {
    let mut harness = TestHarness::setup().await;
    let _list = harness
        .serve_list(&["listed.com"], CompressionKind::Zlib)
        .await;
    let listed = harness
        .serve_publisher("listed.com", 200, r#"{"status":"connected","address":"0xabc"}"#, 1)
        .await;
    let unlisted = harness
        .serve_publisher("unlisted.com", 200, r#"{"status":"verified"}"#, 0)
        .await;

    let (verifier, transport) = verifier_for(&harness);
    let config = harness.config();
    let updater = PrefixListUpdater::new(
        verifier.clone(),
        transport,
        config.prefix_list,
        &config.fetch.endpoint,
    );

    assert_eq!(updater.refresh_once().await.expect("refresh"), 1);
    assert!(harness.cache_path().exists());
    assert_eq!(
        verifier.check_prefix_list("listed.com"),
        ListMembership::PossiblyPresent
    );

    // Absent from the list: answered locally.
    let lookup = verifier.lookup("unlisted.com").await.expect("lookup");
    assert_eq!(lookup.source, LookupSource::PrefixList);
    assert_eq!(lookup.record.status, PublisherStatus::NotVerified);

    // Present: fetched once, then served from the store.
    let lookup = verifier.lookup("listed.com").await.expect("lookup");
    assert_eq!(lookup.source, LookupSource::Server);
    assert_eq!(lookup.record.address, "0xabc");

    let lookup = verifier.lookup("listed.com").await.expect("lookup");
    assert_eq!(lookup.source, LookupSource::Store);

    listed.assert_async().await;
    unlisted.assert_async().await;
}

#[tokio::test]
async fn test_rejected_download_keeps_previous_list() {
    let mut harness = TestHarness::setup().await;
    let unsorted = encode_prefix_list(2, 4, &[0, 0, 0, 9, 0, 0, 0, 1], CompressionKind::None)
        .expect("encode");
    let _list = harness.serve_raw_list(200, unsorted).await;

    let (verifier, transport) = verifier_for(&harness);
    verifier
        .load_prefix_list(&prefix_list(&["kept.com"], CompressionKind::None))
        .expect("initial list");

    let config = harness.config();
    let updater = PrefixListUpdater::new(
        verifier.clone(),
        transport,
        config.prefix_list,
        &config.fetch.endpoint,
    );

    let err = updater.refresh_once().await.unwrap_err();
    assert!(matches!(err, Error::PrefixList(_)));

    let list = verifier.prefix_list().expect("list");
    assert_eq!(list.header().version, 1);
    assert!(list.contains_publisher("kept.com"));
    assert!(!harness.cache_path().exists());
}

#[tokio::test]
async fn test_service_loads_cache_and_refreshes() {
    let mut harness = TestHarness::setup().await;

    let cache = harness.cache_path();
    std::fs::create_dir_all(cache.parent().expect("parent")).expect("mkdir");
    std::fs::write(&cache, prefix_list(&["cached.com"], CompressionKind::None)).expect("write");

    let _list = harness
        .serve_list(&["cached.com", "fresh.com"], CompressionKind::Zlib)
        .await;

    let mut service = ServiceBuilder::new(harness.config())
        .build()
        .await
        .expect("build");
    let verifier = Arc::clone(service.verifier());
    assert_eq!(verifier.prefix_list().expect("cached list").len(), 1);

    let mut events = service.events().expect("events");
    assert!(service.events().is_none());

    let shutdown = service.shutdown_handle();
    let task = tokio::spawn(async move { service.run().await });

    // The first PrefixListLoaded came from the cache during build.
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(VerifierEvent::PrefixListLoaded { prefixes: 2, .. }) => break,
                Ok(_) => {}
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .expect("list refreshed");
    assert!(verifier.prefix_list().expect("list").contains_publisher("fresh.com"));

    shutdown.send(true).expect("shutdown");
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("service stopped")
        .expect("join")
        .expect("run");
}

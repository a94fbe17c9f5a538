#![cfg(feature = "test-utils")]

use bqmeta::cache::{CacheSubKey, MetadataCacheRegistry};
use bqmeta::connection::Driver;
use bqmeta::error::ErrorKind;
use bqmeta::test_utils::client::MockMetadataClient;
use bqmeta::types::TableType;
use bqmeta_config::shared::MetadataCacheConfig;
use bqmeta_telemetry::tracing::init_test_tracing;
use std::sync::Arc;
use std::thread;

const PROJECT: &str = "project-x";

fn client() -> MockMetadataClient {
    let client = MockMetadataClient::new([PROJECT, "shared-data"]);
    client
        .add_dataset(PROJECT, "ds1")
        .add_dataset("shared-data", "public")
        .add_table(PROJECT, "ds1", "orders", TableType::Table)
        .add_table("shared-data", "public", "holidays", TableType::View);
    client
}

#[test]
fn concurrent_store_lookups_converge_on_one_store() {
    init_test_tracing();

    let registry = Arc::new(MetadataCacheRegistry::new());
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.store_for(PROJECT, 300))
        })
        .collect();

    let stores: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert!(stores.iter().all(|store| Arc::ptr_eq(store, &stores[0])));
    assert_eq!(registry.count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconnecting_hits_warm_cache() {
    init_test_tracing();

    let client = client();
    let registry = Arc::new(MetadataCacheRegistry::new());
    let driver = Driver::new(
        PROJECT,
        client.clone(),
        MetadataCacheConfig::default(),
        registry.clone(),
    )
    .unwrap();

    let first = driver.connect();
    let tables = first
        .metadata()
        .unwrap()
        .list_tables(None, None, None, None)
        .await
        .unwrap();
    first.close();

    let calls = client.total_calls();
    let second = driver.connect();
    let cached = second
        .metadata()
        .unwrap()
        .list_tables(None, None, None, None)
        .await
        .unwrap();

    assert_eq!(cached, tables);
    assert_eq!(client.total_calls(), calls);
    assert_eq!(registry.count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn tables_span_every_catalog() {
    init_test_tracing();

    let driver = Driver::new(
        PROJECT,
        client(),
        MetadataCacheConfig::default(),
        Arc::new(MetadataCacheRegistry::new()),
    )
    .unwrap();
    let connection = driver.connect();
    let metadata = connection.metadata().unwrap();

    let tables = metadata.list_tables(None, None, None, None).await.unwrap();
    let names: Vec<_> = tables
        .iter()
        .map(|table| format!("{}.{}.{}", table.catalog, table.schema, table.name))
        .collect();
    assert_eq!(
        names,
        ["project-x.ds1.orders", "shared-data.public.holidays"]
    );

    let only_shared = metadata
        .list_tables(Some("shared%"), None, None, None)
        .await
        .unwrap();
    assert_eq!(only_shared.len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_catalog_does_not_hide_others() {
    init_test_tracing();

    let client = client();
    client.fail_on(CacheSubKey::Schemas {
        catalog: "shared-data".to_string(),
    });
    let driver = Driver::new(
        PROJECT,
        client,
        MetadataCacheConfig::default(),
        Arc::new(MetadataCacheRegistry::new()),
    )
    .unwrap();
    let connection = driver.connect();

    let schemas = connection
        .metadata()
        .unwrap()
        .list_schemas(None, None)
        .await
        .unwrap();

    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].catalog, PROJECT);
}

#[tokio::test(flavor = "multi_thread")]
async fn closed_connection_fails_without_touching_cache() {
    init_test_tracing();

    let client = client();
    let driver = Driver::new(
        PROJECT,
        client.clone(),
        MetadataCacheConfig::default(),
        Arc::new(MetadataCacheRegistry::new()),
    )
    .unwrap();
    let connection = driver.connect();
    connection
        .metadata()
        .unwrap()
        .list_schemas(None, None)
        .await
        .unwrap();
    connection.close();

    let err = connection.metadata().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionClosed);

    let store = driver.registry().store_for(PROJECT, 300);
    assert!(!store.is_empty());
}

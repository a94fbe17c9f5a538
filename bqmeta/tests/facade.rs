#![cfg(feature = "test-utils")]

use bqmeta::cache::{CacheSubKey, MetadataCacheRegistry};
use bqmeta::error::ErrorKind;
use bqmeta::facade::MetadataFacade;
use bqmeta::test_utils::client::MockMetadataClient;
use bqmeta::test_utils::clock::ManualClock;
use bqmeta::types::TableType;
use bqmeta_config::shared::MetadataCacheConfig;
use bqmeta_telemetry::tracing::init_test_tracing;
use std::sync::Arc;
use std::time::Duration;

const PROJECT: &str = "project-a";

fn schemas_key() -> CacheSubKey {
    CacheSubKey::Schemas {
        catalog: PROJECT.to_string(),
    }
}

fn tables_key(dataset: &str) -> CacheSubKey {
    CacheSubKey::Tables {
        catalog: PROJECT.to_string(),
        schema: dataset.to_string(),
    }
}

/// A project with datasets `ds1..=ds{count}`, each holding one table named `t{n}`.
fn project_with_datasets(count: usize) -> MockMetadataClient {
    let client = MockMetadataClient::new([PROJECT]);
    for n in 1..=count {
        let dataset = format!("ds{n}");
        client
            .add_dataset(PROJECT, &dataset)
            .add_table(PROJECT, &dataset, &format!("t{n}"), TableType::Table)
            .add_column(PROJECT, &dataset, &format!("t{n}"), "id", "INT64");
    }

    client
}

fn facade_with(
    client: &MockMetadataClient,
    config: &MetadataCacheConfig,
    registry: &MetadataCacheRegistry,
) -> MetadataFacade<MockMetadataClient> {
    MetadataFacade::new(Arc::new(client.clone()), PROJECT, config, registry)
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_schema_listing_is_fetched_again() {
    init_test_tracing();

    let clock = Arc::new(ManualClock::new());
    let registry = MetadataCacheRegistry::with_clock(clock.clone());
    let client = project_with_datasets(2);
    let facade = facade_with(&client, &MetadataCacheConfig::default(), &registry);

    let schemas = facade.list_schemas(None, None).await.unwrap();
    assert_eq!(schemas.len(), 2);
    facade.list_schemas(None, None).await.unwrap();
    assert_eq!(client.calls_for(&schemas_key()), 1);

    clock.advance(Duration::from_secs(301));

    let store = facade.store().unwrap();
    assert!(store.get(&schemas_key()).is_none());

    let refreshed = facade.list_schemas(None, None).await.unwrap();
    assert_eq!(refreshed, schemas);
    assert_eq!(client.calls_for(&schemas_key()), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_failures_are_omitted_from_parallel_listing() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(8);
    client.fail_on(tables_key("ds3"));
    client.fail_on(tables_key("ds6"));
    client.set_latency(Duration::from_millis(20));
    let facade = facade_with(&client, &MetadataCacheConfig::default(), &registry);

    let tables = facade.list_tables(None, None, None, None).await.unwrap();

    let names: Vec<_> = tables.iter().map(|table| table.name.as_str()).collect();
    assert_eq!(names, ["t1", "t2", "t4", "t5", "t7", "t8"]);
    assert!(client.max_in_flight() > 1);

    // Only the failed datasets are retried.
    client.reset_calls();
    client.recover(&tables_key("ds3"));
    let tables = facade.list_tables(None, None, None, None).await.unwrap();

    assert_eq!(tables.len(), 7);
    assert_eq!(client.table_listing_calls(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn listing_below_threshold_runs_sequentially() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(4);
    client.set_latency(Duration::from_millis(5));
    let facade = facade_with(&client, &MetadataCacheConfig::default(), &registry);

    let tables = facade.list_tables(None, None, None, None).await.unwrap();

    assert_eq!(tables.len(), 4);
    assert_eq!(client.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_listings_time_out() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(6);
    let config = MetadataCacheConfig {
        parallel_timeout_ms: 500,
        ..Default::default()
    };
    let facade = facade_with(&client, &config, &registry);
    facade.list_schemas(None, None).await.unwrap();

    client.set_latency(Duration::from_secs(10));
    let err = facade.list_tables(None, None, None, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AllSubRequestsFailed);
    assert_eq!(err.errors().len(), 6);
    assert!(err.kinds().iter().all(|kind| *kind == ErrorKind::Timeout));
    assert!(facade.store().unwrap().get(&tables_key("ds1")).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_listing_is_omitted() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(5);
    client.panic_on(tables_key("ds2"));
    let facade = facade_with(&client, &MetadataCacheConfig::default(), &registry);

    let tables = facade.list_tables(None, None, None, None).await.unwrap();

    assert_eq!(tables.len(), 4);
    assert!(tables.iter().all(|table| table.schema != "ds2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn lazy_mode_fetches_only_requested_dataset() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(3);
    let config = MetadataCacheConfig {
        lazy_load: true,
        ..Default::default()
    };
    let facade = facade_with(&client, &config, &registry);

    let schemas = facade.list_schemas(None, None).await.unwrap();
    assert!(schemas.is_empty());

    let tables = facade
        .list_tables(None, Some("ds1"), None, None)
        .await
        .unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "t1");

    let columns = facade
        .list_columns(None, Some("ds1"), Some("t1"), None)
        .await
        .unwrap();
    assert_eq!(columns.len(), 1);

    assert_eq!(client.calls_for(&schemas_key()), 0);
    assert_eq!(client.calls_for(&tables_key("ds1")), 1);
    assert_eq!(client.calls_for(&tables_key("ds2")), 0);
    assert_eq!(client.calls_for(&tables_key("ds3")), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn lazy_dataset_missing_from_one_catalog_does_not_fail_request() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = MockMetadataClient::new([PROJECT, "project-b"]);
    client
        .add_dataset(PROJECT, "events_2024")
        .add_table(PROJECT, "events_2024", "clicks", TableType::Table);
    let config = MetadataCacheConfig {
        lazy_load: true,
        ..Default::default()
    };
    let facade = facade_with(&client, &config, &registry);

    let tables = facade
        .list_tables(None, Some("events_2024"), None, None)
        .await
        .unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].catalog, PROJECT);

    let missing = CacheSubKey::Tables {
        catalog: "project-b".to_string(),
        schema: "events_2024".to_string(),
    };
    assert_eq!(client.calls_for(&missing), 1);

    facade
        .list_tables(None, Some("events_2024"), None, None)
        .await
        .unwrap();
    assert_eq!(client.calls_for(&tables_key("events_2024")), 1);
    assert_eq!(client.calls_for(&missing), 2);

    let missing_everywhere = facade
        .list_tables(None, Some("nope"), None, None)
        .await
        .unwrap();
    assert!(missing_everywhere.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn facades_on_same_account_share_cached_listings() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(2);
    let config = MetadataCacheConfig::default();

    let first = facade_with(&client, &config, &registry);
    first.list_columns(None, None, None, None).await.unwrap();
    let calls = client.total_calls();

    let second = facade_with(&client, &config, &registry);
    let columns = second.list_columns(None, None, None, None).await.unwrap();

    assert_eq!(columns.len(), 2);
    assert_eq!(client.total_calls(), calls);
    assert_eq!(registry.count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn different_ttls_use_separate_stores() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(1);
    let long = MetadataCacheConfig::default();
    let short = MetadataCacheConfig {
        cache_ttl_seconds: 30,
        ..Default::default()
    };

    facade_with(&client, &long, &registry)
        .list_schemas(None, None)
        .await
        .unwrap();
    facade_with(&client, &short, &registry)
        .list_schemas(None, None)
        .await
        .unwrap();

    assert_eq!(registry.count(), 2);
    assert_eq!(client.calls_for(&schemas_key()), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn clear_all_discards_cached_listings() {
    init_test_tracing();

    let registry = MetadataCacheRegistry::new();
    let client = project_with_datasets(2);
    let config = MetadataCacheConfig::default();
    facade_with(&client, &config, &registry)
        .list_schemas(None, None)
        .await
        .unwrap();

    registry.clear_all();
    assert_eq!(registry.count(), 0);

    let store = registry.store_for(PROJECT, config.cache_ttl_seconds);
    assert!(store.is_empty());

    facade_with(&client, &config, &registry)
        .list_schemas(None, None)
        .await
        .unwrap();
    assert_eq!(client.calls_for(&schemas_key()), 2);
}

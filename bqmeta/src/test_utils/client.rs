use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bail;
use crate::cache::CacheSubKey;
use crate::client::MetadataClient;
use crate::error::{ErrorKind, MetadataResult};
use crate::types::{ColumnDescriptor, Nullability, SchemaDescriptor, TableDescriptor, TableType};

#[derive(Debug, Default)]
struct Inner {
    catalogs: Vec<String>,
    schemas: HashMap<String, Vec<String>>,
    tables: HashMap<(String, String), Vec<TableDescriptor>>,
    columns: HashMap<(String, String, String), Vec<ColumnDescriptor>>,
    failing: HashSet<CacheSubKey>,
    panicking: HashSet<CacheSubKey>,
    calls: HashMap<CacheSubKey, usize>,
    latency: Option<Duration>,
}

/// In-memory [`MetadataClient`] for tests.
///
/// Every call is recorded under the [`CacheSubKey`] describing the listing it performs, so
/// tests can assert exactly which remote listings a facade call triggered. Individual listings
/// can be made to fail or panic, and an artificial latency can be added to every call.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockMetadataClient {
    inner: Arc<Mutex<Inner>>,
    running: Arc<AtomicUsize>,
    max_running: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter when a call finishes, panicked calls included.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockMetadataClient {
    /// Creates a client exposing `catalogs`, each with no datasets.
    pub fn new<I, S>(catalogs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        {
            let mut inner = client.inner.lock().unwrap();
            for catalog in catalogs {
                let catalog = catalog.into();
                inner.schemas.entry(catalog.clone()).or_default();
                inner.catalogs.push(catalog);
            }
        }

        client
    }

    /// Adds an empty dataset to `catalog`.
    pub fn add_dataset(&self, catalog: &str, dataset: &str) -> &Self {
        let mut inner = self.inner.lock().unwrap();
        inner
            .schemas
            .entry(catalog.to_string())
            .or_default()
            .push(dataset.to_string());
        inner
            .tables
            .entry((catalog.to_string(), dataset.to_string()))
            .or_default();

        self
    }

    /// Adds a table to an existing dataset.
    pub fn add_table(
        &self,
        catalog: &str,
        dataset: &str,
        table: &str,
        table_type: TableType,
    ) -> &Self {
        let mut inner = self.inner.lock().unwrap();
        inner
            .tables
            .entry((catalog.to_string(), dataset.to_string()))
            .or_default()
            .push(TableDescriptor {
                catalog: catalog.to_string(),
                schema: dataset.to_string(),
                name: table.to_string(),
                table_type,
                remarks: None,
            });
        inner
            .columns
            .entry((catalog.to_string(), dataset.to_string(), table.to_string()))
            .or_default();

        self
    }

    /// Appends a nullable column to an existing table.
    pub fn add_column(
        &self,
        catalog: &str,
        dataset: &str,
        table: &str,
        column: &str,
        type_name: &str,
    ) -> &Self {
        let mut inner = self.inner.lock().unwrap();
        let columns = inner
            .columns
            .entry((catalog.to_string(), dataset.to_string(), table.to_string()))
            .or_default();
        let ordinal_position = columns.len() as u32 + 1;
        columns.push(ColumnDescriptor {
            catalog: catalog.to_string(),
            schema: dataset.to_string(),
            table: table.to_string(),
            name: column.to_string(),
            ordinal_position,
            type_name: type_name.to_string(),
            nullability: Nullability::Nullable,
            remarks: None,
        });

        self
    }

    /// Makes the listing identified by `key` fail until [`MockMetadataClient::recover`].
    pub fn fail_on(&self, key: CacheSubKey) -> &Self {
        self.inner.lock().unwrap().failing.insert(key);
        self
    }

    /// Makes the listing identified by `key` panic.
    pub fn panic_on(&self, key: CacheSubKey) -> &Self {
        self.inner.lock().unwrap().panicking.insert(key);
        self
    }

    pub fn recover(&self, key: &CacheSubKey) -> &Self {
        let mut inner = self.inner.lock().unwrap();
        inner.failing.remove(key);
        inner.panicking.remove(key);
        self
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) -> &Self {
        self.inner.lock().unwrap().latency = Some(latency);
        self
    }

    /// Number of calls made for the listing identified by `key`.
    pub fn calls_for(&self, key: &CacheSubKey) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Number of calls made across all listings.
    pub fn total_calls(&self) -> usize {
        self.inner.lock().unwrap().calls.values().sum()
    }

    /// Number of table listing calls, across all datasets.
    pub fn table_listing_calls(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(key, _)| matches!(key, CacheSubKey::Tables { .. }))
            .map(|(_, count)| count)
            .sum()
    }

    /// Highest number of calls that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
        self.max_running.store(0, Ordering::SeqCst);
    }

    /// Records the call, applies latency and injected failures, then reads the fixture.
    async fn call<T>(
        &self,
        key: CacheSubKey,
        read: impl FnOnce(&Inner) -> Option<Vec<T>>,
    ) -> MetadataResult<Vec<T>> {
        let latency = {
            let mut inner = self.inner.lock().unwrap();
            *inner.calls.entry(key.clone()).or_default() += 1;
            inner.latency
        };

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        let _in_flight = InFlight(&self.running);

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let inner = self.inner.lock().unwrap();
        if inner.panicking.contains(&key) {
            drop(inner);
            panic!("injected panic for {key}");
        }
        if inner.failing.contains(&key) {
            bail!(
                ErrorKind::RemoteListingFailed,
                "Injected listing failure",
                key
            );
        }

        match read(&inner) {
            Some(items) => Ok(items),
            None => bail!(ErrorKind::NotFound, "Listing target not found", key),
        }
    }
}

impl MetadataClient for MockMetadataClient {
    async fn list_catalogs(&self) -> MetadataResult<Vec<String>> {
        self.call(CacheSubKey::Catalogs, |inner| Some(inner.catalogs.clone()))
            .await
    }

    async fn list_schemas(&self, catalog: &str) -> MetadataResult<Vec<SchemaDescriptor>> {
        let key = CacheSubKey::Schemas {
            catalog: catalog.to_string(),
        };
        self.call(key, |inner| {
            inner.schemas.get(catalog).map(|datasets| {
                datasets
                    .iter()
                    .map(|dataset| SchemaDescriptor::new(catalog, dataset.as_str()))
                    .collect()
            })
        })
        .await
    }

    async fn list_tables(&self, catalog: &str, schema: &str) -> MetadataResult<Vec<TableDescriptor>> {
        let key = CacheSubKey::Tables {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
        };
        self.call(key, |inner| {
            inner
                .tables
                .get(&(catalog.to_string(), schema.to_string()))
                .cloned()
        })
        .await
    }

    async fn list_columns(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> MetadataResult<Vec<ColumnDescriptor>> {
        let key = CacheSubKey::Columns {
            catalog: catalog.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        };
        self.call(key, |inner| {
            inner
                .columns
                .get(&(catalog.to_string(), schema.to_string(), table.to_string()))
                .cloned()
        })
        .await
    }
}

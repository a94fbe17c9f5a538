//! Cache-aware metadata listings.
//!
//! Every listing is served cache-aside: fresh cached sub-results are returned as-is, misses are
//! fetched from the [`MetadataClient`] (fanned out through the [`ParallelLoader`] when there
//! are enough of them) and successful results are written back. Failures are never cached.

use bqmeta_config::shared::MetadataCacheConfig;
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{CacheSubKey, CachedListing, MetadataCacheRegistry, MetadataCacheStore};
use crate::client::MetadataClient;
use crate::error::{ErrorKind, MetadataError, MetadataResult};
use crate::loader::{ParallelLoader, ParallelTask, partition_outcomes};
use crate::pattern::NamePattern;
use crate::types::{ColumnDescriptor, SchemaDescriptor, TableDescriptor};

/// How eagerly per-dataset listings are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingMode {
    /// Datasets are listed up front and per-dataset listings fetched for every match.
    Eager,
    /// Datasets are never listed. Only datasets requested by name are fetched; requests
    /// with a `%` wildcard are answered from what is already cached.
    Lazy,
}

impl LoadingMode {
    pub fn from_config(config: &MetadataCacheConfig) -> Self {
        if config.lazy_load {
            LoadingMode::Lazy
        } else {
            LoadingMode::Eager
        }
    }
}

/// Metadata listings for one account, backed by a shared cache store.
#[derive(Debug)]
pub struct MetadataFacade<C> {
    client: Arc<C>,
    account_id: String,
    /// `None` when caching is disabled; every call then goes to the client.
    store: Option<Arc<MetadataCacheStore>>,
    loader: ParallelLoader,
    mode: LoadingMode,
}

impl<C> MetadataFacade<C>
where
    C: MetadataClient,
{
    /// Creates a facade reading through the store registered for `(account_id, TTL)`.
    pub fn new(
        client: Arc<C>,
        account_id: impl Into<String>,
        config: &MetadataCacheConfig,
        registry: &MetadataCacheRegistry,
    ) -> Self {
        let account_id = account_id.into();
        let store = config
            .caching_active()
            .then(|| registry.store_for(&account_id, config.cache_ttl_seconds));

        Self {
            client,
            account_id,
            store,
            loader: ParallelLoader::from_config(config),
            mode: LoadingMode::from_config(config),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn loading_mode(&self) -> LoadingMode {
        self.mode
    }

    /// Returns the backing store, or `None` when caching is disabled.
    pub fn store(&self) -> Option<&Arc<MetadataCacheStore>> {
        self.store.as_ref()
    }

    /// Lists every catalog visible to the client.
    pub async fn list_catalogs(&self) -> MetadataResult<Vec<String>> {
        let catalogs = self.catalogs().await?;
        Ok(catalogs.to_vec())
    }

    /// Lists schemas whose catalog matches `catalog_filter` and whose name matches
    /// `schema_pattern`, ordered by catalog then name.
    ///
    /// In lazy mode no dataset listing is issued: the result holds the schemas known from the
    /// cache, which is empty on a cold cache.
    pub async fn list_schemas(
        &self,
        catalog_filter: Option<&str>,
        schema_pattern: Option<&str>,
    ) -> MetadataResult<Vec<SchemaDescriptor>> {
        let catalogs = self.matching_catalogs(catalog_filter).await?;
        let schema_pattern = NamePattern::parse(schema_pattern);

        let mut schemas = match self.mode {
            LoadingMode::Eager => self.schemas_of(&catalogs).await?,
            LoadingMode::Lazy => self.known_schemas(&catalogs),
        };
        schemas.retain(|schema| schema_pattern.matches(&schema.name));
        schemas.sort_by(|a, b| (&a.catalog, &a.name).cmp(&(&b.catalog, &b.name)));

        Ok(schemas)
    }

    /// Lists tables matching the filters, ordered by type, catalog, schema then name.
    ///
    /// `table_types` compares case-insensitively against [`crate::types::TableType::as_str`];
    /// `None` keeps every type.
    pub async fn list_tables(
        &self,
        catalog_filter: Option<&str>,
        schema_pattern: Option<&str>,
        name_pattern: Option<&str>,
        table_types: Option<&[&str]>,
    ) -> MetadataResult<Vec<TableDescriptor>> {
        let schemas = self.resolve_schemas(catalog_filter, schema_pattern).await?;
        let name_pattern = NamePattern::parse(name_pattern);

        let mut tables = self.tables_of(&schemas).await?;
        tables.retain(|table| {
            name_pattern.matches(&table.name)
                && table_types.is_none_or(|types| {
                    types
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(table.table_type.as_str()))
                })
        });
        tables.sort_by(|a, b| {
            (a.table_type.as_str(), &a.catalog, &a.schema, &a.name).cmp(&(
                b.table_type.as_str(),
                &b.catalog,
                &b.schema,
                &b.name,
            ))
        });

        Ok(tables)
    }

    /// Lists columns matching the filters, ordered by catalog, schema, table then ordinal.
    pub async fn list_columns(
        &self,
        catalog_filter: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> MetadataResult<Vec<ColumnDescriptor>> {
        let schemas = self.resolve_schemas(catalog_filter, schema_pattern).await?;
        let table_pattern = NamePattern::parse(table_pattern);
        let column_pattern = NamePattern::parse(column_pattern);

        let tables: Vec<TableDescriptor> = self
            .tables_of(&schemas)
            .await?
            .into_iter()
            .filter(|table| table_pattern.matches(&table.name))
            .collect();

        let client = self.client.clone();
        let keys = tables
            .iter()
            .map(|table| CacheSubKey::Columns {
                catalog: table.catalog.clone(),
                schema: table.schema.clone(),
                table: table.name.clone(),
            })
            .collect();
        let mut columns = self
            .fetch_listings(keys, move |key| {
                let client = client.clone();
                async move {
                    match key {
                        CacheSubKey::Columns {
                            catalog,
                            schema,
                            table,
                        } => client
                            .list_columns(&catalog, &schema, &table)
                            .await
                            .map(Some),
                        _ => Ok(None),
                    }
                }
            })
            .await?;
        columns.retain(|column| column_pattern.matches(&column.name));
        columns.sort_by(|a, b| {
            (&a.catalog, &a.schema, &a.table, a.ordinal_position).cmp(&(
                &b.catalog,
                &b.schema,
                &b.table,
                b.ordinal_position,
            ))
        });

        Ok(columns)
    }

    /// Drops every cached listing of this facade's store.
    ///
    /// Other facades sharing the store observe the invalidation too.
    pub fn invalidate(&self) {
        if let Some(store) = &self.store {
            debug!(account_id = %self.account_id, "invalidating metadata cache");
            store.invalidate_all();
        }
    }

    fn cached<T: CachedListing>(&self, key: &CacheSubKey) -> Option<Arc<[T]>> {
        let cached = self.store.as_ref()?.get(key)?;
        T::from_cached(cached)
    }

    fn populate<T: CachedListing>(&self, key: CacheSubKey, items: Arc<[T]>) {
        if let Some(store) = &self.store {
            store.put(key, T::into_cached(items));
        }
    }

    /// Top-level catalog listing. Failures propagate unchanged.
    async fn catalogs(&self) -> MetadataResult<Arc<[String]>> {
        if let Some(catalogs) = self.cached::<String>(&CacheSubKey::Catalogs) {
            debug!("metadata cache hit for catalogs");
            return Ok(catalogs);
        }

        let catalogs: Arc<[String]> = self.client.list_catalogs().await?.into();
        self.populate(CacheSubKey::Catalogs, catalogs.clone());

        Ok(catalogs)
    }

    async fn matching_catalogs(&self, catalog_filter: Option<&str>) -> MetadataResult<Vec<String>> {
        let pattern = NamePattern::parse(catalog_filter);
        let catalogs = self.catalogs().await?;

        Ok(catalogs
            .iter()
            .filter(|catalog| pattern.matches(catalog))
            .cloned()
            .collect())
    }

    /// Lists the datasets of every catalog, one sub-request per catalog.
    async fn schemas_of(&self, catalogs: &[String]) -> MetadataResult<Vec<SchemaDescriptor>> {
        let client = self.client.clone();
        let keys = catalogs
            .iter()
            .map(|catalog| CacheSubKey::Schemas {
                catalog: catalog.clone(),
            })
            .collect();

        self.fetch_listings(keys, move |key| {
            let client = client.clone();
            async move {
                match key {
                    CacheSubKey::Schemas { catalog } => {
                        client.list_schemas(&catalog).await.map(Some)
                    }
                    _ => Ok(None),
                }
            }
        })
        .await
    }

    /// Schemas known without a remote call: cached dataset lists plus datasets whose tables
    /// are cached.
    fn known_schemas(&self, catalogs: &[String]) -> Vec<SchemaDescriptor> {
        let Some(store) = &self.store else {
            return Vec::new();
        };

        let mut known = BTreeSet::new();
        for key in store.fresh_keys() {
            match key {
                CacheSubKey::Schemas { catalog } if catalogs.contains(&catalog) => {
                    let key = CacheSubKey::Schemas { catalog };
                    if let Some(schemas) = self.cached::<SchemaDescriptor>(&key) {
                        for schema in schemas.iter() {
                            known.insert((schema.catalog.clone(), schema.name.clone()));
                        }
                    }
                }
                CacheSubKey::Tables { catalog, schema } if catalogs.contains(&catalog) => {
                    known.insert((catalog, schema));
                }
                _ => {}
            }
        }

        known
            .into_iter()
            .map(|(catalog, name)| SchemaDescriptor::new(catalog, name))
            .collect()
    }

    /// Resolves the schemas whose tables a table or column listing has to read.
    ///
    /// In lazy mode no datasets are listed. A pattern without `%` names its dataset directly
    /// (underscores taken literally) in every matching catalog, on top of the matching schemas
    /// already known from the cache.
    async fn resolve_schemas(
        &self,
        catalog_filter: Option<&str>,
        schema_pattern: Option<&str>,
    ) -> MetadataResult<Vec<SchemaDescriptor>> {
        let catalogs = self.matching_catalogs(catalog_filter).await?;
        let pattern = NamePattern::parse(schema_pattern);

        let mut schemas = match self.mode {
            LoadingMode::Eager => self.schemas_of(&catalogs).await?,
            LoadingMode::Lazy => {
                let mut schemas = self.known_schemas(&catalogs);
                if let Some(name) = pattern.literal_candidate() {
                    schemas.extend(catalogs.iter().map(|catalog| {
                        SchemaDescriptor::new(catalog.as_str(), name.as_str())
                    }));
                    schemas.sort_by(|a, b| (&a.catalog, &a.name).cmp(&(&b.catalog, &b.name)));
                    schemas.dedup();
                }
                schemas
            }
        };
        schemas.retain(|schema| pattern.matches(&schema.name));

        Ok(schemas)
    }

    /// Lists the tables of every schema, one sub-request per schema.
    ///
    /// Lazy schemas may be named without ever being listed, so in lazy mode a dataset that
    /// does not exist contributes no tables instead of failing the request.
    async fn tables_of(&self, schemas: &[SchemaDescriptor]) -> MetadataResult<Vec<TableDescriptor>> {
        let missing_is_empty = self.mode == LoadingMode::Lazy;
        let client = self.client.clone();
        let keys = schemas
            .iter()
            .map(|schema| CacheSubKey::Tables {
                catalog: schema.catalog.clone(),
                schema: schema.name.clone(),
            })
            .collect();

        self.fetch_listings(keys, move |key| {
            let client = client.clone();
            async move {
                match key {
                    CacheSubKey::Tables { catalog, schema } => {
                        match client.list_tables(&catalog, &schema).await {
                            Ok(tables) => Ok(Some(tables)),
                            Err(err) if missing_is_empty && err.kind() == ErrorKind::NotFound => {
                                Ok(None)
                            }
                            Err(err) => Err(err),
                        }
                    }
                    _ => Ok(None),
                }
            }
        })
        .await
    }

    /// Serves every sub-key from the cache where possible and fetches the rest.
    ///
    /// A fetch resolving to `None` names a listing target that does not exist: it adds nothing
    /// and is not cached. Failed sub-requests are logged and omitted from the result. When
    /// nothing could be served because every dispatched sub-request failed, a single failure
    /// propagates as-is and several are combined into an [`ErrorKind::AllSubRequestsFailed`]
    /// error.
    async fn fetch_listings<T, F, Fut>(
        &self,
        keys: Vec<CacheSubKey>,
        fetch: F,
    ) -> MetadataResult<Vec<T>>
    where
        T: CachedListing,
        F: Fn(CacheSubKey) -> Fut,
        Fut: Future<Output = MetadataResult<Option<Vec<T>>>> + Send + 'static,
    {
        let mut items = Vec::new();
        let mut misses = HashMap::new();
        let mut tasks = Vec::new();
        let mut hits = 0;

        for key in keys {
            if let Some(cached) = self.cached::<T>(&key) {
                hits += 1;
                items.extend(cached.iter().cloned());
                continue;
            }

            let label = key.to_string();
            if misses.contains_key(&label) {
                continue;
            }
            tasks.push(ParallelTask::new(label.clone(), fetch(key.clone())));
            misses.insert(label, key);
        }

        debug!(
            account_id = %self.account_id,
            hits,
            misses = tasks.len(),
            "resolved metadata listings against cache"
        );

        if tasks.is_empty() {
            return Ok(items);
        }

        let dispatched = tasks.len();
        let outcomes = self.loader.run(tasks).await;
        let (successes, failures) = partition_outcomes(outcomes);

        for (label, fetched) in successes {
            let Some(fetched) = fetched else {
                debug!(%label, "metadata listing target does not exist");
                continue;
            };
            let fetched: Arc<[T]> = fetched.into();
            items.extend(fetched.iter().cloned());
            if let Some(key) = misses.remove(&label) {
                self.populate(key, fetched);
            }
        }

        if hits == 0 && failures.len() == dispatched {
            let mut errors: Vec<MetadataError> =
                failures.into_iter().map(|(_, err)| err).collect();
            if errors.len() > 1 {
                return Err(MetadataError::all_failed(errors));
            }
            if let Some(err) = errors.pop() {
                return Err(err);
            }
        }

        Ok(items)
    }
}

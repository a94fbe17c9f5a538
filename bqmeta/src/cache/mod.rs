//! TTL-based, process-wide cache for metadata listings.
//!
//! A [`CacheRegistry`] hands out one [`CacheStore`] per `(account, TTL)` pair. Each store maps a
//! [`CacheSubKey`] (the schema list of a catalog, the tables of one dataset, ...) to the
//! [`CachedMetadata`] fetched for it, together with the instant it was fetched.

mod entry;
mod registry;
mod store;

pub use entry::{CacheEntry, Ttl};
pub use registry::{CacheKey, CacheRegistry};
pub use store::CacheStore;

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::types::{ColumnDescriptor, SchemaDescriptor, TableDescriptor};

/// Identifies one cached listing within a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheSubKey {
    Catalogs,
    Schemas {
        catalog: String,
    },
    Tables {
        catalog: String,
        schema: String,
    },
    Columns {
        catalog: String,
        schema: String,
        table: String,
    },
}

impl fmt::Display for CacheSubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheSubKey::Catalogs => f.write_str("catalogs"),
            CacheSubKey::Schemas { catalog } => write!(f, "schemas:{catalog}"),
            CacheSubKey::Tables { catalog, schema } => write!(f, "tables:{catalog}.{schema}"),
            CacheSubKey::Columns {
                catalog,
                schema,
                table,
            } => write!(f, "columns:{catalog}.{schema}.{table}"),
        }
    }
}

/// A cached listing. Lists are reference counted so cache hits do not copy them.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedMetadata {
    Catalogs(Arc<[String]>),
    Schemas(Arc<[SchemaDescriptor]>),
    Tables(Arc<[TableDescriptor]>),
    Columns(Arc<[ColumnDescriptor]>),
}

/// Element type of a cacheable listing.
pub trait CachedListing: Clone + Send + Sync + 'static {
    fn into_cached(items: Arc<[Self]>) -> CachedMetadata;

    /// Extracts the listing, or `None` if `cached` holds a different kind of listing.
    fn from_cached(cached: CachedMetadata) -> Option<Arc<[Self]>>;
}

macro_rules! impl_cached_listing {
    ($item:ty, $variant:ident) => {
        impl CachedListing for $item {
            fn into_cached(items: Arc<[Self]>) -> CachedMetadata {
                CachedMetadata::$variant(items)
            }

            fn from_cached(cached: CachedMetadata) -> Option<Arc<[Self]>> {
                match cached {
                    CachedMetadata::$variant(items) => Some(items),
                    _ => None,
                }
            }
        }
    };
}

impl_cached_listing!(String, Catalogs);
impl_cached_listing!(SchemaDescriptor, Schemas);
impl_cached_listing!(TableDescriptor, Tables);
impl_cached_listing!(ColumnDescriptor, Columns);

/// Store type used by the metadata facade.
pub type MetadataCacheStore = CacheStore<CacheSubKey, CachedMetadata>;

/// Registry type used by the metadata facade.
pub type MetadataCacheRegistry = CacheRegistry<CacheSubKey, CachedMetadata>;

static GLOBAL_REGISTRY: LazyLock<Arc<MetadataCacheRegistry>> =
    LazyLock::new(|| Arc::new(MetadataCacheRegistry::new()));

/// Returns the lazily created process-wide registry.
///
/// Connection factories that want caching to outlive every individual connection hold on to
/// this handle; tests should build their own registry instead.
pub fn global_registry() -> Arc<MetadataCacheRegistry> {
    GLOBAL_REGISTRY.clone()
}

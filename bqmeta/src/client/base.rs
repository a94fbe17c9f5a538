use std::future::Future;

use crate::error::MetadataResult;
use crate::types::{ColumnDescriptor, SchemaDescriptor, TableDescriptor};

/// Lists metadata from the authoritative remote source.
///
/// Every listing is independent: the facade calls these methods concurrently from several
/// tasks, one per dataset or table, so implementations must not rely on shared mutable state
/// between calls. Failures are reported as-is; the cache never stores them, so the next call
/// retries against the remote source.
pub trait MetadataClient: Send + Sync + 'static {
    /// Lists the catalogs (projects) visible to this client.
    fn list_catalogs(&self) -> impl Future<Output = MetadataResult<Vec<String>>> + Send;

    /// Lists the schemas (datasets) of `catalog`.
    fn list_schemas(
        &self,
        catalog: &str,
    ) -> impl Future<Output = MetadataResult<Vec<SchemaDescriptor>>> + Send;

    /// Lists the tables of one schema.
    fn list_tables(
        &self,
        catalog: &str,
        schema: &str,
    ) -> impl Future<Output = MetadataResult<Vec<TableDescriptor>>> + Send;

    /// Lists the top-level columns of one table, in ordinal order.
    fn list_columns(
        &self,
        catalog: &str,
        schema: &str,
        table: &str,
    ) -> impl Future<Output = MetadataResult<Vec<ColumnDescriptor>>> + Send;
}

//! Configuration types shared by the metadata library and its binaries.

mod app;
mod base;
mod bigquery;
mod cache;

pub use app::AppConfig;
pub use base::ValidationError;
pub use bigquery::BigQueryConfig;
pub use cache::MetadataCacheConfig;

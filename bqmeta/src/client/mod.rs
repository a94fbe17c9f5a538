//! Remote listing clients the metadata facade reads from.

mod base;
#[cfg(feature = "bigquery")]
pub mod bigquery;

pub use base::MetadataClient;

//! Cached catalog, schema, table and column listings for BigQuery.
//!
//! A [`connection::Driver`] opens [`connection::Connection`]s whose [`facade::MetadataFacade`]
//! answers listings from a process-wide [`cache::CacheRegistry`], fetching misses from a
//! [`client::MetadataClient`] through the [`loader::ParallelLoader`].

pub mod cache;
pub mod client;
pub mod clock;
pub mod connection;
pub mod error;
pub mod facade;
pub mod loader;
mod macros;
pub mod pattern;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

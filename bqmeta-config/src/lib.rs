//! Configuration for the BigQuery metadata cache and its tooling.

pub mod environment;
pub mod load;
pub mod shared;

pub use load::{LoadConfigError, load_config, load_config_from};

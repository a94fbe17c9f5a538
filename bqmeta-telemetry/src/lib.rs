//! Logging setup shared by the metadata binaries and tests.

pub mod tracing;

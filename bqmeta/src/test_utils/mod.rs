//! Deterministic building blocks for tests: a manually advanced clock and an in-memory
//! listing client with call accounting and failure injection.

pub mod client;
pub mod clock;

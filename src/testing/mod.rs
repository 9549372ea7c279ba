//! Test support: shared fixtures for unit and integration tests
//!
//! Compiled into the library so integration tests under `tests/` can reuse
//! the same payloads and identities the unit tests use.

pub mod fixtures;

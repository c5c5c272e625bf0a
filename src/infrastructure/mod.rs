//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Rule storage (in-memory, PostgreSQL)
//! - The JSON-lines TCP API

pub mod clock;
pub mod memory_store;
pub mod protocol;
pub mod server;

#[cfg(feature = "pgsql-storage")]
pub mod pg_store;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds.
///
/// To use these mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// brute-guard = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;

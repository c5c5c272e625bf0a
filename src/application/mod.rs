//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Window registry (self-expiring per-key counters)
//! - Rule matcher (allow/deny list maintenance and lookup)
//! - Permit checker (the per-attempt decision)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod metrics;
pub mod permit;
pub mod ports;
pub mod registry;
pub mod rules;

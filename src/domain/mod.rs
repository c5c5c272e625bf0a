//! Domain layer - pure types with no runtime dependencies.
//!
//! - Window limits
//! - Network rules, verdicts and rule filters
//! - Authentication attempts and verdict results
//! - The shared error taxonomy

pub mod attempt;
pub mod error;
pub mod limits;
pub mod rule;

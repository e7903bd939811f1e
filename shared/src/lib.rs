//! Shared types and domain logic for the AIMS processing platform
//!
//! This crate contains the material-lot accounting rules, the production
//! batch transition table, FEFO reservation planning and the cost formulas.
//! It is free of I/O so the backend services and the test suites exercise
//! the same logic.

pub mod allocation;
pub mod models;
pub mod types;
pub mod validation;

pub use allocation::*;
pub use models::*;
pub use types::*;
pub use validation::*;

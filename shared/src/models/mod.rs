//! Domain models for the AIMS processing platform

pub mod consumption;
pub mod cost;
pub mod material;
pub mod production;

pub use consumption::*;
pub use cost::*;
pub use material::*;
pub use production::*;

//! Business logic services

pub mod consumption;
pub mod cost;
pub mod material_ledger;
pub mod production;

pub use consumption::ConsumptionRecorder;
pub use cost::CostService;
pub use material_ledger::MaterialLedgerService;
pub use production::ProductionService;

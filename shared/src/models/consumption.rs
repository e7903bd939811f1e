//! Audit rows linking production batches to the lots they drew from

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of a reservation row
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Open,
    Consumed,
    Released,
}

impl ReservationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Open => "open",
            ReservationState::Consumed => "consumed",
            ReservationState::Released => "released",
        }
    }
}

impl std::str::FromStr for ReservationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ReservationState::Open),
            "consumed" => Ok(ReservationState::Consumed),
            "released" => Ok(ReservationState::Released),
            other => Err(format!("unknown reservation state: {}", other)),
        }
    }
}

/// Quantity earmarked on one lot for one production batch
///
/// Written by `start`, settled by `complete` (consumed) or `cancel`
/// (released). Open rows are the batch's outstanding claim on stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialReservation {
    pub id: Uuid,
    pub production_batch_id: Uuid,
    pub material_batch_id: Uuid,
    pub material_type_id: Uuid,
    pub quantity: Decimal,
    /// Lot unit price captured when the reservation was taken
    pub unit_price: Decimal,
    pub state: ReservationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable audit row: a production batch permanently drew `quantity`
/// from a lot at the given unit cost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialConsumption {
    pub id: Uuid,
    pub production_batch_id: Uuid,
    pub material_batch_id: Uuid,
    pub quantity_consumed: Decimal,
    pub unit_cost_at_consumption: Decimal,
    pub consumed_at: DateTime<Utc>,
}

/// Audit row for a manual correction to a lot's remaining quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialBatchAdjustment {
    pub id: Uuid,
    pub material_batch_id: Uuid,
    pub delta: Decimal,
    pub reason: String,
    pub adjusted_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Equipment usage reported by the external equipment tracker,
/// read-only input to cost calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEquipmentUsage {
    pub id: Uuid,
    pub production_batch_id: Uuid,
    pub equipment_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub usage_hours: Option<Decimal>,
    pub equipment_cost: Decimal,
}

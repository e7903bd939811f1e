//! Batch cost roll-up formulas
//!
//! `total = material + equipment + labor`, `unit = total / good_quantity`.
//! Recalculation always starts from the current audit rows, so repeating it
//! with unchanged inputs yields the same result.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::consumption::{BatchEquipmentUsage, MaterialConsumption};

/// Cost breakdown for a production batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostBreakdown {
    pub material_cost: Decimal,
    pub equipment_cost: Decimal,
    pub labor_cost: Decimal,
    pub total_cost: Decimal,
    /// None when no good units were produced; never a division error
    pub unit_cost: Option<Decimal>,
}

/// Sum of consumed quantity times the unit cost captured at consumption
pub fn material_cost(consumptions: &[MaterialConsumption]) -> Decimal {
    consumptions
        .iter()
        .map(|c| c.quantity_consumed * c.unit_cost_at_consumption)
        .sum()
}

/// Sum of reported equipment costs
pub fn equipment_cost(usages: &[BatchEquipmentUsage]) -> Decimal {
    usages.iter().map(|u| u.equipment_cost).sum()
}

/// Per-good-unit cost; undefined when nothing good was produced
pub fn unit_cost(total_cost: Decimal, good_quantity: Decimal) -> Option<Decimal> {
    if good_quantity <= Decimal::ZERO {
        None
    } else {
        Some(total_cost / good_quantity)
    }
}

/// Roll consumption, equipment usage and labor into one breakdown
pub fn calculate_costs(
    consumptions: &[MaterialConsumption],
    usages: &[BatchEquipmentUsage],
    labor_cost: Decimal,
    good_quantity: Option<Decimal>,
) -> CostBreakdown {
    let material = material_cost(consumptions);
    let equipment = equipment_cost(usages);
    let total = material + equipment + labor_cost;
    CostBreakdown {
        material_cost: material,
        equipment_cost: equipment,
        labor_cost,
        total_cost: total,
        unit_cost: good_quantity.and_then(|g| unit_cost(total, g)),
    }
}

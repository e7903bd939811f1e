//! Material lot models and quantity accounting
//!
//! A lot is one received quantity of a raw-material type. Its four
//! quantities always satisfy the ledger balance:
//! `receipt == remaining + reserved + used`, each of the mutable three
//! being non-negative. Every mutation goes through [`LotQuantities`], which
//! rejects any operation that would break the balance.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Status of a material lot
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MaterialBatchStatus {
    Available,
    Reserved,
    Depleted,
    Expired,
}

impl MaterialBatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialBatchStatus::Available => "available",
            MaterialBatchStatus::Reserved => "reserved",
            MaterialBatchStatus::Depleted => "depleted",
            MaterialBatchStatus::Expired => "expired",
        }
    }

    /// A lot in this status can take new reservations
    pub fn is_reservable(&self) -> bool {
        matches!(
            self,
            MaterialBatchStatus::Available | MaterialBatchStatus::Reserved
        )
    }
}

impl std::str::FromStr for MaterialBatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(MaterialBatchStatus::Available),
            "reserved" => Ok(MaterialBatchStatus::Reserved),
            "depleted" => Ok(MaterialBatchStatus::Depleted),
            "expired" => Ok(MaterialBatchStatus::Expired),
            other => Err(format!("unknown material batch status: {}", other)),
        }
    }
}

impl std::fmt::Display for MaterialBatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors raised by lot quantity operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Requested more than the lot can supply; no partial reservation
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    /// The lot's status forbids the operation (expired or depleted)
    #[error("lot is not available: status {status}")]
    LotNotAvailable { status: MaterialBatchStatus },

    /// Quantities must be strictly positive
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    /// The operation would break the ledger balance; programmer error,
    /// the enclosing transaction must abort
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
}

/// The four quantities of a single lot
///
/// `receipt` is immutable once set; the other three move between each
/// other through `reserve`, `release`, `consume` and `adjust`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotQuantities {
    pub receipt: Decimal,
    pub remaining: Decimal,
    pub reserved: Decimal,
    pub used: Decimal,
}

impl LotQuantities {
    /// Quantities of a freshly received lot
    pub fn on_receipt(receipt: Decimal) -> Self {
        Self {
            receipt,
            remaining: receipt,
            reserved: Decimal::ZERO,
            used: Decimal::ZERO,
        }
    }

    /// The balance invariant: receipt == remaining + reserved + used,
    /// all mutable quantities non-negative
    pub fn invariant_holds(&self) -> bool {
        self.remaining >= Decimal::ZERO
            && self.reserved >= Decimal::ZERO
            && self.used >= Decimal::ZERO
            && self.receipt == self.remaining + self.reserved + self.used
    }

    /// Earmark `qty` for a production batch: remaining -> reserved
    pub fn reserve(&mut self, qty: Decimal) -> Result<(), LedgerError> {
        if qty <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveQuantity(qty));
        }
        if qty > self.remaining {
            return Err(LedgerError::InsufficientStock {
                requested: qty,
                available: self.remaining,
            });
        }
        self.remaining -= qty;
        self.reserved += qty;
        Ok(())
    }

    /// Return `qty` from reserved back to remaining
    ///
    /// Releasing more than is reserved is an invariant violation, never
    /// silently clamped.
    pub fn release(&mut self, qty: Decimal) -> Result<(), LedgerError> {
        if qty <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveQuantity(qty));
        }
        if qty > self.reserved {
            return Err(LedgerError::InvariantViolation(format!(
                "release of {} exceeds reserved {}",
                qty, self.reserved
            )));
        }
        self.reserved -= qty;
        self.remaining += qty;
        Ok(())
    }

    /// Convert `qty` of reservation into a permanent draw: reserved -> used
    pub fn consume(&mut self, qty: Decimal) -> Result<(), LedgerError> {
        if qty <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveQuantity(qty));
        }
        if qty > self.reserved {
            return Err(LedgerError::InvariantViolation(format!(
                "consume of {} exceeds reserved {}",
                qty, self.reserved
            )));
        }
        self.reserved -= qty;
        self.used += qty;
        Ok(())
    }

    /// Manual correction of `remaining` by `delta` (positive or negative)
    ///
    /// The receipt quantity moves with it so the balance keeps holding;
    /// a correction that would push `remaining` negative is rejected.
    pub fn adjust(&mut self, delta: Decimal) -> Result<(), LedgerError> {
        if delta == Decimal::ZERO {
            return Err(LedgerError::NonPositiveQuantity(delta));
        }
        let new_remaining = self.remaining + delta;
        if new_remaining < Decimal::ZERO {
            return Err(LedgerError::InvariantViolation(format!(
                "adjustment of {} would leave remaining at {}",
                delta, new_remaining
            )));
        }
        self.remaining = new_remaining;
        self.receipt += delta;
        Ok(())
    }

    /// Status implied by the current quantities (expiry is tracked
    /// separately and sticky)
    pub fn derived_status(&self) -> MaterialBatchStatus {
        if self.remaining + self.reserved == Decimal::ZERO {
            MaterialBatchStatus::Depleted
        } else if self.remaining == Decimal::ZERO {
            MaterialBatchStatus::Reserved
        } else {
            MaterialBatchStatus::Available
        }
    }
}

/// A material lot tracked by the factory ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialBatch {
    pub id: Uuid,
    pub factory_id: Uuid,
    /// Unique per factory (e.g. "MAT-2025-0001")
    pub batch_number: String,
    pub material_type_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub receipt_date: NaiveDate,
    pub expire_date: Option<NaiveDate>,
    pub quantity_unit: String,
    pub receipt_quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub used_quantity: Decimal,
    pub unit_price: Decimal,
    pub total_value: Decimal,
    pub status: MaterialBatchStatus,
    pub storage_location: Option<String>,
    pub quality_certificate: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaterialBatch {
    /// View of the lot's quantities for ledger arithmetic
    pub fn quantities(&self) -> LotQuantities {
        LotQuantities {
            receipt: self.receipt_quantity,
            remaining: self.remaining_quantity,
            reserved: self.reserved_quantity,
            used: self.used_quantity,
        }
    }
}

/// One required material line for a production batch, supplied by the
/// external planning component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_type_id: Uuid,
    pub quantity: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn receipt_initializes_balanced() {
        let q = LotQuantities::on_receipt(dec("100"));
        assert!(q.invariant_holds());
        assert_eq!(q.remaining, dec("100"));
        assert_eq!(q.derived_status(), MaterialBatchStatus::Available);
    }

    #[test]
    fn reserve_then_release_round_trips() {
        let mut q = LotQuantities::on_receipt(dec("100"));
        q.reserve(dec("40")).unwrap();
        assert_eq!(q.remaining, dec("60"));
        assert_eq!(q.reserved, dec("40"));
        q.release(dec("40")).unwrap();
        assert_eq!(q, LotQuantities::on_receipt(dec("100")));
    }

    #[test]
    fn reserve_beyond_remaining_fails_without_partial_effect() {
        let mut q = LotQuantities::on_receipt(dec("100"));
        let err = q.reserve(dec("150")).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientStock { .. }));
        assert_eq!(q, LotQuantities::on_receipt(dec("100")));
    }

    #[test]
    fn release_beyond_reserved_is_invariant_violation() {
        let mut q = LotQuantities::on_receipt(dec("100"));
        q.reserve(dec("10")).unwrap();
        let err = q.release(dec("11")).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn consume_moves_reserved_to_used() {
        let mut q = LotQuantities::on_receipt(dec("100"));
        q.reserve(dec("100")).unwrap();
        q.consume(dec("100")).unwrap();
        assert_eq!(q.used, dec("100"));
        assert_eq!(q.derived_status(), MaterialBatchStatus::Depleted);
        assert!(q.invariant_holds());
    }

    #[test]
    fn full_reservation_marks_lot_reserved() {
        let mut q = LotQuantities::on_receipt(dec("50"));
        q.reserve(dec("50")).unwrap();
        assert_eq!(q.derived_status(), MaterialBatchStatus::Reserved);
    }

    #[test]
    fn negative_adjust_cannot_exceed_remaining() {
        let mut q = LotQuantities::on_receipt(dec("20"));
        q.reserve(dec("5")).unwrap();
        assert!(q.adjust(dec("-15")).is_ok());
        assert!(q.invariant_holds());
        let err = q.adjust(dec("-1")).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[test]
    fn adjust_keeps_balance() {
        let mut q = LotQuantities::on_receipt(dec("20"));
        q.adjust(dec("7.5")).unwrap();
        assert_eq!(q.receipt, dec("27.5"));
        assert!(q.invariant_holds());
    }
}

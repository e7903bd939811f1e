//! FEFO lot allocation planning
//!
//! When a production batch needs N units of a material type, lots are drawn
//! earliest-expiry-first, FIFO on receipt date as the tie-break. Planning is
//! all-or-nothing: a shortfall anywhere means no draw is planned at all.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A lot eligible for reservation, as seen at planning time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotCandidate {
    pub lot_id: Uuid,
    /// Lots without an expiry date sort after all dated lots
    pub expire_date: Option<NaiveDate>,
    pub receipt_date: NaiveDate,
    pub remaining: Decimal,
}

/// A planned draw against one lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDraw {
    pub lot_id: Uuid,
    pub quantity: Decimal,
}

/// Planning failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    /// Eligible lots cannot cover the requested quantity
    #[error("insufficient material: requested {requested}, available {available}")]
    Shortfall {
        requested: Decimal,
        available: Decimal,
    },

    #[error("required quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),
}

/// Plan draws covering `required` across `candidates`, FEFO order
///
/// Candidates with nothing remaining are skipped. The returned draws sum to
/// exactly `required`; on shortfall nothing is planned.
pub fn plan_allocation(
    candidates: &[LotCandidate],
    required: Decimal,
) -> Result<Vec<PlannedDraw>, AllocationError> {
    if required <= Decimal::ZERO {
        return Err(AllocationError::NonPositiveQuantity(required));
    }

    let mut ordered: Vec<&LotCandidate> = candidates
        .iter()
        .filter(|c| c.remaining > Decimal::ZERO)
        .collect();
    ordered.sort_by(|a, b| {
        fefo_key(a)
            .cmp(&fefo_key(b))
            .then_with(|| a.lot_id.cmp(&b.lot_id))
    });

    let mut draws = Vec::new();
    let mut outstanding = required;
    for lot in ordered {
        if outstanding == Decimal::ZERO {
            break;
        }
        let take = outstanding.min(lot.remaining);
        draws.push(PlannedDraw {
            lot_id: lot.lot_id,
            quantity: take,
        });
        outstanding -= take;
    }

    if outstanding > Decimal::ZERO {
        return Err(AllocationError::Shortfall {
            requested: required,
            available: required - outstanding,
        });
    }

    Ok(draws)
}

/// FEFO sort key: expiry ascending with undated lots last, then receipt date
fn fefo_key(lot: &LotCandidate) -> (bool, Option<NaiveDate>, NaiveDate) {
    (lot.expire_date.is_none(), lot.expire_date, lot.receipt_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn lot(expire: Option<NaiveDate>, receipt: NaiveDate, remaining: &str) -> LotCandidate {
        LotCandidate {
            lot_id: Uuid::new_v4(),
            expire_date: expire,
            receipt_date: receipt,
            remaining: dec(remaining),
        }
    }

    #[test]
    fn earliest_expiry_drawn_first() {
        let late = lot(Some(date(2025, 12, 1)), date(2025, 1, 1), "100");
        let early = lot(Some(date(2025, 6, 1)), date(2025, 2, 1), "100");
        let draws = plan_allocation(&[late.clone(), early.clone()], dec("50")).unwrap();
        assert_eq!(draws, vec![PlannedDraw { lot_id: early.lot_id, quantity: dec("50") }]);
    }

    #[test]
    fn receipt_date_breaks_expiry_ties() {
        let newer = lot(Some(date(2025, 6, 1)), date(2025, 3, 1), "100");
        let older = lot(Some(date(2025, 6, 1)), date(2025, 1, 1), "100");
        let draws = plan_allocation(&[newer.clone(), older.clone()], dec("10")).unwrap();
        assert_eq!(draws[0].lot_id, older.lot_id);
    }

    #[test]
    fn undated_lots_sort_after_dated_ones() {
        let undated = lot(None, date(2024, 1, 1), "100");
        let dated = lot(Some(date(2026, 1, 1)), date(2025, 1, 1), "100");
        let draws = plan_allocation(&[undated.clone(), dated.clone()], dec("150")).unwrap();
        assert_eq!(draws[0].lot_id, dated.lot_id);
        assert_eq!(draws[0].quantity, dec("100"));
        assert_eq!(draws[1].lot_id, undated.lot_id);
        assert_eq!(draws[1].quantity, dec("50"));
    }

    #[test]
    fn spills_across_lots_and_sums_exactly() {
        let a = lot(Some(date(2025, 5, 1)), date(2025, 1, 1), "30");
        let b = lot(Some(date(2025, 7, 1)), date(2025, 1, 2), "30");
        let c = lot(Some(date(2025, 9, 1)), date(2025, 1, 3), "30");
        let draws = plan_allocation(&[c, a, b], dec("70")).unwrap();
        let total: Decimal = draws.iter().map(|d| d.quantity).sum();
        assert_eq!(total, dec("70"));
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[2].quantity, dec("10"));
    }

    #[test]
    fn shortfall_plans_nothing() {
        let a = lot(Some(date(2025, 5, 1)), date(2025, 1, 1), "30");
        let b = lot(None, date(2025, 1, 2), "40");
        let err = plan_allocation(&[a, b], dec("100")).unwrap_err();
        assert_eq!(
            err,
            AllocationError::Shortfall {
                requested: dec("100"),
                available: dec("70"),
            }
        );
    }

    #[test]
    fn empty_lots_are_skipped() {
        let empty = lot(Some(date(2025, 1, 1)), date(2024, 1, 1), "0");
        let stocked = lot(Some(date(2025, 6, 1)), date(2024, 6, 1), "20");
        let draws = plan_allocation(&[empty, stocked.clone()], dec("20")).unwrap();
        assert_eq!(draws, vec![PlannedDraw { lot_id: stocked.lot_id, quantity: dec("20") }]);
    }

    #[test]
    fn exact_fit_consumes_whole_lot() {
        let only = lot(None, date(2025, 1, 1), "42");
        let draws = plan_allocation(&[only.clone()], dec("42")).unwrap();
        assert_eq!(draws[0].quantity, dec("42"));
    }

    #[test]
    fn zero_request_is_rejected() {
        let only = lot(None, date(2025, 1, 1), "42");
        assert!(matches!(
            plan_allocation(&[only], Decimal::ZERO),
            Err(AllocationError::NonPositiveQuantity(_))
        ));
    }
}

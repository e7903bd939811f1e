//! Material ledger tests
//!
//! Property-based and unit tests for:
//! - Lot quantity balance across arbitrary operation sequences
//! - First-expired-first-out allocation planning
//! - All-or-nothing multi-lot reservation planning

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::{
    plan_allocation, AllocationError, LedgerError, LotCandidate, LotQuantities,
    MaterialBatchStatus,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn candidate(
    expire: Option<NaiveDate>,
    receipt: NaiveDate,
    remaining: &str,
) -> LotCandidate {
    LotCandidate {
        lot_id: Uuid::new_v4(),
        expire_date: expire,
        receipt_date: receipt,
        remaining: dec(remaining),
    }
}

// ============================================================================
// Property Test Strategies
// ============================================================================

/// One ledger operation with a quantity in a realistic range
#[derive(Debug, Clone)]
enum LedgerOp {
    Reserve(u32),
    Release(u32),
    Consume(u32),
    Adjust(i32),
}

fn ledger_op_strategy() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        (1u32..500).prop_map(LedgerOp::Reserve),
        (1u32..500).prop_map(LedgerOp::Release),
        (1u32..500).prop_map(LedgerOp::Consume),
        (-500i32..500).prop_map(LedgerOp::Adjust),
    ]
}

fn apply_op(q: &mut LotQuantities, op: &LedgerOp) -> Result<(), LedgerError> {
    match op {
        LedgerOp::Reserve(n) => q.reserve(Decimal::from(*n)),
        LedgerOp::Release(n) => q.release(Decimal::from(*n)),
        LedgerOp::Consume(n) => q.consume(Decimal::from(*n)),
        LedgerOp::Adjust(n) => q.adjust(Decimal::from(*n)),
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// The balance holds after any sequence of operations, whether each
    /// step was accepted or rejected.
    #[test]
    fn ledger_balance_survives_any_operation_sequence(
        receipt in 1u32..2000,
        ops in prop::collection::vec(ledger_op_strategy(), 0..40),
    ) {
        let mut q = LotQuantities::on_receipt(Decimal::from(receipt));
        for op in &ops {
            let before = q;
            match apply_op(&mut q, op) {
                Ok(()) => prop_assert!(q.invariant_holds()),
                Err(_) => prop_assert_eq!(q, before), // rejected ops leave no trace
            }
        }
        prop_assert!(q.invariant_holds());
    }

    /// A rejected reservation never partially applies.
    #[test]
    fn oversized_reservation_has_no_effect(
        receipt in 1u32..1000,
        extra in 1u32..1000,
    ) {
        let mut q = LotQuantities::on_receipt(Decimal::from(receipt));
        let before = q;
        let result = q.reserve(Decimal::from(receipt + extra));
        let is_insufficient_stock = matches!(result, Err(LedgerError::InsufficientStock { .. }));
        prop_assert!(is_insufficient_stock);
        prop_assert_eq!(q, before);
    }

    /// Reserve then release of the same quantity is a round trip.
    #[test]
    fn reserve_release_round_trip(
        receipt in 2u32..2000,
        portion in 1u32..2000,
    ) {
        prop_assume!(portion < receipt);
        let mut q = LotQuantities::on_receipt(Decimal::from(receipt));
        q.reserve(Decimal::from(portion)).unwrap();
        q.release(Decimal::from(portion)).unwrap();
        prop_assert_eq!(q, LotQuantities::on_receipt(Decimal::from(receipt)));
    }

    /// Allocation draws never exceed a lot's remaining quantity and always
    /// sum to exactly the requested amount.
    #[test]
    fn allocation_draws_are_exact_and_bounded(
        remainings in prop::collection::vec(1u32..300, 1..8),
        requested in 1u32..600,
    ) {
        let available: u32 = remainings.iter().sum();
        let candidates: Vec<LotCandidate> = remainings
            .iter()
            .enumerate()
            .map(|(i, r)| candidate(
                Some(date(2025, 6, 1 + (i as u32 % 28))),
                date(2025, 1, 1 + (i as u32 % 28)),
                &r.to_string(),
            ))
            .collect();

        match plan_allocation(&candidates, Decimal::from(requested)) {
            Ok(draws) => {
                prop_assert!(requested <= available);
                let drawn: Decimal = draws.iter().map(|d| d.quantity).sum();
                prop_assert_eq!(drawn, Decimal::from(requested));
                for draw in &draws {
                    let lot = candidates.iter().find(|c| c.lot_id == draw.lot_id).unwrap();
                    prop_assert!(draw.quantity <= lot.remaining);
                    prop_assert!(draw.quantity > Decimal::ZERO);
                }
            }
            Err(AllocationError::Shortfall { available: avail, .. }) => {
                prop_assert!(requested > available);
                prop_assert_eq!(avail, Decimal::from(available));
            }
            Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
        }
    }

    /// Every draw except the last fully exhausts its lot, which is what
    /// first-expired-first-out means operationally.
    #[test]
    fn allocation_exhausts_earlier_lots_first(
        remainings in prop::collection::vec(1u32..200, 2..6),
    ) {
        let available: u32 = remainings.iter().sum();
        let candidates: Vec<LotCandidate> = remainings
            .iter()
            .enumerate()
            .map(|(i, r)| candidate(
                Some(date(2025, 3, 1 + i as u32)),
                date(2025, 1, 1),
                &r.to_string(),
            ))
            .collect();

        let draws = plan_allocation(&candidates, Decimal::from(available)).unwrap();
        for draw in &draws[..draws.len() - 1] {
            let lot = candidates.iter().find(|c| c.lot_id == draw.lot_id).unwrap();
            prop_assert_eq!(draw.quantity, lot.remaining);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn allocation_prefers_earliest_expiry() {
    let soon = candidate(Some(date(2025, 4, 1)), date(2025, 2, 1), "100");
    let later = candidate(Some(date(2025, 9, 1)), date(2025, 1, 1), "100");
    let draws = plan_allocation(&[later.clone(), soon.clone()], dec("50")).unwrap();

    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].lot_id, soon.lot_id);
    assert_eq!(draws[0].quantity, dec("50"));
}

#[test]
fn allocation_spills_into_the_next_lot() {
    let first = candidate(Some(date(2025, 4, 1)), date(2025, 2, 1), "60");
    let second = candidate(Some(date(2025, 5, 1)), date(2025, 2, 1), "60");
    let draws = plan_allocation(&[second.clone(), first.clone()], dec("90")).unwrap();

    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].lot_id, first.lot_id);
    assert_eq!(draws[0].quantity, dec("60"));
    assert_eq!(draws[1].lot_id, second.lot_id);
    assert_eq!(draws[1].quantity, dec("30"));
}

#[test]
fn undated_lots_are_drawn_last() {
    let undated = candidate(None, date(2024, 1, 1), "100");
    let dated = candidate(Some(date(2026, 1, 1)), date(2025, 6, 1), "40");
    let draws = plan_allocation(&[undated.clone(), dated.clone()], dec("70")).unwrap();

    assert_eq!(draws[0].lot_id, dated.lot_id);
    assert_eq!(draws[0].quantity, dec("40"));
    assert_eq!(draws[1].lot_id, undated.lot_id);
    assert_eq!(draws[1].quantity, dec("30"));
}

#[test]
fn shortfall_across_all_lots_plans_nothing() {
    let a = candidate(Some(date(2025, 4, 1)), date(2025, 2, 1), "30");
    let b = candidate(Some(date(2025, 5, 1)), date(2025, 2, 1), "30");
    let err = plan_allocation(&[a, b], dec("100")).unwrap_err();

    assert_eq!(
        err,
        AllocationError::Shortfall {
            requested: dec("100"),
            available: dec("60"),
        }
    );
}

#[test]
fn consuming_everything_depletes_the_lot() {
    let mut q = LotQuantities::on_receipt(dec("80"));
    q.reserve(dec("80")).unwrap();
    assert_eq!(q.derived_status(), MaterialBatchStatus::Reserved);
    q.consume(dec("80")).unwrap();
    assert_eq!(q.derived_status(), MaterialBatchStatus::Depleted);
    assert_eq!(q.used, dec("80"));
}

#[test]
fn release_beyond_reserved_is_rejected_loudly() {
    let mut q = LotQuantities::on_receipt(dec("50"));
    q.reserve(dec("20")).unwrap();
    let err = q.release(dec("25")).unwrap_err();
    assert!(matches!(err, LedgerError::InvariantViolation(_)));
    // nothing moved
    assert_eq!(q.reserved, dec("20"));
    assert_eq!(q.remaining, dec("30"));
}

#[test]
fn fractional_quantities_balance_exactly() {
    let mut q = LotQuantities::on_receipt(dec("10.5"));
    q.reserve(dec("3.25")).unwrap();
    q.consume(dec("1.75")).unwrap();
    q.adjust(dec("-0.5")).unwrap();
    assert!(q.invariant_holds());
    assert_eq!(q.remaining, dec("6.75"));
    assert_eq!(q.reserved, dec("1.5"));
    assert_eq!(q.used, dec("1.75"));
}

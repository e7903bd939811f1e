//! End-to-end lifecycle scenarios over the pure domain logic
//!
//! Each test walks one production batch story through allocation planning,
//! lot accounting, the transition table and the cost roll-up, asserting the
//! observable outcome at every step.

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::{
    calculate_costs, plan_allocation, AllocationError, BatchEquipmentUsage, LotCandidate,
    LotQuantities, MaterialConsumption, ProductionAction, ProductionStatus,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn start_and_complete_draws_stock_and_costs_the_output() {
    // One lot of 100 units at 2.50 each
    let lot_id = Uuid::new_v4();
    let unit_price = dec("2.5");
    let mut lot = LotQuantities::on_receipt(dec("100"));
    let candidates = [LotCandidate {
        lot_id,
        expire_date: Some(date(2025, 12, 1)),
        receipt_date: date(2025, 1, 10),
        remaining: lot.remaining,
    }];

    // start: plan 40 units and reserve them
    let mut status = ProductionStatus::Draft;
    let draws = plan_allocation(&candidates, dec("40")).unwrap();
    assert_eq!(draws.len(), 1);
    lot.reserve(draws[0].quantity).unwrap();
    status = status.apply(ProductionAction::Start).unwrap();

    assert_eq!(lot.remaining, dec("60"));
    assert_eq!(lot.reserved, dec("40"));
    assert!(lot.invariant_holds());

    // complete with 38 actual, 35 good, 3 defect
    lot.consume(dec("40")).unwrap();
    status = status.apply(ProductionAction::Complete).unwrap();

    assert_eq!(lot.reserved, Decimal::ZERO);
    assert_eq!(lot.used, dec("40"));
    assert!(lot.invariant_holds());
    assert_eq!(status, ProductionStatus::Completed);

    // one consumption row at the captured price, plus equipment
    let batch_id = Uuid::new_v4();
    let consumption = MaterialConsumption {
        id: Uuid::new_v4(),
        production_batch_id: batch_id,
        material_batch_id: lot_id,
        quantity_consumed: dec("40"),
        unit_cost_at_consumption: unit_price,
        consumed_at: Utc::now(),
    };
    let equipment = BatchEquipmentUsage {
        id: Uuid::new_v4(),
        production_batch_id: batch_id,
        equipment_id: Uuid::new_v4(),
        start_time: Utc::now(),
        end_time: None,
        usage_hours: Some(dec("4")),
        equipment_cost: dec("25"),
    };

    let breakdown = calculate_costs(
        &[consumption],
        &[equipment],
        Decimal::ZERO,
        Some(dec("35")),
    );
    assert_eq!(breakdown.material_cost, dec("100")); // 40 * 2.5
    assert_eq!(breakdown.total_cost, dec("125"));
    assert_eq!(breakdown.unit_cost, Some(dec("125") / dec("35")));
}

#[test]
fn oversized_start_fails_and_leaves_the_lot_untouched() {
    let lot_id = Uuid::new_v4();
    let lot = LotQuantities::on_receipt(dec("100"));
    let candidates = [LotCandidate {
        lot_id,
        expire_date: None,
        receipt_date: date(2025, 1, 10),
        remaining: lot.remaining,
    }];

    let err = plan_allocation(&candidates, dec("150")).unwrap_err();
    assert_eq!(
        err,
        AllocationError::Shortfall {
            requested: dec("150"),
            available: dec("100"),
        }
    );

    // nothing was planned, so nothing was reserved
    assert_eq!(lot.remaining, dec("100"));
    assert_eq!(lot.reserved, Decimal::ZERO);
}

#[test]
fn cancel_returns_every_reserved_unit() {
    let mut first = LotQuantities::on_receipt(dec("30"));
    let mut second = LotQuantities::on_receipt(dec("50"));

    // start reserves across both lots
    first.reserve(dec("30")).unwrap();
    second.reserve(dec("25")).unwrap();
    let mut status = ProductionStatus::Draft
        .apply(ProductionAction::Start)
        .unwrap();

    // cancel flips the batch, then every reservation is released
    status = status.apply(ProductionAction::Cancel).unwrap();
    first.release(dec("30")).unwrap();
    second.release(dec("25")).unwrap();

    assert_eq!(first, LotQuantities::on_receipt(dec("30")));
    assert_eq!(second, LotQuantities::on_receipt(dec("50")));
    assert_eq!(status, ProductionStatus::Cancelled);
    assert!(status.apply(ProductionAction::Start).is_err()); // stays cancelled
}

proptest! {
    /// Whatever was reserved at start is either fully consumed (complete)
    /// or fully released (cancel); the lot balance holds either way and
    /// remaining + used accounts for the whole receipt.
    #[test]
    fn settlement_conserves_the_receipt(
        receipt in 10u32..1000,
        portion in 1u32..1000,
        complete in any::<bool>(),
    ) {
        prop_assume!(portion <= receipt);
        let receipt = Decimal::from(receipt);
        let portion = Decimal::from(portion);

        let mut lot = LotQuantities::on_receipt(receipt);
        lot.reserve(portion).unwrap();

        if complete {
            lot.consume(portion).unwrap();
            prop_assert_eq!(lot.used, portion);
            prop_assert_eq!(lot.remaining, receipt - portion);
        } else {
            lot.release(portion).unwrap();
            prop_assert_eq!(lot, LotQuantities::on_receipt(receipt));
        }
        prop_assert!(lot.invariant_holds());
        prop_assert_eq!(lot.reserved, Decimal::ZERO);
    }
}

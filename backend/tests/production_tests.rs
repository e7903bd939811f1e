//! Production batch lifecycle tests
//!
//! Property-based and unit tests for:
//! - The status transition table
//! - Terminal statuses being absorbing
//! - Completion output validation

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use shared::{validate_output_quantities, ProductionAction, ProductionStatus};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Property Test Strategies
// ============================================================================

fn action_strategy() -> impl Strategy<Value = ProductionAction> {
    prop_oneof![
        Just(ProductionAction::Start),
        Just(ProductionAction::Pause),
        Just(ProductionAction::Resume),
        Just(ProductionAction::Complete),
        Just(ProductionAction::Cancel),
    ]
}

fn status_strategy() -> impl Strategy<Value = ProductionStatus> {
    prop_oneof![
        Just(ProductionStatus::Draft),
        Just(ProductionStatus::InProgress),
        Just(ProductionStatus::Paused),
        Just(ProductionStatus::Completed),
        Just(ProductionStatus::Cancelled),
    ]
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    /// Applying any action sequence from draft only ever lands on statuses
    /// the lifecycle defines, and a rejected action leaves the status put.
    #[test]
    fn lifecycle_never_leaves_the_defined_statuses(
        actions in prop::collection::vec(action_strategy(), 0..25),
    ) {
        let mut status = ProductionStatus::Draft;
        for action in actions {
            match status.apply(action) {
                Ok(next) => status = next,
                Err(err) => {
                    prop_assert_eq!(err.from, status);
                    prop_assert_eq!(err.action, action);
                }
            }
            // round-trips through its text form intact
            let parsed: ProductionStatus = status.as_str().parse().unwrap();
            prop_assert_eq!(parsed, status);
        }
    }

    /// Terminal statuses reject every action.
    #[test]
    fn terminal_statuses_are_absorbing(
        action in action_strategy(),
    ) {
        for terminal in [ProductionStatus::Completed, ProductionStatus::Cancelled] {
            prop_assert!(terminal.apply(action).is_err());
        }
    }

    /// A transition is legal from at most one precondition per action;
    /// resume in particular is only legal from paused.
    #[test]
    fn resume_requires_paused(status in status_strategy()) {
        let legal = status.apply(ProductionAction::Resume).is_ok();
        prop_assert_eq!(legal, status == ProductionStatus::Paused);
    }

    /// Start is only legal from draft.
    #[test]
    fn start_requires_draft(status in status_strategy()) {
        let legal = status.apply(ProductionAction::Start).is_ok();
        prop_assert_eq!(legal, status == ProductionStatus::Draft);
    }

    /// Output validation accepts exactly the splits where good + defect
    /// stays within actual.
    #[test]
    fn output_split_must_fit_within_actual(
        actual in 0u32..1000,
        good in 0u32..1000,
        defect in 0u32..1000,
    ) {
        let result = validate_output_quantities(
            Decimal::from(actual),
            Decimal::from(good),
            Decimal::from(defect),
        );
        prop_assert_eq!(result.is_ok(), good + defect <= actual);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[test]
fn full_happy_path_reaches_completed() {
    let status = ProductionStatus::Draft
        .apply(ProductionAction::Start)
        .and_then(|s| s.apply(ProductionAction::Pause))
        .and_then(|s| s.apply(ProductionAction::Resume))
        .and_then(|s| s.apply(ProductionAction::Complete))
        .unwrap();
    assert_eq!(status, ProductionStatus::Completed);
    assert!(status.is_terminal());
}

#[test]
fn paused_batch_can_complete_directly() {
    let status = ProductionStatus::Paused
        .apply(ProductionAction::Complete)
        .unwrap();
    assert_eq!(status, ProductionStatus::Completed);
}

#[test]
fn cancel_is_legal_from_every_active_status() {
    for from in [
        ProductionStatus::Draft,
        ProductionStatus::InProgress,
        ProductionStatus::Paused,
    ] {
        assert_eq!(
            from.apply(ProductionAction::Cancel).unwrap(),
            ProductionStatus::Cancelled
        );
    }
}

#[test]
fn completed_batch_cannot_be_cancelled() {
    let err = ProductionStatus::Completed
        .apply(ProductionAction::Cancel)
        .unwrap_err();
    assert_eq!(err.from, ProductionStatus::Completed);
    assert_eq!(err.action, ProductionAction::Cancel);
}

#[test]
fn negative_outputs_are_rejected() {
    assert!(validate_output_quantities(dec("10"), dec("-1"), dec("2")).is_err());
    assert!(validate_output_quantities(dec("-10"), dec("1"), dec("2")).is_err());
}

#[test]
fn exact_output_split_is_accepted() {
    assert!(validate_output_quantities(dec("38"), dec("35"), dec("3")).is_ok());
}

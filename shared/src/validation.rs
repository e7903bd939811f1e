//! Validation helpers shared by the backend services

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Validate a strictly positive quantity
pub fn validate_positive_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a lot receipt: expiry, when present, must be after the receipt date
pub fn validate_receipt_dates(
    receipt_date: NaiveDate,
    expire_date: Option<NaiveDate>,
) -> Result<(), &'static str> {
    if let Some(expire) = expire_date {
        if expire <= receipt_date {
            return Err("Expire date must be after receipt date");
        }
    }
    Ok(())
}

/// Validate completion output quantities: good + defect must not exceed actual
pub fn validate_output_quantities(
    actual: Decimal,
    good: Decimal,
    defect: Decimal,
) -> Result<(), &'static str> {
    if actual < Decimal::ZERO || good < Decimal::ZERO || defect < Decimal::ZERO {
        return Err("Output quantities cannot be negative");
    }
    if good + defect > actual {
        return Err("Good plus defect quantity cannot exceed actual quantity");
    }
    Ok(())
}

/// Pause and cancel reasons must carry actual content
pub fn validate_reason(reason: &str) -> Result<(), &'static str> {
    if reason.trim().is_empty() {
        return Err("A reason is required");
    }
    Ok(())
}

/// Whether a lot expires within `days` from `today` (drives low-stock and
/// expiry views, not the ledger write path)
pub fn expires_within(expire_date: Option<NaiveDate>, today: NaiveDate, days: i64) -> bool {
    match expire_date {
        Some(expire) => expire >= today && (expire - today).num_days() <= days,
        None => false,
    }
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

    #[test]
    fn output_quantities_must_reconcile() {
        assert!(validate_output_quantities(dec("38"), dec("35"), dec("3")).is_ok());
        assert!(validate_output_quantities(dec("38"), dec("36"), dec("3")).is_err());
        assert!(validate_output_quantities(dec("38"), dec("-1"), dec("3")).is_err());
    }

    #[test]
    fn expiry_must_follow_receipt() {
        assert!(validate_receipt_dates(date(2025, 1, 1), Some(date(2025, 6, 1))).is_ok());
        assert!(validate_receipt_dates(date(2025, 1, 1), Some(date(2025, 1, 1))).is_err());
        assert!(validate_receipt_dates(date(2025, 1, 1), None).is_ok());
    }

    #[test]
    fn blank_reasons_rejected() {
        assert!(validate_reason("equipment failure").is_ok());
        assert!(validate_reason("   ").is_err());
    }

    #[test]
    fn expiry_window_check() {
        let today = date(2025, 3, 1);
        assert!(expires_within(Some(date(2025, 3, 5)), today, 7));
        assert!(!expires_within(Some(date(2025, 4, 1)), today, 7));
        assert!(!expires_within(Some(date(2025, 2, 1)), today, 7));
        assert!(!expires_within(None, today, 7));
    }
}

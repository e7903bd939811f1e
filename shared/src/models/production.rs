//! Production batch model and status transition table
//!
//! All status checks go through [`ProductionStatus::apply`]; there is no
//! other place where a transition is judged legal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Status of a production batch
///
/// `Completed` and `Cancelled` are terminal and retained forever for
/// traceability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductionStatus {
    Draft,
    InProgress,
    Paused,
    Completed,
    Cancelled,
}

/// Operations a caller can request on a production batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductionAction {
    Start,
    Pause,
    Resume,
    Complete,
    Cancel,
}

/// A transition was requested from a status that does not allow it
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} a batch in status {from}")]
pub struct InvalidTransition {
    pub from: ProductionStatus,
    pub action: ProductionAction,
}

impl ProductionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductionStatus::Draft => "draft",
            ProductionStatus::InProgress => "in_progress",
            ProductionStatus::Paused => "paused",
            ProductionStatus::Completed => "completed",
            ProductionStatus::Cancelled => "cancelled",
        }
    }

    /// No further transition is permitted from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProductionStatus::Completed | ProductionStatus::Cancelled
        )
    }

    /// The single transition table
    ///
    /// Returns the target status, or `InvalidTransition` when the action
    /// is not legal from `self`.
    pub fn apply(self, action: ProductionAction) -> Result<ProductionStatus, InvalidTransition> {
        use ProductionAction::*;
        use ProductionStatus::*;

        let to = match (self, action) {
            (Draft, Start) => InProgress,
            (InProgress, Pause) => Paused,
            (Paused, Resume) => InProgress,
            (InProgress, Complete) | (Paused, Complete) => Completed,
            (Draft, Cancel) | (InProgress, Cancel) | (Paused, Cancel) => Cancelled,
            (from, action) => return Err(InvalidTransition { from, action }),
        };
        Ok(to)
    }
}

impl std::str::FromStr for ProductionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProductionStatus::Draft),
            "in_progress" => Ok(ProductionStatus::InProgress),
            "paused" => Ok(ProductionStatus::Paused),
            "completed" => Ok(ProductionStatus::Completed),
            "cancelled" => Ok(ProductionStatus::Cancelled),
            other => Err(format!("unknown production status: {}", other)),
        }
    }
}

impl std::fmt::Display for ProductionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for ProductionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProductionAction::Start => "start",
            ProductionAction::Pause => "pause",
            ProductionAction::Resume => "resume",
            ProductionAction::Complete => "complete",
            ProductionAction::Cancel => "cancel",
        };
        write!(f, "{}", s)
    }
}

/// A production batch and its recorded outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionBatch {
    pub id: Uuid,
    pub factory_id: Uuid,
    /// Unique per factory (e.g. "PB-2025-0001")
    pub batch_number: String,
    pub product_type: String,
    pub planned_quantity: Option<Decimal>,
    pub status: ProductionStatus,
    pub supervisor_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub pause_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub actual_quantity: Option<Decimal>,
    pub good_quantity: Option<Decimal>,
    pub defect_quantity: Option<Decimal>,
    pub labor_cost: Decimal,
    pub total_cost: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProductionAction::*;
    use ProductionStatus::*;

    #[test]
    fn legal_lifecycle_paths() {
        assert_eq!(Draft.apply(Start).unwrap(), InProgress);
        assert_eq!(InProgress.apply(Pause).unwrap(), Paused);
        assert_eq!(Paused.apply(Resume).unwrap(), InProgress);
        assert_eq!(InProgress.apply(Complete).unwrap(), Completed);
        assert_eq!(Paused.apply(Complete).unwrap(), Completed);
        assert_eq!(Draft.apply(Cancel).unwrap(), Cancelled);
        assert_eq!(InProgress.apply(Cancel).unwrap(), Cancelled);
        assert_eq!(Paused.apply(Cancel).unwrap(), Cancelled);
    }

    #[test]
    fn terminal_statuses_reject_everything() {
        for terminal in [Completed, Cancelled] {
            assert!(terminal.is_terminal());
            for action in [Start, Pause, Resume, Complete, Cancel] {
                let err = terminal.apply(action).unwrap_err();
                assert_eq!(err.from, terminal);
                assert_eq!(err.action, action);
            }
        }
    }

    #[test]
    fn draft_only_starts_or_cancels() {
        assert!(Draft.apply(Pause).is_err());
        assert!(Draft.apply(Resume).is_err());
        assert!(Draft.apply(Complete).is_err());
    }

    #[test]
    fn resume_only_from_paused() {
        assert!(InProgress.apply(Resume).is_err());
        assert!(InProgress.apply(Start).is_err());
        assert!(Paused.apply(Start).is_err());
        assert!(Paused.apply(Pause).is_err());
    }
}

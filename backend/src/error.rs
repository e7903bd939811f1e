//! Error handling for the AIMS processing backend
//!
//! Business errors carry bilingual messages (English/Chinese) and leave all
//! entities unchanged. Invariant violations are logged with full context but
//! surface as a generic failure.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use shared::{AllocationError, LedgerError};

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_zh: String,
    },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Insufficient stock of {material}: requested {requested}, available {available}")]
    InsufficientStock {
        material: String,
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    // Concurrency loss on a compare-and-set transition; caller may retry
    #[error("Transition conflict: {0}")]
    TransitionConflict(String),

    // Fatal: the ledger balance would be broken. Aborts the enclosing
    // transaction, never auto-corrected.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Map a pure ledger error, naming the lot it concerns
    pub fn from_ledger(err: LedgerError, lot: &str) -> Self {
        match err {
            LedgerError::InsufficientStock {
                requested,
                available,
            } => AppError::InsufficientStock {
                material: lot.to_string(),
                requested,
                available,
            },
            LedgerError::LotNotAvailable { status } => AppError::Validation {
                field: "material_batch_id".to_string(),
                message: format!("Lot {} is not available (status: {})", lot, status),
                message_zh: format!("批次 {} 不可用（状态：{}）", lot, status),
            },
            LedgerError::NonPositiveQuantity(qty) => AppError::Validation {
                field: "quantity".to_string(),
                message: format!("Quantity must be positive, got {}", qty),
                message_zh: format!("数量必须为正数，当前为 {}", qty),
            },
            LedgerError::InvariantViolation(detail) => {
                AppError::InvariantViolation(format!("lot {}: {}", lot, detail))
            }
        }
    }

    /// Map a planning error, naming the material type it concerns
    pub fn from_allocation(err: AllocationError, material: &str) -> Self {
        match err {
            AllocationError::Shortfall {
                requested,
                available,
            } => AppError::InsufficientStock {
                material: material.to_string(),
                requested,
                available,
            },
            AllocationError::NonPositiveQuantity(qty) => AppError::Validation {
                field: "quantity".to_string(),
                message: format!("Required quantity must be positive, got {}", qty),
                message_zh: format!("需求数量必须为正数，当前为 {}", qty),
            },
        }
    }
}

impl From<shared::InvalidTransition> for AppError {
    fn from(err: shared::InvalidTransition) -> Self {
        AppError::InvalidTransition(err.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_zh: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation {
                field,
                message,
                message_zh,
            } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: message.clone(),
                    message_zh: message_zh.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::DuplicateEntry(field) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "DUPLICATE_ENTRY".to_string(),
                    message_en: format!("A record with this {} already exists", field),
                    message_zh: format!("该{}已存在", field),
                    field: Some(field.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message_en: format!("{} not found", resource),
                    message_zh: format!("未找到{}", resource),
                    field: None,
                },
            ),
            AppError::InsufficientStock {
                material,
                requested,
                available,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INSUFFICIENT_STOCK".to_string(),
                    message_en: format!(
                        "Insufficient stock of {}: requested {}, available {}",
                        material, requested, available
                    ),
                    message_zh: format!(
                        "{} 库存不足：需求 {}，可用 {}",
                        material, requested, available
                    ),
                    field: None,
                },
            ),
            AppError::InvalidTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INVALID_TRANSITION".to_string(),
                    message_en: msg.clone(),
                    message_zh: format!("无法执行状态变更：{}", msg),
                    field: None,
                },
            ),
            AppError::TransitionConflict(msg) => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "TRANSITION_CONFLICT".to_string(),
                    message_en: format!("Concurrent transition won: {}", msg),
                    message_zh: format!("状态已被并发操作变更：{}", msg),
                    field: None,
                },
            ),
            // Never expose the broken balance to the caller
            AppError::InvariantViolation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: "An internal error occurred".to_string(),
                    message_zh: "服务器内部错误".to_string(),
                    field: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message_en: "A database error occurred".to_string(),
                    message_zh: "数据库错误".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: msg.clone(),
                    message_zh: "服务器内部错误".to_string(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message_en: "An internal server error occurred".to_string(),
                    message_zh: "服务器内部错误".to_string(),
                    field: None,
                },
            ),
        };

        match &self {
            AppError::InvariantViolation(detail) => {
                tracing::error!(detail = %detail, "ledger invariant violated");
            }
            other => {
                tracing::error!("Error: {:?}", other);
            }
        }

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

//! Material ledger handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::material_ledger::{
    AdjustMaterialInput, CreateMaterialReceiptInput, ListMaterialsQuery, LowStockEntry,
    MaterialLedgerService,
};
use crate::AppState;
use shared::{MaterialBatch, MaterialBatchAdjustment, PaginatedResponse};

/// POST /materials - record the receipt of a new lot
pub async fn create_material_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateMaterialReceiptInput>,
) -> AppResult<(StatusCode, Json<MaterialBatch>)> {
    let service = MaterialLedgerService::new(state.db.clone());
    let lot = service
        .create_receipt(user.factory_id, user.user_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

/// GET /materials - list lots with optional status and type filters
pub async fn list_materials(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListMaterialsQuery>,
) -> AppResult<Json<PaginatedResponse<MaterialBatch>>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let page = service.list_materials(user.factory_id, query).await?;
    Ok(Json(page))
}

/// GET /materials/:id
pub async fn get_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MaterialBatch>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let lot = service.get_material(user.factory_id, id).await?;
    Ok(Json(lot))
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: Decimal,
}

/// POST /materials/:id/reserve - earmark stock on one lot
pub async fn reserve_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuantityRequest>,
) -> AppResult<Json<MaterialBatch>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let lot = service
        .reserve(user.factory_id, id, payload.quantity)
        .await?;
    Ok(Json(lot))
}

/// POST /materials/:id/release - return earmarked stock
pub async fn release_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuantityRequest>,
) -> AppResult<Json<MaterialBatch>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let lot = service
        .release(user.factory_id, id, payload.quantity)
        .await?;
    Ok(Json(lot))
}

/// POST /materials/:id/consume - convert earmarked stock into a draw
pub async fn consume_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuantityRequest>,
) -> AppResult<Json<MaterialBatch>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let lot = service
        .consume(user.factory_id, id, payload.quantity)
        .await?;
    Ok(Json(lot))
}

/// POST /materials/:id/adjust - audited manual correction
pub async fn adjust_material(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustMaterialInput>,
) -> AppResult<Json<MaterialBatch>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let lot = service
        .adjust(user.factory_id, id, user.user_id, payload)
        .await?;
    Ok(Json(lot))
}

/// GET /materials/:id/adjustments - correction audit trail for a lot
pub async fn list_adjustments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<MaterialBatchAdjustment>>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let adjustments = service.adjustments(user.factory_id, id).await?;
    Ok(Json(adjustments))
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<Decimal>,
}

/// GET /materials/low-stock
pub async fn low_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<Vec<LowStockEntry>>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let threshold = query.threshold.unwrap_or_else(|| Decimal::from(10));
    let entries = service.low_stock(user.factory_id, threshold).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
}

/// GET /materials/expiring - lots expiring soon that still hold stock
pub async fn expiring_materials(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ExpiringQuery>,
) -> AppResult<Json<Vec<MaterialBatch>>> {
    let service = MaterialLedgerService::new(state.db.clone());
    let lots = service
        .expiring(user.factory_id, query.days.unwrap_or(7))
        .await?;
    Ok(Json(lots))
}

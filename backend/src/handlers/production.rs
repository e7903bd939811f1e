//! Production batch lifecycle handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::cost::{CostAnalysis, CostService, RecordEquipmentUsageInput};
use crate::services::material_ledger::MaterialLedgerService;
use crate::services::production::{
    CancelProductionInput, CompleteProductionInput, CreateProductionBatchInput,
    ListProductionQuery, PauseProductionInput, ProductionService, StartProductionInput,
    TimelineEvent,
};
use crate::services::ConsumptionRecorder;
use crate::AppState;
use shared::{
    BatchEquipmentUsage, CostBreakdown, MaterialConsumption, MaterialReservation,
    PaginatedResponse, ProductionBatch, ReservationState,
};

/// POST /production/batches - create a draft batch
pub async fn create_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<CreateProductionBatchInput>,
) -> AppResult<(StatusCode, Json<ProductionBatch>)> {
    let service = ProductionService::new(state.db.clone());
    let batch = service.create_batch(user.factory_id, payload).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// GET /production/batches
pub async fn list_batches(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListProductionQuery>,
) -> AppResult<Json<PaginatedResponse<ProductionBatch>>> {
    let service = ProductionService::new(state.db.clone());
    let page = service.list_batches(user.factory_id, query).await?;
    Ok(Json(page))
}

/// GET /production/batches/:id
pub async fn get_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductionBatch>> {
    let service = ProductionService::new(state.db.clone());
    let batch = service.get_batch(user.factory_id, id).await?;
    Ok(Json(batch))
}

/// POST /production/batches/:id/start
pub async fn start_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartProductionInput>,
) -> AppResult<Json<ProductionBatch>> {
    let service = ProductionService::new(state.db.clone());
    let batch = service.start(user.factory_id, id, payload).await?;
    Ok(Json(batch))
}

/// POST /production/batches/:id/pause
pub async fn pause_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<PauseProductionInput>,
) -> AppResult<Json<ProductionBatch>> {
    let service = ProductionService::new(state.db.clone());
    let batch = service.pause(user.factory_id, id, payload).await?;
    Ok(Json(batch))
}

/// POST /production/batches/:id/resume
pub async fn resume_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductionBatch>> {
    let service = ProductionService::new(state.db.clone());
    let batch = service.resume(user.factory_id, id).await?;
    Ok(Json(batch))
}

/// POST /production/batches/:id/complete
pub async fn complete_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteProductionInput>,
) -> AppResult<Json<ProductionBatch>> {
    let service = ProductionService::new(state.db.clone());
    let batch = service.complete(user.factory_id, id, payload).await?;
    Ok(Json(batch))
}

/// POST /production/batches/:id/cancel
pub async fn cancel_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelProductionInput>,
) -> AppResult<Json<ProductionBatch>> {
    let service = ProductionService::new(state.db.clone());
    let batch = service.cancel(user.factory_id, id, payload).await?;
    Ok(Json(batch))
}

/// GET /production/batches/:id/timeline
pub async fn batch_timeline(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<TimelineEvent>>> {
    let service = ProductionService::new(state.db.clone());
    let events = service.timeline(user.factory_id, id).await?;
    Ok(Json(events))
}

/// GET /production/batches/:id/materials - the batch's open reservations
pub async fn batch_materials(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<MaterialReservation>>> {
    let production = ProductionService::new(state.db.clone());
    // Ensure the batch exists and belongs to the caller's factory
    production.get_batch(user.factory_id, id).await?;

    let ledger = MaterialLedgerService::new(state.db.clone());
    let reservations = ledger
        .reservations_in_state(id, ReservationState::Open)
        .await?;
    Ok(Json(reservations))
}

/// GET /production/batches/:id/material-consumption
pub async fn batch_consumption(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<MaterialConsumption>>> {
    let production = ProductionService::new(state.db.clone());
    production.get_batch(user.factory_id, id).await?;

    let recorder = ConsumptionRecorder::new(state.db.clone());
    let consumptions = recorder.consumptions(id).await?;
    Ok(Json(consumptions))
}

/// GET /production/batches/:id/cost-analysis
pub async fn batch_cost_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CostAnalysis>> {
    let service = CostService::new(state.db.clone());
    let analysis = service.cost_analysis(user.factory_id, id).await?;
    Ok(Json(analysis))
}

/// POST /production/batches/:id/recalculate-cost
pub async fn recalculate_cost(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CostBreakdown>> {
    let service = CostService::new(state.db.clone());
    let breakdown = service.recalculate(user.factory_id, id).await?;
    Ok(Json(breakdown))
}

/// POST /production/batches/:id/equipment-usage
pub async fn record_equipment_usage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordEquipmentUsageInput>,
) -> AppResult<(StatusCode, Json<BatchEquipmentUsage>)> {
    let service = CostService::new(state.db.clone());
    let usage = service
        .record_equipment_usage(user.factory_id, id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(usage)))
}

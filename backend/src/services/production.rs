//! Production batch lifecycle
//!
//! Transitions are judged by the shared transition table, then applied
//! while a row lock on the batch is held (`FOR NO KEY UPDATE`, so child
//! rows referencing the batch can still be inserted from the ledger's
//! own transactions). Ledger settlement runs under that lock, before the
//! status flips; two transitions on the same batch are strictly
//! serialized and the one arriving second fails its precheck instead of
//! interleaving with the first. The status guard on the final update
//! stays as a backstop and maps to a conflict if it ever misses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::consumption::ConsumptionRecorder;
use crate::services::cost::CostService;
use crate::services::material_ledger::MaterialLedgerService;
use shared::{
    calculate_costs, MaterialRequirement, Pagination, PaginatedResponse, PaginationMeta,
    ProductionAction, ProductionBatch, ProductionStatus,
};

/// Service driving the production batch lifecycle
#[derive(Clone)]
pub struct ProductionService {
    db: PgPool,
    ledger: MaterialLedgerService,
    recorder: ConsumptionRecorder,
    costs: CostService,
}

#[derive(Debug, sqlx::FromRow)]
struct ProductionBatchRow {
    id: Uuid,
    factory_id: Uuid,
    batch_number: String,
    product_type: String,
    planned_quantity: Option<Decimal>,
    status: String,
    supervisor_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    pause_reason: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    actual_quantity: Option<Decimal>,
    good_quantity: Option<Decimal>,
    defect_quantity: Option<Decimal>,
    labor_cost: Decimal,
    total_cost: Option<Decimal>,
    unit_cost: Option<Decimal>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductionBatchRow {
    fn into_model(self) -> AppResult<ProductionBatch> {
        let status = ProductionStatus::from_str(&self.status).map_err(AppError::Internal)?;
        Ok(ProductionBatch {
            id: self.id,
            factory_id: self.factory_id,
            batch_number: self.batch_number,
            product_type: self.product_type,
            planned_quantity: self.planned_quantity,
            status,
            supervisor_id: self.supervisor_id,
            started_at: self.started_at,
            paused_at: self.paused_at,
            pause_reason: self.pause_reason,
            completed_at: self.completed_at,
            cancel_reason: self.cancel_reason,
            actual_quantity: self.actual_quantity,
            good_quantity: self.good_quantity,
            defect_quantity: self.defect_quantity,
            labor_cost: self.labor_cost,
            total_cost: self.total_cost,
            unit_cost: self.unit_cost,
            notes: self.notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for creating a production batch (always starts in draft)
#[derive(Debug, Deserialize)]
pub struct CreateProductionBatchInput {
    pub batch_number: String,
    pub product_type: String,
    pub planned_quantity: Option<Decimal>,
    pub labor_cost: Option<Decimal>,
    pub notes: Option<String>,
}

/// Input for starting a batch: who supervises and what it will draw
#[derive(Debug, Deserialize)]
pub struct StartProductionInput {
    pub supervisor_id: Option<Uuid>,
    pub requirements: Vec<MaterialRequirement>,
}

#[derive(Debug, Deserialize)]
pub struct PauseProductionInput {
    pub reason: String,
}

/// Recorded outcome of a completed batch
#[derive(Debug, Deserialize)]
pub struct CompleteProductionInput {
    pub actual_quantity: Decimal,
    pub good_quantity: Decimal,
    pub defect_quantity: Decimal,
    pub labor_cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelProductionInput {
    pub reason: String,
}

/// Filter for listing production batches
#[derive(Debug, Default, Deserialize)]
pub struct ListProductionQuery {
    pub status: Option<ProductionStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// One event in a batch's history, for the timeline view
#[derive(Debug, Serialize)]
pub struct TimelineEvent {
    pub event: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

const PRODUCTION_COLUMNS: &str = "id, factory_id, batch_number, product_type, planned_quantity, \
     status, supervisor_id, started_at, paused_at, pause_reason, completed_at, cancel_reason, \
     actual_quantity, good_quantity, defect_quantity, labor_cost, total_cost, unit_cost, notes, \
     created_at, updated_at";

impl ProductionService {
    pub fn new(db: PgPool) -> Self {
        let ledger = MaterialLedgerService::new(db.clone());
        let recorder = ConsumptionRecorder::new(db.clone());
        let costs = CostService::new(db.clone());
        Self {
            db,
            ledger,
            recorder,
            costs,
        }
    }

    /// Create a new production batch in draft
    pub async fn create_batch(
        &self,
        factory_id: Uuid,
        input: CreateProductionBatchInput,
    ) -> AppResult<ProductionBatch> {
        if input.batch_number.trim().is_empty() {
            return Err(AppError::Validation {
                field: "batch_number".to_string(),
                message: "Batch number is required".to_string(),
                message_zh: "批次号不能为空".to_string(),
            });
        }
        if let Some(planned) = input.planned_quantity {
            shared::validate_positive_quantity(planned).map_err(|msg| AppError::Validation {
                field: "planned_quantity".to_string(),
                message: msg.to_string(),
                message_zh: "计划产量必须为正数".to_string(),
            })?;
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM production_batches WHERE factory_id = $1 AND batch_number = $2)",
        )
        .bind(factory_id)
        .bind(&input.batch_number)
        .fetch_one(&self.db)
        .await?;

        if exists {
            return Err(AppError::DuplicateEntry("batch_number".to_string()));
        }

        let row = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            r#"
            INSERT INTO production_batches (
                factory_id, batch_number, product_type, planned_quantity, labor_cost, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PRODUCTION_COLUMNS
        ))
        .bind(factory_id)
        .bind(&input.batch_number)
        .bind(&input.product_type)
        .bind(input.planned_quantity)
        .bind(input.labor_cost.unwrap_or(Decimal::ZERO))
        .bind(&input.notes)
        .fetch_one(&self.db)
        .await?;

        row.into_model()
    }

    /// Get a production batch by id
    pub async fn get_batch(&self, factory_id: Uuid, batch_id: Uuid) -> AppResult<ProductionBatch> {
        let row = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            "SELECT {} FROM production_batches WHERE id = $1 AND factory_id = $2",
            PRODUCTION_COLUMNS
        ))
        .bind(batch_id)
        .bind(factory_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Production batch".to_string()))?;

        row.into_model()
    }

    /// List production batches for a factory, newest first
    pub async fn list_batches(
        &self,
        factory_id: Uuid,
        query: ListProductionQuery,
    ) -> AppResult<PaginatedResponse<ProductionBatch>> {
        let pagination = Pagination {
            page: query.page.unwrap_or(1),
            per_page: query.per_page.unwrap_or(20),
        };
        let status = query.status.map(|s| s.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM production_batches \
             WHERE factory_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(factory_id)
        .bind(&status)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            "SELECT {} FROM production_batches \
             WHERE factory_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC LIMIT $3 OFFSET $4",
            PRODUCTION_COLUMNS
        ))
        .bind(factory_id)
        .bind(&status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(|r| r.into_model())
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(&pagination, total as u64),
        })
    }

    /// Start a draft batch: reserve its materials, then move to in_progress
    ///
    /// The batch row stays locked from precheck to flip, so no other
    /// transition can interleave with the reservation work. A failed
    /// reservation rolls the lock transaction back with the batch still
    /// in draft; a failed flip gives the reserved stock back.
    pub async fn start(
        &self,
        factory_id: Uuid,
        batch_id: Uuid,
        input: StartProductionInput,
    ) -> AppResult<ProductionBatch> {
        let mut tx = self.db.begin().await?;
        let batch = Self::lock_batch(&mut tx, factory_id, batch_id).await?;
        let observed = batch.status;
        observed.apply(ProductionAction::Start)?;

        self.ledger
            .reserve_for_production(factory_id, batch_id, &input.requirements)
            .await?;

        let flip = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            r#"
            UPDATE production_batches
            SET status = 'in_progress', supervisor_id = $1, started_at = now(),
                updated_at = now()
            WHERE id = $2 AND factory_id = $3 AND status = $4
            RETURNING {}
            "#,
            PRODUCTION_COLUMNS
        ))
        .bind(input.supervisor_id)
        .bind(batch_id)
        .bind(factory_id)
        .bind(observed.as_str())
        .fetch_optional(&mut *tx)
        .await;

        match flip {
            Ok(Some(row)) => {
                tx.commit().await?;
                row.into_model()
            }
            Ok(None) => {
                drop(tx);
                self.ledger
                    .release_for_production(factory_id, batch_id)
                    .await?;
                Err(AppError::TransitionConflict(format!(
                    "batch {} was modified concurrently",
                    batch.batch_number
                )))
            }
            Err(err) => {
                drop(tx);
                self.ledger
                    .release_for_production(factory_id, batch_id)
                    .await?;
                Err(err.into())
            }
        }
    }

    /// Pause an in-progress batch; reservations stay untouched
    pub async fn pause(
        &self,
        factory_id: Uuid,
        batch_id: Uuid,
        input: PauseProductionInput,
    ) -> AppResult<ProductionBatch> {
        shared::validate_reason(&input.reason).map_err(|msg| AppError::Validation {
            field: "reason".to_string(),
            message: msg.to_string(),
            message_zh: "必须填写暂停原因".to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        let batch = Self::lock_batch(&mut tx, factory_id, batch_id).await?;
        let observed = batch.status;
        observed.apply(ProductionAction::Pause)?;

        let row = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            r#"
            UPDATE production_batches
            SET status = 'paused', paused_at = now(), pause_reason = $1, updated_at = now()
            WHERE id = $2 AND factory_id = $3 AND status = $4
            RETURNING {}
            "#,
            PRODUCTION_COLUMNS
        ))
        .bind(input.reason.trim())
        .bind(batch_id)
        .bind(factory_id)
        .bind(observed.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let updated = row.map(|r| r.into_model()).transpose()?.ok_or_else(|| {
            AppError::TransitionConflict(format!(
                "batch {} was modified concurrently",
                batch.batch_number
            ))
        })?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Resume a paused batch
    pub async fn resume(&self, factory_id: Uuid, batch_id: Uuid) -> AppResult<ProductionBatch> {
        let mut tx = self.db.begin().await?;
        let batch = Self::lock_batch(&mut tx, factory_id, batch_id).await?;
        let observed = batch.status;
        observed.apply(ProductionAction::Resume)?;

        let row = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            r#"
            UPDATE production_batches
            SET status = 'in_progress', paused_at = NULL, pause_reason = NULL,
                updated_at = now()
            WHERE id = $1 AND factory_id = $2 AND status = $3
            RETURNING {}
            "#,
            PRODUCTION_COLUMNS
        ))
        .bind(batch_id)
        .bind(factory_id)
        .bind(observed.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let updated = row.map(|r| r.into_model()).transpose()?.ok_or_else(|| {
            AppError::TransitionConflict(format!(
                "batch {} was modified concurrently",
                batch.batch_number
            ))
        })?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Complete a batch: settle its reservations into consumptions, roll
    /// up costs, record the outcome, and flip to completed
    ///
    /// The batch row stays locked through the ledger settlement, so a
    /// concurrent cancel waits and then fails its precheck rather than
    /// releasing stock this path is consuming. Settlement itself commits
    /// per lot and skips already-settled reservations, so a retry after
    /// a crash finishes cleanly without double-drawing stock.
    pub async fn complete(
        &self,
        factory_id: Uuid,
        batch_id: Uuid,
        input: CompleteProductionInput,
    ) -> AppResult<ProductionBatch> {
        shared::validate_output_quantities(
            input.actual_quantity,
            input.good_quantity,
            input.defect_quantity,
        )
        .map_err(|msg| AppError::Validation {
            field: "good_quantity".to_string(),
            message: msg.to_string(),
            message_zh: "产出数量不一致".to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        let batch = Self::lock_batch(&mut tx, factory_id, batch_id).await?;
        let observed = batch.status;
        observed.apply(ProductionAction::Complete)?;

        let consumptions = self.recorder.record_completion(factory_id, batch_id).await?;
        let usages = self.costs.equipment_usages(batch_id).await?;

        let labor_cost = input.labor_cost.unwrap_or(batch.labor_cost);
        let breakdown = calculate_costs(
            &consumptions,
            &usages,
            labor_cost,
            Some(input.good_quantity),
        );

        let row = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            r#"
            UPDATE production_batches
            SET status = 'completed', completed_at = now(),
                actual_quantity = $1, good_quantity = $2, defect_quantity = $3,
                labor_cost = $4, total_cost = $5, unit_cost = $6,
                notes = COALESCE($7, notes), updated_at = now()
            WHERE id = $8 AND factory_id = $9 AND status = $10
            RETURNING {}
            "#,
            PRODUCTION_COLUMNS
        ))
        .bind(input.actual_quantity)
        .bind(input.good_quantity)
        .bind(input.defect_quantity)
        .bind(labor_cost)
        .bind(breakdown.total_cost)
        .bind(breakdown.unit_cost)
        .bind(&input.notes)
        .bind(batch_id)
        .bind(factory_id)
        .bind(observed.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let updated = row.map(|r| r.into_model()).transpose()?.ok_or_else(|| {
            AppError::TransitionConflict(format!(
                "batch {} was modified concurrently",
                batch.batch_number
            ))
        })?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Cancel a batch and return all reserved stock
    ///
    /// Releases run under the batch row lock and before the flip, each in
    /// its own committed transaction. An error midway rolls the flip back
    /// with the batch still active and the remaining reservations open,
    /// so retrying the cancel releases the remainder and then flips.
    pub async fn cancel(
        &self,
        factory_id: Uuid,
        batch_id: Uuid,
        input: CancelProductionInput,
    ) -> AppResult<ProductionBatch> {
        shared::validate_reason(&input.reason).map_err(|msg| AppError::Validation {
            field: "reason".to_string(),
            message: msg.to_string(),
            message_zh: "必须填写取消原因".to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        let batch = Self::lock_batch(&mut tx, factory_id, batch_id).await?;
        let observed = batch.status;
        observed.apply(ProductionAction::Cancel)?;

        self.ledger
            .release_for_production(factory_id, batch_id)
            .await?;

        let row = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            r#"
            UPDATE production_batches
            SET status = 'cancelled', cancel_reason = $1, updated_at = now()
            WHERE id = $2 AND factory_id = $3 AND status = $4
            RETURNING {}
            "#,
            PRODUCTION_COLUMNS
        ))
        .bind(input.reason.trim())
        .bind(batch_id)
        .bind(factory_id)
        .bind(observed.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let cancelled = row.map(|r| r.into_model()).transpose()?.ok_or_else(|| {
            AppError::TransitionConflict(format!(
                "batch {} was modified concurrently",
                batch.batch_number
            ))
        })?;
        tx.commit().await?;
        Ok(cancelled)
    }

    /// Lock the batch row for the duration of the surrounding transaction
    ///
    /// `FOR NO KEY UPDATE` rather than `FOR UPDATE`: reservation and
    /// consumption inserts take a key-share lock on the referenced batch
    /// row from their own connections, and that must not block while the
    /// transition holds this lock.
    async fn lock_batch(
        tx: &mut Transaction<'_, Postgres>,
        factory_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<ProductionBatch> {
        let row = sqlx::query_as::<_, ProductionBatchRow>(&format!(
            "SELECT {} FROM production_batches \
             WHERE id = $1 AND factory_id = $2 FOR NO KEY UPDATE",
            PRODUCTION_COLUMNS
        ))
        .bind(batch_id)
        .bind(factory_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Production batch".to_string()))?;

        row.into_model()
    }

    /// Chronological history of a batch from its own timestamps and the
    /// consumption rows recorded at completion
    pub async fn timeline(
        &self,
        factory_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<Vec<TimelineEvent>> {
        let batch = self.get_batch(factory_id, batch_id).await?;
        let mut events = vec![TimelineEvent {
            event: "created".to_string(),
            at: batch.created_at,
            detail: None,
        }];

        if let Some(at) = batch.started_at {
            events.push(TimelineEvent {
                event: "started".to_string(),
                at,
                detail: batch.supervisor_id.map(|id| format!("supervisor {}", id)),
            });
        }
        if let Some(at) = batch.paused_at {
            events.push(TimelineEvent {
                event: "paused".to_string(),
                at,
                detail: batch.pause_reason.clone(),
            });
        }
        for consumption in self.recorder.consumptions(batch_id).await? {
            events.push(TimelineEvent {
                event: "material_consumed".to_string(),
                at: consumption.consumed_at,
                detail: Some(format!(
                    "lot {} x {}",
                    consumption.material_batch_id, consumption.quantity_consumed
                )),
            });
        }
        if let Some(at) = batch.completed_at {
            events.push(TimelineEvent {
                event: "completed".to_string(),
                at,
                detail: batch.good_quantity.map(|g| format!("good quantity {}", g)),
            });
        }
        if batch.status == ProductionStatus::Cancelled {
            events.push(TimelineEvent {
                event: "cancelled".to_string(),
                at: batch.updated_at,
                detail: batch.cancel_reason.clone(),
            });
        }

        events.sort_by_key(|e| e.at);
        Ok(events)
    }
}

//! Cost roll-up for production batches
//!
//! Cost inputs are audit rows: consumption rows (material), equipment
//! usage rows, and the batch's labor cost. Recalculation re-derives the
//! totals from those rows and overwrites the stored figures, so repeating
//! it with unchanged rows is a no-op.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::consumption::ConsumptionRecorder;
use shared::{calculate_costs, BatchEquipmentUsage, CostBreakdown, MaterialConsumption};

#[derive(Clone)]
pub struct CostService {
    db: PgPool,
    recorder: ConsumptionRecorder,
}

#[derive(Debug, sqlx::FromRow)]
struct EquipmentUsageRow {
    id: Uuid,
    production_batch_id: Uuid,
    equipment_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    usage_hours: Option<Decimal>,
    equipment_cost: Decimal,
}

impl EquipmentUsageRow {
    fn into_model(self) -> BatchEquipmentUsage {
        BatchEquipmentUsage {
            id: self.id,
            production_batch_id: self.production_batch_id,
            equipment_id: self.equipment_id,
            start_time: self.start_time,
            end_time: self.end_time,
            usage_hours: self.usage_hours,
            equipment_cost: self.equipment_cost,
        }
    }
}

/// Input for reporting equipment usage against a batch
#[derive(Debug, Deserialize)]
pub struct RecordEquipmentUsageInput {
    pub equipment_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub usage_hours: Option<Decimal>,
    pub equipment_cost: Option<Decimal>,
}

/// Full cost picture of a batch: the roll-up plus the rows behind it
#[derive(Debug, Serialize)]
pub struct CostAnalysis {
    pub breakdown: CostBreakdown,
    pub consumptions: Vec<MaterialConsumption>,
    pub equipment_usages: Vec<BatchEquipmentUsage>,
}

const USAGE_COLUMNS: &str = "id, production_batch_id, equipment_id, start_time, end_time, \
     usage_hours, equipment_cost";

impl CostService {
    pub fn new(db: PgPool) -> Self {
        let recorder = ConsumptionRecorder::new(db.clone());
        Self { db, recorder }
    }

    /// Re-derive and persist total and unit cost from the current audit rows
    pub async fn recalculate(&self, factory_id: Uuid, batch_id: Uuid) -> AppResult<CostBreakdown> {
        let (labor_cost, good_quantity) = self.batch_cost_inputs(factory_id, batch_id).await?;
        let consumptions = self.recorder.consumptions(batch_id).await?;
        let usages = self.equipment_usages(batch_id).await?;

        let breakdown = calculate_costs(&consumptions, &usages, labor_cost, good_quantity);

        sqlx::query(
            "UPDATE production_batches SET total_cost = $1, unit_cost = $2, updated_at = now() \
             WHERE id = $3",
        )
        .bind(breakdown.total_cost)
        .bind(breakdown.unit_cost)
        .bind(batch_id)
        .execute(&self.db)
        .await?;

        Ok(breakdown)
    }

    /// Breakdown plus the underlying consumption and equipment rows
    pub async fn cost_analysis(&self, factory_id: Uuid, batch_id: Uuid) -> AppResult<CostAnalysis> {
        let (labor_cost, good_quantity) = self.batch_cost_inputs(factory_id, batch_id).await?;
        let consumptions = self.recorder.consumptions(batch_id).await?;
        let usages = self.equipment_usages(batch_id).await?;
        let breakdown = calculate_costs(&consumptions, &usages, labor_cost, good_quantity);

        Ok(CostAnalysis {
            breakdown,
            consumptions,
            equipment_usages: usages,
        })
    }

    /// Record equipment usage reported by the equipment tracker
    ///
    /// Usage hours are derived from the time range when not supplied.
    pub async fn record_equipment_usage(
        &self,
        factory_id: Uuid,
        batch_id: Uuid,
        input: RecordEquipmentUsageInput,
    ) -> AppResult<BatchEquipmentUsage> {
        self.batch_cost_inputs(factory_id, batch_id).await?;

        if let Some(end) = input.end_time {
            if end < input.start_time {
                return Err(AppError::Validation {
                    field: "end_time".to_string(),
                    message: "End time cannot be before start time".to_string(),
                    message_zh: "结束时间不能早于开始时间".to_string(),
                });
            }
        }

        let usage_hours = input.usage_hours.or_else(|| {
            input.end_time.map(|end| {
                let minutes = (end - input.start_time).num_minutes();
                Decimal::from(minutes) / Decimal::from(60)
            })
        });

        let row = sqlx::query_as::<_, EquipmentUsageRow>(&format!(
            r#"
            INSERT INTO batch_equipment_usage (
                production_batch_id, equipment_id, start_time, end_time,
                usage_hours, equipment_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USAGE_COLUMNS
        ))
        .bind(batch_id)
        .bind(input.equipment_id)
        .bind(input.start_time)
        .bind(input.end_time)
        .bind(usage_hours)
        .bind(input.equipment_cost.unwrap_or(Decimal::ZERO))
        .fetch_one(&self.db)
        .await?;

        Ok(row.into_model())
    }

    pub(crate) async fn equipment_usages(
        &self,
        batch_id: Uuid,
    ) -> AppResult<Vec<BatchEquipmentUsage>> {
        let rows = sqlx::query_as::<_, EquipmentUsageRow>(&format!(
            "SELECT {} FROM batch_equipment_usage \
             WHERE production_batch_id = $1 ORDER BY start_time",
            USAGE_COLUMNS
        ))
        .bind(batch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(EquipmentUsageRow::into_model).collect())
    }

    /// Labor cost and good quantity of the batch, verifying factory scope
    async fn batch_cost_inputs(
        &self,
        factory_id: Uuid,
        batch_id: Uuid,
    ) -> AppResult<(Decimal, Option<Decimal>)> {
        sqlx::query_as::<_, (Decimal, Option<Decimal>)>(
            "SELECT labor_cost, good_quantity FROM production_batches \
             WHERE id = $1 AND factory_id = $2",
        )
        .bind(batch_id)
        .bind(factory_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Production batch".to_string()))
    }
}

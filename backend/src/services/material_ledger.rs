//! Material ledger service
//!
//! Sole writer of lot quantities. Every single-lot mutation locks exactly
//! that lot row (`SELECT ... FOR UPDATE`) for the duration of one short
//! transaction; the lock is never held across lots or across calls.
//! Multi-lot reservations are made all-or-nothing by compensating releases,
//! not by holding several locks at once.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{
    plan_allocation, LedgerError, LotCandidate, MaterialBatch, MaterialBatchAdjustment,
    MaterialBatchStatus, MaterialRequirement, MaterialReservation, Pagination, PaginatedResponse,
    PaginationMeta, PlannedDraw, ReservationState,
};

/// Ledger service owning all mutations of material lot quantities
#[derive(Clone)]
pub struct MaterialLedgerService {
    db: PgPool,
}

/// Database row for a material lot
#[derive(Debug, sqlx::FromRow)]
struct MaterialBatchRow {
    id: Uuid,
    factory_id: Uuid,
    batch_number: String,
    material_type_id: Uuid,
    supplier_id: Option<Uuid>,
    receipt_date: NaiveDate,
    expire_date: Option<NaiveDate>,
    quantity_unit: String,
    receipt_quantity: Decimal,
    remaining_quantity: Decimal,
    reserved_quantity: Decimal,
    used_quantity: Decimal,
    unit_price: Decimal,
    total_value: Decimal,
    status: String,
    storage_location: Option<String>,
    quality_certificate: Option<String>,
    notes: Option<String>,
    created_by: Option<Uuid>,
    last_used_at: Option<chrono::DateTime<Utc>>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl MaterialBatchRow {
    fn into_model(self) -> AppResult<MaterialBatch> {
        let status = MaterialBatchStatus::from_str(&self.status).map_err(AppError::Internal)?;
        Ok(MaterialBatch {
            id: self.id,
            factory_id: self.factory_id,
            batch_number: self.batch_number,
            material_type_id: self.material_type_id,
            supplier_id: self.supplier_id,
            receipt_date: self.receipt_date,
            expire_date: self.expire_date,
            quantity_unit: self.quantity_unit,
            receipt_quantity: self.receipt_quantity,
            remaining_quantity: self.remaining_quantity,
            reserved_quantity: self.reserved_quantity,
            used_quantity: self.used_quantity,
            unit_price: self.unit_price,
            total_value: self.total_value,
            status,
            storage_location: self.storage_location,
            quality_certificate: self.quality_certificate,
            notes: self.notes,
            created_by: self.created_by,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database row for a reservation
#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    production_batch_id: Uuid,
    material_batch_id: Uuid,
    material_type_id: Uuid,
    quantity: Decimal,
    unit_price: Decimal,
    state: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl ReservationRow {
    fn into_model(self) -> AppResult<MaterialReservation> {
        let state = ReservationState::from_str(&self.state).map_err(AppError::Internal)?;
        Ok(MaterialReservation {
            id: self.id,
            production_batch_id: self.production_batch_id,
            material_batch_id: self.material_batch_id,
            material_type_id: self.material_type_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            state,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for receiving a new material lot
#[derive(Debug, Deserialize)]
pub struct CreateMaterialReceiptInput {
    pub batch_number: String,
    pub material_type_id: Uuid,
    pub supplier_id: Option<Uuid>,
    pub receipt_date: NaiveDate,
    pub expire_date: Option<NaiveDate>,
    pub quantity_unit: Option<String>,
    pub receipt_quantity: Decimal,
    pub unit_price: Decimal,
    pub storage_location: Option<String>,
    pub quality_certificate: Option<String>,
    pub notes: Option<String>,
}

/// Input for a manual quantity correction
#[derive(Debug, Deserialize)]
pub struct AdjustMaterialInput {
    pub delta: Decimal,
    pub reason: String,
}

/// Filter for listing lots
#[derive(Debug, Default, Deserialize)]
pub struct ListMaterialsQuery {
    pub status: Option<MaterialBatchStatus>,
    pub material_type_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A lot whose remaining quantity fell below the requested threshold
#[derive(Debug, Serialize)]
pub struct LowStockEntry {
    pub material_batch: MaterialBatch,
    pub threshold: Decimal,
}

const MATERIAL_COLUMNS: &str = "id, factory_id, batch_number, material_type_id, supplier_id, \
     receipt_date, expire_date, quantity_unit, receipt_quantity, remaining_quantity, \
     reserved_quantity, used_quantity, unit_price, total_value, status, storage_location, \
     quality_certificate, notes, created_by, last_used_at, created_at, updated_at";

const RESERVATION_COLUMNS: &str = "id, production_batch_id, material_batch_id, material_type_id, \
     quantity, unit_price, state, created_at, updated_at";

impl MaterialLedgerService {
    /// Create a new MaterialLedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record the receipt of a new lot
    ///
    /// Remaining starts at the receipt quantity; reserved and used at zero.
    pub async fn create_receipt(
        &self,
        factory_id: Uuid,
        user_id: Uuid,
        input: CreateMaterialReceiptInput,
    ) -> AppResult<MaterialBatch> {
        shared::validate_positive_quantity(input.receipt_quantity).map_err(|msg| {
            AppError::Validation {
                field: "receipt_quantity".to_string(),
                message: msg.to_string(),
                message_zh: "接收数量必须为正数".to_string(),
            }
        })?;
        shared::validate_receipt_dates(input.receipt_date, input.expire_date).map_err(|msg| {
            AppError::Validation {
                field: "expire_date".to_string(),
                message: msg.to_string(),
                message_zh: "过期日期必须晚于接收日期".to_string(),
            }
        })?;
        if input.unit_price < Decimal::ZERO {
            return Err(AppError::Validation {
                field: "unit_price".to_string(),
                message: "Unit price cannot be negative".to_string(),
                message_zh: "单价不能为负数".to_string(),
            });
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM material_batches WHERE factory_id = $1 AND batch_number = $2)",
        )
        .bind(factory_id)
        .bind(&input.batch_number)
        .fetch_one(&self.db)
        .await?;

        if exists {
            return Err(AppError::DuplicateEntry("batch_number".to_string()));
        }

        let total_value = input.unit_price * input.receipt_quantity;
        let quantity_unit = input.quantity_unit.unwrap_or_else(|| "kg".to_string());

        let row = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            r#"
            INSERT INTO material_batches (
                factory_id, batch_number, material_type_id, supplier_id, receipt_date,
                expire_date, quantity_unit, receipt_quantity, remaining_quantity,
                unit_price, total_value, storage_location, quality_certificate, notes, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(factory_id)
        .bind(&input.batch_number)
        .bind(input.material_type_id)
        .bind(input.supplier_id)
        .bind(input.receipt_date)
        .bind(input.expire_date)
        .bind(&quantity_unit)
        .bind(input.receipt_quantity)
        .bind(input.unit_price)
        .bind(total_value)
        .bind(&input.storage_location)
        .bind(&input.quality_certificate)
        .bind(&input.notes)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        row.into_model()
    }

    /// Earmark `quantity` on one lot: remaining -> reserved
    pub async fn reserve(
        &self,
        factory_id: Uuid,
        lot_id: Uuid,
        quantity: Decimal,
    ) -> AppResult<MaterialBatch> {
        let mut tx = self.db.begin().await?;
        let lot = Self::lock_lot(&mut tx, factory_id, lot_id).await?;

        if !lot.status.is_reservable() {
            return Err(AppError::from_ledger(
                LedgerError::LotNotAvailable { status: lot.status },
                &lot.batch_number,
            ));
        }

        let mut quantities = lot.quantities();
        quantities
            .reserve(quantity)
            .map_err(|e| AppError::from_ledger(e, &lot.batch_number))?;

        let updated =
            Self::store_quantities(&mut tx, lot_id, &quantities, quantities.derived_status(), false)
                .await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Return `quantity` from reserved back to remaining
    pub async fn release(
        &self,
        factory_id: Uuid,
        lot_id: Uuid,
        quantity: Decimal,
    ) -> AppResult<MaterialBatch> {
        let mut tx = self.db.begin().await?;
        let lot = Self::lock_lot(&mut tx, factory_id, lot_id).await?;

        let mut quantities = lot.quantities();
        quantities
            .release(quantity)
            .map_err(|e| AppError::from_ledger(e, &lot.batch_number))?;

        // Expired stays sticky even when quantities would say available
        let status = if lot.status == MaterialBatchStatus::Expired {
            MaterialBatchStatus::Expired
        } else {
            quantities.derived_status()
        };

        let updated = Self::store_quantities(&mut tx, lot_id, &quantities, status, false).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Convert `quantity` of reservation into a permanent draw
    pub async fn consume(
        &self,
        factory_id: Uuid,
        lot_id: Uuid,
        quantity: Decimal,
    ) -> AppResult<MaterialBatch> {
        let mut tx = self.db.begin().await?;
        let updated = Self::consume_in_tx(&mut tx, factory_id, lot_id, quantity).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Consume within a caller-owned transaction (used by the consumption
    /// recorder to keep the audit row atomic with the lot update)
    pub(crate) async fn consume_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        factory_id: Uuid,
        lot_id: Uuid,
        quantity: Decimal,
    ) -> AppResult<MaterialBatch> {
        let lot = Self::lock_lot(tx, factory_id, lot_id).await?;

        let mut quantities = lot.quantities();
        quantities
            .consume(quantity)
            .map_err(|e| AppError::from_ledger(e, &lot.batch_number))?;

        let status = if lot.status == MaterialBatchStatus::Expired
            && quantities.derived_status() != MaterialBatchStatus::Depleted
        {
            MaterialBatchStatus::Expired
        } else {
            quantities.derived_status()
        };

        Self::store_quantities(tx, lot_id, &quantities, status, true).await
    }

    /// Manual correction of a lot's remaining quantity, always audited
    pub async fn adjust(
        &self,
        factory_id: Uuid,
        lot_id: Uuid,
        actor_id: Uuid,
        input: AdjustMaterialInput,
    ) -> AppResult<MaterialBatch> {
        shared::validate_reason(&input.reason).map_err(|msg| AppError::Validation {
            field: "reason".to_string(),
            message: msg.to_string(),
            message_zh: "必须填写调整原因".to_string(),
        })?;

        let mut tx = self.db.begin().await?;
        let lot = Self::lock_lot(&mut tx, factory_id, lot_id).await?;

        let mut quantities = lot.quantities();
        quantities
            .adjust(input.delta)
            .map_err(|e| AppError::from_ledger(e, &lot.batch_number))?;

        let status = if lot.status == MaterialBatchStatus::Expired {
            MaterialBatchStatus::Expired
        } else {
            quantities.derived_status()
        };

        // Receipt moves with remaining and all quantities change in one
        // statement, so the balance check holds at every point
        let total_value = lot.unit_price * quantities.receipt;
        let row = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            r#"
            UPDATE material_batches
            SET receipt_quantity = $1, remaining_quantity = $2, reserved_quantity = $3,
                used_quantity = $4, total_value = $5, status = $6, updated_at = now()
            WHERE id = $7
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(quantities.receipt)
        .bind(quantities.remaining)
        .bind(quantities.reserved)
        .bind(quantities.used)
        .bind(total_value)
        .bind(status.as_str())
        .bind(lot_id)
        .fetch_one(&mut *tx)
        .await?;
        let updated = row.into_model()?;

        sqlx::query(
            r#"
            INSERT INTO material_batch_adjustments (material_batch_id, delta, reason, adjusted_by)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(lot_id)
        .bind(input.delta)
        .bind(input.reason.trim())
        .bind(actor_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Reserve lots covering every requirement of a production batch
    ///
    /// FEFO planning per material type against a snapshot, then per-lot
    /// reserves. Any failure releases everything granted during this call
    /// before the error surfaces (all-or-nothing, no cross-lot locks).
    pub async fn reserve_for_production(
        &self,
        factory_id: Uuid,
        production_batch_id: Uuid,
        requirements: &[MaterialRequirement],
    ) -> AppResult<Vec<MaterialReservation>> {
        if requirements.is_empty() {
            return Err(AppError::Validation {
                field: "requirements".to_string(),
                message: "At least one material requirement is needed to start".to_string(),
                message_zh: "开始生产前必须提供物料需求".to_string(),
            });
        }

        // Plan every requirement against a snapshot first, so an obvious
        // shortfall fails before any lot is touched
        let mut planned: Vec<(Uuid, Vec<PlannedDraw>)> = Vec::new();
        for requirement in requirements {
            let candidates = self
                .eligible_lots(factory_id, requirement.material_type_id)
                .await?;
            let draws = plan_allocation(&candidates, requirement.quantity).map_err(|e| {
                AppError::from_allocation(e, &requirement.material_type_id.to_string())
            })?;
            planned.push((requirement.material_type_id, draws));
        }

        // Apply the plan lot by lot, compensating on the first failure
        let mut granted: Vec<(Uuid, Decimal, Decimal, Uuid)> = Vec::new();
        for (material_type_id, draws) in &planned {
            for draw in draws {
                match self.reserve(factory_id, draw.lot_id, draw.quantity).await {
                    Ok(lot) => {
                        granted.push((draw.lot_id, draw.quantity, lot.unit_price, *material_type_id))
                    }
                    Err(err) => {
                        self.compensate_releases(factory_id, &granted).await;
                        return Err(err);
                    }
                }
            }
        }

        // All reserves succeeded; persist the reservation rows. If that
        // fails the earmarked stock is given back too.
        match self
            .insert_reservations(production_batch_id, &granted)
            .await
        {
            Ok(reservations) => Ok(reservations),
            Err(err) => {
                self.compensate_releases(factory_id, &granted).await;
                Err(err)
            }
        }
    }

    async fn insert_reservations(
        &self,
        production_batch_id: Uuid,
        granted: &[(Uuid, Decimal, Decimal, Uuid)],
    ) -> AppResult<Vec<MaterialReservation>> {
        let mut tx = self.db.begin().await?;
        let mut reservations = Vec::with_capacity(granted.len());
        for (lot_id, quantity, unit_price, material_type_id) in granted {
            let row = sqlx::query_as::<_, ReservationRow>(&format!(
                r#"
                INSERT INTO material_reservations (
                    production_batch_id, material_batch_id, material_type_id, quantity, unit_price
                )
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {}
                "#,
                RESERVATION_COLUMNS
            ))
            .bind(production_batch_id)
            .bind(lot_id)
            .bind(material_type_id)
            .bind(quantity)
            .bind(unit_price)
            .fetch_one(&mut *tx)
            .await?;
            reservations.push(row.into_model()?);
        }
        tx.commit().await?;

        Ok(reservations)
    }

    /// Release every open reservation of a production batch (cancel path,
    /// or compensation after a lost start transition)
    pub async fn release_for_production(
        &self,
        factory_id: Uuid,
        production_batch_id: Uuid,
    ) -> AppResult<Vec<MaterialReservation>> {
        let open = self
            .reservations_in_state(production_batch_id, ReservationState::Open)
            .await?;

        let mut released = Vec::with_capacity(open.len());
        for reservation in open {
            let mut tx = self.db.begin().await?;
            let lot =
                Self::lock_lot(&mut tx, factory_id, reservation.material_batch_id).await?;

            let mut quantities = lot.quantities();
            quantities
                .release(reservation.quantity)
                .map_err(|e| AppError::from_ledger(e, &lot.batch_number))?;

            let status = if lot.status == MaterialBatchStatus::Expired {
                MaterialBatchStatus::Expired
            } else {
                quantities.derived_status()
            };
            Self::store_quantities(&mut tx, lot.id, &quantities, status, false).await?;

            let row = sqlx::query_as::<_, ReservationRow>(&format!(
                "UPDATE material_reservations SET state = 'released', updated_at = now() \
                 WHERE id = $1 RETURNING {}",
                RESERVATION_COLUMNS
            ))
            .bind(reservation.id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            released.push(row.into_model()?);
        }

        Ok(released)
    }

    /// Reservations of a production batch in a given state
    pub async fn reservations_in_state(
        &self,
        production_batch_id: Uuid,
        state: ReservationState,
    ) -> AppResult<Vec<MaterialReservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM material_reservations \
             WHERE production_batch_id = $1 AND state = $2 ORDER BY created_at",
            RESERVATION_COLUMNS
        ))
        .bind(production_batch_id)
        .bind(state.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(|r| r.into_model()).collect()
    }

    /// Get a lot by id
    pub async fn get_material(&self, factory_id: Uuid, lot_id: Uuid) -> AppResult<MaterialBatch> {
        let row = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            "SELECT {} FROM material_batches WHERE id = $1 AND factory_id = $2",
            MATERIAL_COLUMNS
        ))
        .bind(lot_id)
        .bind(factory_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Material batch".to_string()))?;

        row.into_model()
    }

    /// List lots for a factory, newest receipts first
    pub async fn list_materials(
        &self,
        factory_id: Uuid,
        query: ListMaterialsQuery,
    ) -> AppResult<PaginatedResponse<MaterialBatch>> {
        let pagination = Pagination {
            page: query.page.unwrap_or(1),
            per_page: query.per_page.unwrap_or(20),
        };
        let status = query.status.map(|s| s.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM material_batches \
             WHERE factory_id = $1 \
             AND ($2::text IS NULL OR status = $2) \
             AND ($3::uuid IS NULL OR material_type_id = $3)",
        )
        .bind(factory_id)
        .bind(&status)
        .bind(query.material_type_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            "SELECT {} FROM material_batches \
             WHERE factory_id = $1 \
             AND ($2::text IS NULL OR status = $2) \
             AND ($3::uuid IS NULL OR material_type_id = $3) \
             ORDER BY receipt_date DESC, created_at DESC \
             LIMIT $4 OFFSET $5",
            MATERIAL_COLUMNS
        ))
        .bind(factory_id)
        .bind(&status)
        .bind(query.material_type_id)
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

    /// Lots with remaining below the threshold (drives low-stock alerts)
    pub async fn low_stock(
        &self,
        factory_id: Uuid,
        threshold: Decimal,
    ) -> AppResult<Vec<LowStockEntry>> {
        let rows = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            "SELECT {} FROM material_batches \
             WHERE factory_id = $1 AND remaining_quantity <= $2 \
             AND status IN ('available', 'reserved') \
             ORDER BY remaining_quantity ASC",
            MATERIAL_COLUMNS
        ))
        .bind(factory_id)
        .bind(threshold)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(LowStockEntry {
                    material_batch: r.into_model()?,
                    threshold,
                })
            })
            .collect()
    }

    /// Lots expiring within `days` from today that still hold stock
    pub async fn expiring(&self, factory_id: Uuid, days: i64) -> AppResult<Vec<MaterialBatch>> {
        let today = Utc::now().date_naive();
        let rows = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            "SELECT {} FROM material_batches \
             WHERE factory_id = $1 AND expire_date IS NOT NULL \
             AND expire_date >= $2 AND expire_date <= $3 \
             AND remaining_quantity + reserved_quantity > 0 \
             ORDER BY expire_date ASC",
            MATERIAL_COLUMNS
        ))
        .bind(factory_id)
        .bind(today)
        .bind(today + chrono::Duration::days(days))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(|r| r.into_model()).collect()
    }

    /// Adjustment audit trail for a lot
    pub async fn adjustments(
        &self,
        factory_id: Uuid,
        lot_id: Uuid,
    ) -> AppResult<Vec<MaterialBatchAdjustment>> {
        // Validate the lot belongs to the factory
        self.get_material(factory_id, lot_id).await?;

        let rows = sqlx::query_as::<_, AdjustmentRow>(
            "SELECT id, material_batch_id, delta, reason, adjusted_by, created_at \
             FROM material_batch_adjustments \
             WHERE material_batch_id = $1 ORDER BY created_at DESC",
        )
        .bind(lot_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(AdjustmentRow::into_model).collect())
    }

    /// Snapshot of lots eligible for new reservations of a material type
    async fn eligible_lots(
        &self,
        factory_id: Uuid,
        material_type_id: Uuid,
    ) -> AppResult<Vec<LotCandidate>> {
        let rows = sqlx::query_as::<_, (Uuid, Option<NaiveDate>, NaiveDate, Decimal)>(
            "SELECT id, expire_date, receipt_date, remaining_quantity \
             FROM material_batches \
             WHERE factory_id = $1 AND material_type_id = $2 \
             AND status IN ('available', 'reserved') \
             AND remaining_quantity > 0",
        )
        .bind(factory_id)
        .bind(material_type_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(lot_id, expire_date, receipt_date, remaining)| LotCandidate {
                lot_id,
                expire_date,
                receipt_date,
                remaining,
            })
            .collect())
    }

    /// Undo reserves granted earlier in a failed multi-lot reservation.
    /// A failing release here means the balance is already broken; log it
    /// loudly, the original error still surfaces to the caller.
    async fn compensate_releases(&self, factory_id: Uuid, granted: &[(Uuid, Decimal, Decimal, Uuid)]) {
        for (lot_id, quantity, _, _) in granted {
            if let Err(err) = self.release(factory_id, *lot_id, *quantity).await {
                tracing::error!(
                    lot_id = %lot_id,
                    quantity = %quantity,
                    error = %err,
                    "compensating release failed during reservation rollback"
                );
            }
        }
    }

    /// Lock one lot row for the duration of the surrounding transaction
    async fn lock_lot(
        tx: &mut Transaction<'_, Postgres>,
        factory_id: Uuid,
        lot_id: Uuid,
    ) -> AppResult<MaterialBatch> {
        let row = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            "SELECT {} FROM material_batches WHERE id = $1 AND factory_id = $2 FOR UPDATE",
            MATERIAL_COLUMNS
        ))
        .bind(lot_id)
        .bind(factory_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Material batch".to_string()))?;

        row.into_model()
    }

    /// Persist updated quantities and status for a locked lot
    async fn store_quantities(
        tx: &mut Transaction<'_, Postgres>,
        lot_id: Uuid,
        quantities: &shared::LotQuantities,
        status: MaterialBatchStatus,
        touch_last_used: bool,
    ) -> AppResult<MaterialBatch> {
        let row = sqlx::query_as::<_, MaterialBatchRow>(&format!(
            r#"
            UPDATE material_batches
            SET remaining_quantity = $1, reserved_quantity = $2, used_quantity = $3,
                status = $4, updated_at = now(),
                last_used_at = CASE WHEN $5 THEN now() ELSE last_used_at END
            WHERE id = $6
            RETURNING {}
            "#,
            MATERIAL_COLUMNS
        ))
        .bind(quantities.remaining)
        .bind(quantities.reserved)
        .bind(quantities.used)
        .bind(status.as_str())
        .bind(touch_last_used)
        .bind(lot_id)
        .fetch_one(&mut **tx)
        .await?;

        row.into_model()
    }
}

/// Database row for an adjustment audit entry
#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    id: Uuid,
    material_batch_id: Uuid,
    delta: Decimal,
    reason: String,
    adjusted_by: Uuid,
    created_at: chrono::DateTime<Utc>,
}

impl AdjustmentRow {
    fn into_model(self) -> MaterialBatchAdjustment {
        MaterialBatchAdjustment {
            id: self.id,
            material_batch_id: self.material_batch_id,
            delta: self.delta,
            reason: self.reason,
            adjusted_by: self.adjusted_by,
            created_at: self.created_at,
        }
    }
}

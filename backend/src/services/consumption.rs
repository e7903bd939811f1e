//! Material consumption recorder
//!
//! Settles a production batch's open reservations into permanent draws,
//! exactly once. Each (production batch, lot) pair yields at most one
//! consumption row, enforced by a unique constraint; a retry after a
//! partial failure finishes the remaining open reservations and never
//! double-draws the ones already settled.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::material_ledger::MaterialLedgerService;
use shared::{MaterialConsumption, ReservationState};

/// Records permanent material draws at batch completion
#[derive(Clone)]
pub struct ConsumptionRecorder {
    db: PgPool,
    ledger: MaterialLedgerService,
}

#[derive(Debug, sqlx::FromRow)]
struct ConsumptionRow {
    id: Uuid,
    production_batch_id: Uuid,
    material_batch_id: Uuid,
    quantity_consumed: rust_decimal::Decimal,
    unit_cost_at_consumption: rust_decimal::Decimal,
    consumed_at: chrono::DateTime<chrono::Utc>,
}

impl ConsumptionRow {
    fn into_model(self) -> MaterialConsumption {
        MaterialConsumption {
            id: self.id,
            production_batch_id: self.production_batch_id,
            material_batch_id: self.material_batch_id,
            quantity_consumed: self.quantity_consumed,
            unit_cost_at_consumption: self.unit_cost_at_consumption,
            consumed_at: self.consumed_at,
        }
    }
}

const CONSUMPTION_COLUMNS: &str = "id, production_batch_id, material_batch_id, \
     quantity_consumed, unit_cost_at_consumption, consumed_at";

impl ConsumptionRecorder {
    pub fn new(db: PgPool) -> Self {
        let ledger = MaterialLedgerService::new(db.clone());
        Self { db, ledger }
    }

    /// Settle every open reservation of the batch into a consumption row
    ///
    /// One transaction per reservation: the lot draw, the audit row and
    /// the reservation flip commit together or not at all. Reservations
    /// already consumed are skipped, so calling this again after a crash
    /// completes the remainder and returns the full consumption list.
    pub async fn record_completion(
        &self,
        factory_id: Uuid,
        production_batch_id: Uuid,
    ) -> AppResult<Vec<MaterialConsumption>> {
        let open = self
            .ledger
            .reservations_in_state(production_batch_id, ReservationState::Open)
            .await?;

        for reservation in open {
            let mut tx = self.db.begin().await?;

            MaterialLedgerService::consume_in_tx(
                &mut tx,
                factory_id,
                reservation.material_batch_id,
                reservation.quantity,
            )
            .await?;

            sqlx::query(
                r#"
                INSERT INTO material_consumptions (
                    production_batch_id, material_batch_id,
                    quantity_consumed, unit_cost_at_consumption
                )
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(production_batch_id)
            .bind(reservation.material_batch_id)
            .bind(reservation.quantity)
            .bind(reservation.unit_price)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE material_reservations SET state = 'consumed', updated_at = now() \
                 WHERE id = $1",
            )
            .bind(reservation.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        self.consumptions(production_batch_id).await
    }

    /// All consumption rows of a production batch, oldest first
    pub async fn consumptions(
        &self,
        production_batch_id: Uuid,
    ) -> AppResult<Vec<MaterialConsumption>> {
        let rows = sqlx::query_as::<_, ConsumptionRow>(&format!(
            "SELECT {} FROM material_consumptions \
             WHERE production_batch_id = $1 ORDER BY consumed_at",
            CONSUMPTION_COLUMNS
        ))
        .bind(production_batch_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(ConsumptionRow::into_model).collect())
    }
}

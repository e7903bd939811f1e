//! API route definitions

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::{material, production};
use crate::middleware::auth_middleware;
use crate::AppState;

/// All /api/v1 routes; every route requires a valid JWT
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/materials", material_routes())
        .nest("/production", production_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn material_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(material::list_materials).post(material::create_material_receipt),
        )
        .route("/low-stock", get(material::low_stock))
        .route("/expiring", get(material::expiring_materials))
        .route("/:id", get(material::get_material))
        .route("/:id/reserve", post(material::reserve_material))
        .route("/:id/release", post(material::release_material))
        .route("/:id/consume", post(material::consume_material))
        .route("/:id/adjust", post(material::adjust_material))
        .route("/:id/adjustments", get(material::list_adjustments))
}

fn production_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/batches",
            get(production::list_batches).post(production::create_batch),
        )
        .route("/batches/:id", get(production::get_batch))
        .route("/batches/:id/start", post(production::start_batch))
        .route("/batches/:id/pause", post(production::pause_batch))
        .route("/batches/:id/resume", post(production::resume_batch))
        .route("/batches/:id/complete", post(production::complete_batch))
        .route("/batches/:id/cancel", post(production::cancel_batch))
        .route("/batches/:id/timeline", get(production::batch_timeline))
        .route("/batches/:id/materials", get(production::batch_materials))
        .route(
            "/batches/:id/material-consumption",
            get(production::batch_consumption),
        )
        .route(
            "/batches/:id/cost-analysis",
            get(production::batch_cost_analysis),
        )
        .route(
            "/batches/:id/recalculate-cost",
            post(production::recalculate_cost),
        )
        .route(
            "/batches/:id/equipment-usage",
            post(production::record_equipment_usage),
        )
}

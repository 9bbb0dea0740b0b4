use std::sync::Arc;

use axum::{routing::get, Router};

use patient_flow_cell::{flow_routes, ClinicFlow};

pub fn create_router(flow: Arc<ClinicFlow>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic flow API is running!" }))
        .nest("/flow", flow_routes(flow))
}

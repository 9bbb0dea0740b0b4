// libs/patient-flow-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers;
use crate::services::flow::ClinicFlow;

pub fn flow_routes(flow: Arc<ClinicFlow>) -> Router {
    let appointment_routes = Router::new()
        .route("/appointments", get(handlers::list_appointments))
        .route("/waiting-room", get(handlers::waiting_room))
        .route("/refresh", post(handlers::refresh))
        .route("/late-check", post(handlers::late_check))
        .route("/appointments/{appointment_id}/status", put(handlers::update_status))
        .route("/appointments/{appointment_id}/priority", put(handlers::update_priority))
        .route("/appointments/{appointment_id}/room", put(handlers::update_room))
        .route("/appointments/{appointment_id}/payment", put(handlers::update_payment));

    let session_routes = Router::new()
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{appointment_id}/open", post(handlers::open_session))
        .route("/sessions/{appointment_id}/minimize", post(handlers::minimize_session))
        .route("/sessions/{appointment_id}/restore", post(handlers::restore_session))
        .route("/sessions/{appointment_id}/close", post(handlers::close_session))
        .route("/sessions/{appointment_id}/save", post(handlers::save_session))
        .route("/sessions/{appointment_id}/draft", put(handlers::update_draft))
        .route("/timers/{appointment_id}", get(handlers::get_timer))
        .route("/timers/{appointment_id}/toggle", post(handlers::toggle_timer))
        .route("/timers/{appointment_id}/reset", post(handlers::reset_timer));

    Router::new()
        .merge(appointment_routes)
        .merge(session_routes)
        .route("/events", get(handlers::stream_events))
        .with_state(flow)
}

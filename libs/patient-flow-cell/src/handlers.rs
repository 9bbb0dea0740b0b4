// libs/patient-flow-cell/src/handlers.rs
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use uuid::Uuid;

use appointment_cell::{Appointment, PaymentUpdateRequest, PriorityMoveRequest, RoomAssignmentRequest};
use consultation_cell::{ConsultationSession, DraftFieldUpdate, SavedConsultation, TimerState};
use shared_models::error::AppError;

use crate::models::{LateCheckResponse, RefreshRequest, RefreshResponse, StatusChangeRequest};
use crate::services::flow::ClinicFlow;

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(State(flow): State<Arc<ClinicFlow>>) -> Json<Vec<Appointment>> {
    Json(flow.appointments().await)
}

#[axum::debug_handler]
pub async fn waiting_room(State(flow): State<Arc<ClinicFlow>>) -> Json<Vec<Appointment>> {
    Json(flow.waiting_room().await)
}

#[axum::debug_handler]
pub async fn refresh(
    State(flow): State<Arc<ClinicFlow>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let count = flow.refresh(request.date).await?;
    Ok(Json(RefreshResponse {
        date: request.date,
        count,
    }))
}

/// The response carries the locally-applied state; the remote write settles
/// in the background.
#[axum::debug_handler]
pub async fn update_status(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<Appointment>, AppError> {
    let pending = flow.apply_status(appointment_id, request.status).await?;
    Ok(Json(pending.appointment))
}

#[axum::debug_handler]
pub async fn update_priority(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<PriorityMoveRequest>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    flow.reorder(appointment_id, request.direction).await?;
    Ok(Json(flow.waiting_room().await))
}

#[axum::debug_handler]
pub async fn update_room(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RoomAssignmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    let pending = flow.assign_room(appointment_id, request.room).await?;
    Ok(Json(pending.appointment))
}

#[axum::debug_handler]
pub async fn update_payment(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<PaymentUpdateRequest>,
) -> Result<Json<Appointment>, AppError> {
    let pending = flow.set_payment(appointment_id, request.payment_state).await?;
    Ok(Json(pending.appointment))
}

#[axum::debug_handler]
pub async fn late_check(State(flow): State<Arc<ClinicFlow>>) -> Json<LateCheckResponse> {
    Json(LateCheckResponse {
        late: flow.detect_late().await,
    })
}

// ==============================================================================
// SESSION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_sessions(State(flow): State<Arc<ClinicFlow>>) -> Json<Vec<ConsultationSession>> {
    Json(flow.sessions().await)
}

#[axum::debug_handler]
pub async fn open_session(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ConsultationSession>, AppError> {
    Ok(Json(flow.open_session(appointment_id).await?))
}

#[axum::debug_handler]
pub async fn minimize_session(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ConsultationSession>, AppError> {
    Ok(Json(flow.minimize_session(appointment_id).await?))
}

#[axum::debug_handler]
pub async fn restore_session(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ConsultationSession>, AppError> {
    Ok(Json(flow.restore_session(appointment_id).await?))
}

#[axum::debug_handler]
pub async fn close_session(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ConsultationSession>, AppError> {
    Ok(Json(flow.close_session(appointment_id).await?))
}

#[axum::debug_handler]
pub async fn update_draft(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
    Json(update): Json<DraftFieldUpdate>,
) -> Result<Json<ConsultationSession>, AppError> {
    Ok(Json(flow.update_draft(appointment_id, update.field, update.value).await?))
}

#[axum::debug_handler]
pub async fn save_session(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<SavedConsultation>, AppError> {
    Ok(Json(flow.save_session(appointment_id).await?))
}

// ==============================================================================
// TIMER HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn toggle_timer(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<TimerState>, AppError> {
    Ok(Json(flow.toggle_timer(appointment_id).await?))
}

#[axum::debug_handler]
pub async fn reset_timer(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<TimerState>, AppError> {
    Ok(Json(flow.reset_timer(appointment_id).await?))
}

#[axum::debug_handler]
pub async fn get_timer(
    State(flow): State<Arc<ClinicFlow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<TimerState>, AppError> {
    Ok(Json(flow.timer(appointment_id).await?))
}

// ==============================================================================
// EVENT STREAM
// ==============================================================================

/// Server-sent events carrying every [`FlowEvent`](shared_models::events::FlowEvent).
pub async fn stream_events(
    State(flow): State<Arc<ClinicFlow>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("Flow event subscriber connected");

    let events = stream::unfold(flow.subscribe(), |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default().json_data(&event).unwrap_or_else(|e| {
                        warn!("Failed to encode flow event: {}", e);
                        Event::default().comment("encoding error")
                    });
                    return Some((Ok::<Event, Infallible>(sse), receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

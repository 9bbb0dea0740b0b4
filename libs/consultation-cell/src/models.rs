// libs/consultation-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::AppointmentError;
use shared_models::error::AppError;

// ==============================================================================
// CONSULTATION SESSION MODELS
// ==============================================================================

/// Clinical form fields keyed by field name. Ordered so serialized drafts are
/// stable across reads.
pub type DraftData = BTreeMap<String, Value>;

/// One clinician's working view of a single appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationSession {
    pub appointment_id: Uuid,
    pub is_open: bool,
    pub is_minimized: bool,
    pub draft_data: DraftData,
    /// Key of the session's timer in the scheduler (the appointment id).
    pub timer_id: Uuid,
}

impl ConsultationSession {
    pub fn new(appointment_id: Uuid, draft_data: DraftData) -> Self {
        Self {
            appointment_id,
            is_open: true,
            is_minimized: false,
            draft_data,
            timer_id: appointment_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub seconds: u64,
    pub is_running: bool,
}

// ==============================================================================
// PERSISTENCE MODELS
// ==============================================================================

/// Body of `POST /consultations`: the appointment id next to every draft field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultationRecord {
    pub appointment_id: Uuid,
    #[serde(flatten)]
    pub draft_data: DraftData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedConsultation {
    pub id: Uuid,
    pub appointment_id: Uuid,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftFieldUpdate {
    pub field: String,
    pub value: Value,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsultationError {
    #[error("No consultation session for appointment {0}")]
    SessionNotFound(Uuid),

    #[error("Consultation session {0} has no registered timer")]
    MissingTimer(Uuid),

    #[error("Failed to save consultation: {0}")]
    DraftSaveFailed(String),

    #[error(transparent)]
    Appointment(#[from] AppointmentError),
}

impl From<ConsultationError> for AppError {
    fn from(error: ConsultationError) -> Self {
        match error {
            ConsultationError::SessionNotFound(_) => AppError::NotFound(error.to_string()),
            ConsultationError::MissingTimer(_) => AppError::Internal(error.to_string()),
            ConsultationError::DraftSaveFailed(_) => AppError::ExternalService(error.to_string()),
            ConsultationError::Appointment(inner) => AppError::from(inner),
        }
    }
}

// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use shared_database::RemoteError;
use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub room: Option<Room>,
    /// Waiting-room position; only set while `status` is waiting.
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub waiting_since: Option<DateTime<Utc>>,
    /// Minutes spent waiting, recorded when the consultation starts.
    #[serde(default)]
    pub wait_duration_minutes: Option<i64>,
    pub payment_state: PaymentState,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    /// Local staleness counter, bumped on every applied change.
    #[serde(default)]
    pub version: u64,
}

impl Appointment {
    pub fn scheduled_at(&self) -> NaiveDateTime {
        NaiveDateTime::new(self.date, self.time)
    }

    pub fn is_waiting(&self) -> bool {
        self.status == AppointmentStatus::Waiting
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Late,
    Waiting,
    InProgress,
    Completed,
    Absent,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Absent)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Late => write!(f, "late"),
            AppointmentStatus::Waiting => write!(f, "waiting"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Absent => write!(f, "absent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Room {
    Room1,
    Room2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Paid,
    Unpaid,
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    Visit,
    Control,
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::Visit => write!(f, "visit"),
            AppointmentType::Control => write!(f, "control"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueDirection {
    Earlier,
    Later,
}

impl QueueDirection {
    pub fn opposite(&self) -> Self {
        match self {
            QueueDirection::Earlier => QueueDirection::Later,
            QueueDirection::Later => QueueDirection::Earlier,
        }
    }
}

// ==============================================================================
// MUTATIONS
// ==============================================================================

/// A locally-applied change that is mirrored to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    Status {
        appointment_id: Uuid,
        status: AppointmentStatus,
    },
    Reorder {
        appointment_id: Uuid,
        direction: QueueDirection,
    },
    Room {
        appointment_id: Uuid,
        room: Option<Room>,
    },
    Payment {
        appointment_id: Uuid,
        payment_state: PaymentState,
    },
}

impl Mutation {
    pub fn appointment_id(&self) -> Uuid {
        match self {
            Mutation::Status { appointment_id, .. }
            | Mutation::Reorder { appointment_id, .. }
            | Mutation::Room { appointment_id, .. }
            | Mutation::Payment { appointment_id, .. } => *appointment_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Status { .. } => "status",
            Mutation::Reorder { .. } => "reorder",
            Mutation::Room { .. } => "room",
            Mutation::Payment { .. } => "payment",
        }
    }
}

// ==============================================================================
// REMOTE REQUEST BODIES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AppointmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityMoveRequest {
    pub direction: QueueDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomAssignmentRequest {
    pub room: Option<Room>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentUpdateRequest {
    pub payment_state: PaymentState,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment {0} is not in the waiting room")]
    NotInQueue(Uuid),

    #[error("Remote service rejected the change: {0}")]
    RemoteRejected(String),

    #[error("Remote service unreachable: {0}")]
    RemoteUnreachable(String),
}

impl AppointmentError {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            AppointmentError::RemoteRejected(_) | AppointmentError::RemoteUnreachable(_)
        )
    }
}

impl From<RemoteError> for AppointmentError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::Unreachable(msg) => AppointmentError::RemoteUnreachable(msg),
            RemoteError::Rejected { status, message } => {
                AppointmentError::RemoteRejected(format!("{} ({})", message, status))
            }
            RemoteError::InvalidResponse(msg) => AppointmentError::RemoteRejected(msg),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        match error {
            AppointmentError::NotFound(_) => AppError::NotFound(error.to_string()),
            AppointmentError::InvalidTransition { .. } => AppError::Conflict(error.to_string()),
            AppointmentError::NotInQueue(_) => AppError::BadRequest(error.to_string()),
            AppointmentError::RemoteRejected(_) | AppointmentError::RemoteUnreachable(_) => {
                AppError::ExternalService(error.to_string())
            }
        }
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::AppointmentStatus;

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LateCheckResponse {
    pub late: Vec<Uuid>,
}

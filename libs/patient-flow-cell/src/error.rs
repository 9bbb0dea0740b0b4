use thiserror::Error;

use appointment_cell::AppointmentError;
use consultation_cell::ConsultationError;
use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error(transparent)]
    Consultation(#[from] ConsultationError),
}

impl From<FlowError> for AppError {
    fn from(error: FlowError) -> Self {
        match error {
            FlowError::Appointment(inner) => AppError::from(inner),
            FlowError::Consultation(inner) => AppError::from(inner),
        }
    }
}

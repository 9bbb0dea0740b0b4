// libs/consultation-cell/src/services/persistence.rs
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{info, instrument};

use shared_config::AppConfig;
use shared_database::{ClinicApiClient, RemoteError};

use crate::models::{ConsultationRecord, SavedConsultation};

/// External store for finished consultations.
#[async_trait]
pub trait ConsultationPersistence: Send + Sync {
    async fn save(&self, record: ConsultationRecord) -> Result<SavedConsultation, RemoteError>;
}

pub struct HttpConsultationPersistence {
    client: ClinicApiClient,
}

impl HttpConsultationPersistence {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: ClinicApiClient::new(config),
        }
    }

    pub fn with_client(client: ClinicApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConsultationPersistence for HttpConsultationPersistence {
    #[instrument(skip(self, record), fields(appointment_id = %record.appointment_id))]
    async fn save(&self, record: ConsultationRecord) -> Result<SavedConsultation, RemoteError> {
        let saved: SavedConsultation = self
            .client
            .request(Method::POST, "/consultations", Some(json!(record)))
            .await?;

        info!("Consultation {} stored for appointment {}", saved.id, saved.appointment_id);
        Ok(saved)
    }
}

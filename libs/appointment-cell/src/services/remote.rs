// libs/appointment-cell/src/services/remote.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{ClinicApiClient, RemoteError};

use crate::models::{
    Appointment, PaymentState, PaymentUpdateRequest, PriorityMoveRequest, QueueDirection, Room,
    RoomAssignmentRequest, StatusUpdateRequest,
};

/// Remote appointment service: the authoritative store the local snapshot
/// mirrors.
#[async_trait]
pub trait AppointmentRemote: Send + Sync {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Appointment>, RemoteError>;

    async fn update_status(&self, id: Uuid, update: &StatusUpdateRequest) -> Result<Appointment, RemoteError>;

    async fn move_priority(&self, id: Uuid, direction: QueueDirection) -> Result<Appointment, RemoteError>;

    async fn assign_room(&self, id: Uuid, room: Option<Room>) -> Result<(), RemoteError>;

    async fn set_payment(&self, id: Uuid, payment_state: PaymentState) -> Result<(), RemoteError>;
}

pub struct HttpAppointmentRemote {
    client: ClinicApiClient,
}

impl HttpAppointmentRemote {
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
impl AppointmentRemote for HttpAppointmentRemote {
    #[instrument(skip(self))]
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Appointment>, RemoteError> {
        let path = format!("/appointments?date={}", date);
        let records: Vec<Appointment> = self.client.request(Method::GET, &path, None).await?;

        debug!("Fetched {} appointments for {}", records.len(), date);
        Ok(records)
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_status(&self, id: Uuid, update: &StatusUpdateRequest) -> Result<Appointment, RemoteError> {
        let path = format!("/appointments/{}/status", id);
        self.client.request(Method::PUT, &path, Some(json!(update))).await
    }

    #[instrument(skip(self))]
    async fn move_priority(&self, id: Uuid, direction: QueueDirection) -> Result<Appointment, RemoteError> {
        let path = format!("/appointments/{}/priority", id);
        let body = PriorityMoveRequest { direction };
        self.client.request(Method::PUT, &path, Some(json!(body))).await
    }

    #[instrument(skip(self))]
    async fn assign_room(&self, id: Uuid, room: Option<Room>) -> Result<(), RemoteError> {
        let path = format!("/appointments/{}/room", id);
        let body = RoomAssignmentRequest { room };
        self.client.execute(Method::PUT, &path, Some(json!(body))).await
    }

    #[instrument(skip(self))]
    async fn set_payment(&self, id: Uuid, payment_state: PaymentState) -> Result<(), RemoteError> {
        let path = format!("/appointments/{}/payment", id);
        let body = PaymentUpdateRequest { payment_state };
        self.client.execute(Method::PUT, &path, Some(json!(body))).await
    }
}

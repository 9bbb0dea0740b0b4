// libs/consultation-cell/src/services/session.rs
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use appointment_cell::{Appointment, AppointmentStatus, Mutation, OptimisticSync, StatusStateMachine};
use shared_models::events::{EventBus, FlowEvent};

use crate::models::{ConsultationError, ConsultationRecord, ConsultationSession, DraftData, SavedConsultation};
use crate::services::persistence::ConsultationPersistence;
use crate::services::timer::TimerScheduler;

/// Open consultation sessions, one per appointment. Sessions never see each
/// other: every operation touches exactly one entry of the table and one
/// timer.
#[derive(Clone)]
pub struct ConsultationSessionManager {
    sessions: Arc<RwLock<HashMap<Uuid, ConsultationSession>>>,
    timers: TimerScheduler,
    persistence: Arc<dyn ConsultationPersistence>,
    sync: OptimisticSync,
    lifecycle: StatusStateMachine,
    events: EventBus,
}

impl ConsultationSessionManager {
    pub fn new(
        sync: OptimisticSync,
        timers: TimerScheduler,
        persistence: Arc<dyn ConsultationPersistence>,
        events: EventBus,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timers,
            persistence,
            sync,
            lifecycle: StatusStateMachine::new(),
            events,
        }
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    /// Open a session for `appointment`, or bring back a closed one with its
    /// draft intact, and start its timer.
    pub async fn open(&self, appointment: &Appointment) -> Result<ConsultationSession, ConsultationError> {
        let id = appointment.id;
        let session = {
            let mut sessions = self.sessions.write().await;
            let session = sessions.entry(id).or_insert_with(|| {
                debug!("New consultation session for {}", id);
                ConsultationSession::new(id, default_draft(appointment))
            });
            session.is_open = true;
            session.is_minimized = false;
            session.clone()
        };

        self.timers.register(id).await;
        self.timers.start(id).await?;

        info!("Consultation session open for appointment {}", id);
        self.publish_change(&session);
        Ok(session)
    }

    pub async fn minimize(&self, id: Uuid) -> Result<ConsultationSession, ConsultationError> {
        let session = self.modify(id, |session| session.is_minimized = true).await?;
        self.publish_change(&session);
        Ok(session)
    }

    pub async fn restore(&self, id: Uuid) -> Result<ConsultationSession, ConsultationError> {
        let session = self.modify(id, |session| session.is_minimized = false).await?;
        self.publish_change(&session);
        Ok(session)
    }

    /// Close without saving: the draft stays, the timer pauses.
    pub async fn close(&self, id: Uuid) -> Result<ConsultationSession, ConsultationError> {
        let session = self.modify(id, |session| session.is_open = false).await?;
        self.timers.pause(id).await?;

        info!("Consultation session closed for appointment {}", id);
        self.publish_change(&session);
        Ok(session)
    }

    /// Merge one field into the draft. Last write wins.
    pub async fn update_draft(
        &self,
        id: Uuid,
        field: impl Into<String>,
        value: Value,
    ) -> Result<ConsultationSession, ConsultationError> {
        let field = field.into();
        debug!("Draft field {} updated for {}", field, id);
        let session = self
            .modify(id, |session| {
                session.draft_data.insert(field.clone(), value);
            })
            .await?;

        self.events.publish(FlowEvent::DraftUpdated {
            appointment_id: id,
            field,
        });
        Ok(session)
    }

    pub async fn session(&self, id: Uuid) -> Result<ConsultationSession, ConsultationError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ConsultationError::SessionNotFound(id))
    }

    pub async fn draft(&self, id: Uuid) -> Result<DraftData, ConsultationError> {
        self.session(id).await.map(|session| session.draft_data)
    }

    /// Every session, open or closed, ordered by appointment id.
    pub async fn sessions(&self) -> Vec<ConsultationSession> {
        let mut all: Vec<ConsultationSession> = self.sessions.read().await.values().cloned().collect();
        all.sort_by_key(|session| session.appointment_id);
        all
    }

    /// Hand the draft to the persistence collaborator. On success the session
    /// is discarded and the completion goes through the optimistic sync like
    /// any other status change. On failure nothing changes so the save can be
    /// retried.
    #[instrument(skip(self))]
    pub async fn save(&self, id: Uuid) -> Result<SavedConsultation, ConsultationError> {
        let session = self.session(id).await?;
        self.timers.state(id).await?;

        {
            let store = self.sync.store().read().await;
            let appointment = store.require(&id)?;
            self.lifecycle
                .validate(&appointment.status, &AppointmentStatus::Completed)?;
        }

        let record = ConsultationRecord {
            appointment_id: id,
            draft_data: session.draft_data,
        };
        let saved = self.persistence.save(record).await.map_err(|e| {
            warn!("Saving consultation for {} failed, session kept: {}", id, e);
            ConsultationError::DraftSaveFailed(e.to_string())
        })?;

        self.sessions.write().await.remove(&id);
        self.timers.remove(id).await;

        let completion = self
            .sync
            .apply(Mutation::Status {
                appointment_id: id,
                status: AppointmentStatus::Completed,
            })
            .await;
        if let Err(e) = completion {
            warn!("Consultation for {} stored but appointment not completed: {}", id, e);
        }

        info!("Consultation saved for appointment {}", id);
        self.events.publish(FlowEvent::SessionSaved { appointment_id: id });
        Ok(saved)
    }

    /// Pause the timer of a session whose appointment was completed without
    /// going through `save`.
    pub async fn on_appointment_completed(&self, id: Uuid) -> Result<(), ConsultationError> {
        if !self.sessions.read().await.contains_key(&id) {
            return Ok(());
        }
        self.timers.pause(id).await?;
        Ok(())
    }

    async fn modify<F>(&self, id: Uuid, change: F) -> Result<ConsultationSession, ConsultationError>
    where
        F: FnOnce(&mut ConsultationSession),
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or(ConsultationError::SessionNotFound(id))?;
        change(session);
        Ok(session.clone())
    }

    fn publish_change(&self, session: &ConsultationSession) {
        self.events.publish(FlowEvent::SessionChanged {
            appointment_id: session.appointment_id,
            is_open: session.is_open,
            is_minimized: session.is_minimized,
        });
    }
}

/// Fields every new consultation form starts with.
fn default_draft(appointment: &Appointment) -> DraftData {
    let mut draft = DraftData::new();
    draft.insert("patient_id".to_string(), json!(appointment.patient_id));
    draft.insert("visit_type".to_string(), json!(appointment.appointment_type));
    draft.insert("visit_date".to_string(), json!(appointment.date));
    draft
}

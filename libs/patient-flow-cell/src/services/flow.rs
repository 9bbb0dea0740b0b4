// libs/patient-flow-cell/src/services/flow.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use appointment_cell::{
    Appointment, AppointmentRemote, AppointmentStatus, AppointmentStore, HttpAppointmentRemote, Mutation,
    OptimisticSync, PaymentState, PendingSync, PriorityQueue, QueueDirection, Room, StatusStateMachine,
};
use consultation_cell::{
    ConsultationPersistence, ConsultationSession, ConsultationSessionManager, HttpConsultationPersistence,
    SavedConsultation, TimerScheduler, TimerState,
};
use shared_config::AppConfig;
use shared_models::events::{EventBus, EventReceiver};
use shared_utils::clock::{Clock, SystemClock};

use crate::error::FlowError;

/// The operation set exposed to the hosting layer: appointment flow, waiting
/// room, consultation sessions and their timers over one shared snapshot.
pub struct ClinicFlow {
    sync: OptimisticSync,
    sessions: ConsultationSessionManager,
    timers: TimerScheduler,
    queue: PriorityQueue,
    lifecycle: StatusStateMachine,
    events: EventBus,
    clock: Arc<dyn Clock>,
    late_grace: Duration,
}

impl ClinicFlow {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        if !config.is_configured() {
            warn!("Clinic API URL not configured; remote calls will fail and be reverted");
        }

        Self::from_parts(
            Arc::new(HttpAppointmentRemote::new(config)),
            Arc::new(HttpConsultationPersistence::new(config)),
            clock,
            Duration::minutes(config.late_grace_minutes),
        )
    }

    pub fn from_parts(
        remote: Arc<dyn AppointmentRemote>,
        persistence: Arc<dyn ConsultationPersistence>,
        clock: Arc<dyn Clock>,
        late_grace: Duration,
    ) -> Self {
        let events = EventBus::default();
        let store = AppointmentStore::new().shared();
        let timers = TimerScheduler::new(events.clone());

        let sync = OptimisticSync::new(store, remote, events.clone(), clock.clone());
        let sessions = ConsultationSessionManager::new(sync.clone(), timers.clone(), persistence, events.clone());

        Self {
            sync,
            sessions,
            timers,
            queue: PriorityQueue::new(),
            lifecycle: StatusStateMachine::new(),
            events,
            clock,
            late_grace,
        }
    }

    // ==========================================================================
    // APPOINTMENTS
    // ==========================================================================

    /// Switch to `date` and load it.
    pub async fn refresh(&self, date: NaiveDate) -> Result<usize, FlowError> {
        Ok(self.sync.load_day(date).await?)
    }

    pub async fn active_date(&self) -> Option<NaiveDate> {
        self.sync.store().read().await.active_date()
    }

    pub async fn appointments(&self) -> Vec<Appointment> {
        self.sync.store().read().await.list()
    }

    pub async fn appointment(&self, id: Uuid) -> Result<Appointment, FlowError> {
        Ok(self.sync.store().read().await.require(&id)?.clone())
    }

    pub async fn waiting_room(&self) -> Vec<Appointment> {
        self.queue.waiting_room(&*self.sync.store().read().await)
    }

    /// Apply a status change. Completing an appointment directly also stops
    /// its consultation timer.
    pub async fn apply_status(&self, id: Uuid, status: AppointmentStatus) -> Result<PendingSync, FlowError> {
        let pending = self
            .sync
            .apply(Mutation::Status {
                appointment_id: id,
                status,
            })
            .await?;

        if status == AppointmentStatus::Completed {
            self.sessions.on_appointment_completed(id).await?;
        }
        Ok(pending)
    }

    pub async fn reorder(&self, id: Uuid, direction: QueueDirection) -> Result<PendingSync, FlowError> {
        Ok(self
            .sync
            .apply(Mutation::Reorder {
                appointment_id: id,
                direction,
            })
            .await?)
    }

    pub async fn assign_room(&self, id: Uuid, room: Option<Room>) -> Result<PendingSync, FlowError> {
        Ok(self
            .sync
            .apply(Mutation::Room {
                appointment_id: id,
                room,
            })
            .await?)
    }

    /// Relay a payment flag chosen by the billing side.
    pub async fn set_payment(&self, id: Uuid, payment_state: PaymentState) -> Result<PendingSync, FlowError> {
        Ok(self
            .sync
            .apply(Mutation::Payment {
                appointment_id: id,
                payment_state,
            })
            .await?)
    }

    /// Move every scheduled appointment past its grace period to late.
    /// Returns the ids that were moved.
    pub async fn detect_late(&self) -> Vec<Uuid> {
        let now = self.clock.now().naive_utc();
        let candidates = {
            let store = self.sync.store().read().await;
            self.lifecycle.late_candidates(&store, now, self.late_grace)
        };

        let mut late = Vec::with_capacity(candidates.len());
        for id in candidates {
            match self.apply_status(id, AppointmentStatus::Late).await {
                Ok(_) => late.push(id),
                Err(e) => warn!("Could not mark appointment {} late: {}", id, e),
            }
        }

        if !late.is_empty() {
            info!("Marked {} appointments late", late.len());
        }
        late
    }

    // ==========================================================================
    // CONSULTATION SESSIONS
    // ==========================================================================

    /// Open the consultation for `id` and start its timer. A patient still in
    /// the waiting room is called in first; if the server refuses that, the
    /// session is closed again once the appointment is back out of
    /// `in_progress`, which pauses the timer and keeps the draft.
    ///
    /// Opening starts the timer, so a toggle right after opening pauses it.
    pub async fn open_session(&self, id: Uuid) -> Result<ConsultationSession, FlowError> {
        let appointment = self.appointment(id).await?;
        if appointment.status != AppointmentStatus::Waiting {
            return Ok(self.sessions.open(&appointment).await?);
        }

        let promotion = self.apply_status(id, AppointmentStatus::InProgress).await?;
        let session = self.sessions.open(&promotion.appointment).await?;
        if promotion.is_in_flight() {
            self.close_if_promotion_fails(id, promotion);
        }
        Ok(session)
    }

    fn close_if_promotion_fails(&self, id: Uuid, promotion: PendingSync) {
        let sessions = self.sessions.clone();
        let store = self.sync.store().clone();
        tokio::spawn(async move {
            let outcome = promotion.settled_outcome().await;
            if !outcome.is_failure() {
                return;
            }

            let status = store.read().await.get(&id).map(|apt| apt.status);
            if status == Some(AppointmentStatus::InProgress) {
                return;
            }
            warn!("Call-in of {} was not accepted, closing its consultation", id);
            if let Err(e) = sessions.close(id).await {
                warn!("Could not close consultation {}: {}", id, e);
            }
        });
    }

    pub async fn minimize_session(&self, id: Uuid) -> Result<ConsultationSession, FlowError> {
        Ok(self.sessions.minimize(id).await?)
    }

    pub async fn restore_session(&self, id: Uuid) -> Result<ConsultationSession, FlowError> {
        Ok(self.sessions.restore(id).await?)
    }

    pub async fn close_session(&self, id: Uuid) -> Result<ConsultationSession, FlowError> {
        Ok(self.sessions.close(id).await?)
    }

    pub async fn update_draft(&self, id: Uuid, field: String, value: Value) -> Result<ConsultationSession, FlowError> {
        Ok(self.sessions.update_draft(id, field, value).await?)
    }

    pub async fn save_session(&self, id: Uuid) -> Result<SavedConsultation, FlowError> {
        Ok(self.sessions.save(id).await?)
    }

    pub async fn session(&self, id: Uuid) -> Result<ConsultationSession, FlowError> {
        Ok(self.sessions.session(id).await?)
    }

    pub async fn sessions(&self) -> Vec<ConsultationSession> {
        self.sessions.sessions().await
    }

    // ==========================================================================
    // TIMERS
    // ==========================================================================

    /// Flip the timer between running and paused. Timers start running when
    /// their session opens.
    pub async fn toggle_timer(&self, id: Uuid) -> Result<TimerState, FlowError> {
        Ok(self.timers.toggle(id).await?)
    }

    pub async fn reset_timer(&self, id: Uuid) -> Result<TimerState, FlowError> {
        Ok(self.timers.reset(id).await?)
    }

    pub async fn timer(&self, id: Uuid) -> Result<TimerState, FlowError> {
        Ok(self.timers.state(id).await?)
    }

    /// Start the shared one-second tick.
    pub fn start_ticker(&self) -> JoinHandle<()> {
        self.timers.spawn()
    }

    pub async fn tick(&self) {
        self.timers.tick().await;
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

// libs/consultation-cell/src/services/timer.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_models::events::{EventBus, FlowEvent, TimerReading};

use crate::models::{ConsultationError, TimerState};

/// Period of the shared scheduler tick.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Owns every consultation timer and advances the running ones on a single
/// shared tick.
#[derive(Clone)]
pub struct TimerScheduler {
    timers: Arc<RwLock<HashMap<Uuid, TimerState>>>,
    events: EventBus,
}

impl TimerScheduler {
    pub fn new(events: EventBus) -> Self {
        Self {
            timers: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Make sure `id` has a timer. New timers start paused at zero; an
    /// existing timer is returned as is.
    pub async fn register(&self, id: Uuid) -> TimerState {
        let mut timers = self.timers.write().await;
        *timers.entry(id).or_insert_with(|| {
            debug!("Registered timer for {}", id);
            TimerState::default()
        })
    }

    pub async fn start(&self, id: Uuid) -> Result<TimerState, ConsultationError> {
        self.update(id, |timer| timer.is_running = true).await
    }

    pub async fn pause(&self, id: Uuid) -> Result<TimerState, ConsultationError> {
        self.update(id, |timer| timer.is_running = false).await
    }

    pub async fn toggle(&self, id: Uuid) -> Result<TimerState, ConsultationError> {
        self.update(id, |timer| timer.is_running = !timer.is_running).await
    }

    pub async fn reset(&self, id: Uuid) -> Result<TimerState, ConsultationError> {
        self.update(id, |timer| *timer = TimerState::default()).await
    }

    pub async fn remove(&self, id: Uuid) -> Option<TimerState> {
        let removed = self.timers.write().await.remove(&id);
        if removed.is_some() {
            debug!("Removed timer for {}", id);
        }
        removed
    }

    pub async fn state(&self, id: Uuid) -> Result<TimerState, ConsultationError> {
        let timers = self.timers.read().await;
        timers.get(&id).copied().ok_or_else(|| missing(id))
    }

    /// Advance every running timer by one second. Paused timers are left
    /// alone. Returns the readings of the timers that moved.
    pub async fn tick(&self) -> Vec<TimerReading> {
        let readings: Vec<TimerReading> = {
            let mut timers = self.timers.write().await;
            timers
                .iter_mut()
                .filter(|(_, timer)| timer.is_running)
                .map(|(id, timer)| {
                    timer.seconds += 1;
                    reading(*id, timer)
                })
                .collect()
        };

        if !readings.is_empty() {
            self.events.publish(FlowEvent::TimersTicked {
                readings: readings.clone(),
            });
        }
        readings
    }

    /// Drive [`tick`](Self::tick) every [`TICK_PERIOD`] until the handle is
    /// aborted.
    pub fn spawn(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            interval.tick().await;

            info!("Consultation timer ticker started");
            loop {
                interval.tick().await;
                scheduler.tick().await;
            }
        })
    }

    async fn update<F>(&self, id: Uuid, change: F) -> Result<TimerState, ConsultationError>
    where
        F: FnOnce(&mut TimerState),
    {
        let state = {
            let mut timers = self.timers.write().await;
            let timer = timers.get_mut(&id).ok_or_else(|| missing(id))?;
            change(timer);
            *timer
        };

        self.events.publish(FlowEvent::TimerChanged(reading(id, &state)));
        Ok(state)
    }
}

fn reading(appointment_id: Uuid, timer: &TimerState) -> TimerReading {
    TimerReading {
        appointment_id,
        seconds: timer.seconds,
        is_running: timer.is_running,
    }
}

fn missing(id: Uuid) -> ConsultationError {
    error!("Timer lookup for {} failed: no timer registered", id);
    ConsultationError::MissingTimer(id)
}

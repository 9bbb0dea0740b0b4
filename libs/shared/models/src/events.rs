use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

pub type EventReceiver = broadcast::Receiver<FlowEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimerReading {
    pub appointment_id: Uuid,
    pub seconds: u64,
    pub is_running: bool,
}

/// Change notifications published to the hosting layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    AppointmentChanged {
        appointment_id: Uuid,
        version: u64,
    },
    QueueReordered {
        order: Vec<Uuid>,
    },
    SnapshotReloaded {
        date: NaiveDate,
        count: usize,
    },
    SyncFailed {
        appointment_id: Uuid,
        mutation: String,
        message: String,
        reverted: bool,
    },
    SessionChanged {
        appointment_id: Uuid,
        is_open: bool,
        is_minimized: bool,
    },
    DraftUpdated {
        appointment_id: Uuid,
        field: String,
    },
    SessionSaved {
        appointment_id: Uuid,
    },
    TimerChanged(TimerReading),
    TimersTicked {
        readings: Vec<TimerReading>,
    },
}

/// Fan-out channel for [`FlowEvent`]s. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: FlowEvent) {
        if let Err(e) = self.sender.send(event) {
            // No subscribers yet; not an error for the core.
            debug!("Dropped flow event without subscribers: {:?}", e.0);
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

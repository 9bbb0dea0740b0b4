#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use tokio::sync::Notify;
use uuid::Uuid;

use appointment_cell::*;
use shared_database::RemoteError;
use shared_utils::test_utils::test_day;

pub fn appointment(id: Uuid, status: AppointmentStatus, time: &str) -> Appointment {
    Appointment {
        id,
        patient_id: Uuid::new_v4(),
        date: test_day(),
        time: NaiveTime::parse_from_str(time, "%H:%M").expect("fixture time"),
        status,
        room: None,
        priority: None,
        waiting_since: None,
        wait_duration_minutes: None,
        payment_state: PaymentState::Unpaid,
        appointment_type: AppointmentType::Visit,
        version: 0,
    }
}

pub fn store_with(records: Vec<Appointment>) -> AppointmentStore {
    let mut store = AppointmentStore::new();
    store.set_active_date(test_day());
    for record in records {
        store.upsert(record);
    }
    store
}

/// Scripted remote: every write can be failed or held back on a gate.
#[derive(Default)]
pub struct FakeRemote {
    pub day: Mutex<Vec<Appointment>>,
    pub fetch_failure: Mutex<Option<RemoteError>>,
    pub status_failure: Mutex<Option<RemoteError>>,
    pub priority_failure: Mutex<Option<RemoteError>>,
    pub room_failure: Mutex<Option<RemoteError>>,
    pub status_gate: Mutex<Option<Arc<Notify>>>,
    pub room_hold: Mutex<Option<(Arc<Notify>, RemoteError)>>,
    pub server_wait_duration: Mutex<Option<i64>>,
    pub fetch_calls: AtomicUsize,
    pub status_calls: Mutex<Vec<(Uuid, StatusUpdateRequest)>>,
    pub priority_calls: AtomicUsize,
    pub room_calls: AtomicUsize,
    pub payment_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn with_day(records: Vec<Appointment>) -> Arc<Self> {
        let remote = Self::default();
        *remote.day.lock().unwrap() = records;
        Arc::new(remote)
    }

    pub fn fail_status(&self, error: RemoteError) {
        *self.status_failure.lock().unwrap() = Some(error);
    }

    pub fn fail_fetch(&self, error: RemoteError) {
        *self.fetch_failure.lock().unwrap() = Some(error);
    }

    pub fn hold_status(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.status_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// The next room assignment waits on the returned gate, then fails with
    /// `error`. Later assignments go through.
    pub fn hold_room_then_fail(&self, error: RemoteError) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.room_hold.lock().unwrap() = Some((gate.clone(), error));
        gate
    }

    /// Yield until the first room assignment reached the remote.
    pub async fn room_call_started(&self) {
        while self.room_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn echo(&self, id: Uuid) -> Result<Appointment, RemoteError> {
        self.day
            .lock()
            .unwrap()
            .iter()
            .find(|apt| apt.id == id)
            .cloned()
            .ok_or_else(|| RemoteError::Rejected {
                status: 404,
                message: "unknown appointment".to_string(),
            })
    }
}

#[async_trait]
impl AppointmentRemote for FakeRemote {
    async fn fetch_day(&self, date: NaiveDate) -> Result<Vec<Appointment>, RemoteError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fetch_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self
            .day
            .lock()
            .unwrap()
            .iter()
            .filter(|apt| apt.date == date)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdateRequest) -> Result<Appointment, RemoteError> {
        self.status_calls.lock().unwrap().push((id, update.clone()));

        let gate = self.status_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(error) = self.status_failure.lock().unwrap().clone() {
            return Err(error);
        }

        let mut record = self.echo(id)?;
        record.status = update.status;
        record.wait_duration_minutes = *self.server_wait_duration.lock().unwrap();
        Ok(record)
    }

    async fn move_priority(&self, id: Uuid, _direction: QueueDirection) -> Result<Appointment, RemoteError> {
        self.priority_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.priority_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.echo(id)
    }

    async fn assign_room(&self, _id: Uuid, _room: Option<Room>) -> Result<(), RemoteError> {
        self.room_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.room_hold.lock().unwrap().take();
        if let Some((gate, error)) = hold {
            gate.notified().await;
            return Err(error);
        }
        match self.room_failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn set_payment(&self, _id: Uuid, _payment_state: PaymentState) -> Result<(), RemoteError> {
        self.payment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Priorities of the waiting room keyed by id.
pub fn priorities(store: &AppointmentStore) -> HashMap<Uuid, u32> {
    store
        .list()
        .into_iter()
        .filter_map(|apt| apt.priority.map(|p| (apt.id, p)))
        .collect()
}

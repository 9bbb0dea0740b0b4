// libs/appointment-cell/src/services/store.rs
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError};
use crate::services::queue::PriorityQueue;

pub type SharedStore = Arc<RwLock<AppointmentStore>>;

/// Fields a local change touches. Compensations are gated on the group they
/// undo, so unrelated changes on the same appointment do not block them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    /// Status, waiting slot and queue priority.
    Placement,
    Room,
    Payment,
}

/// Last version at which each field group of one appointment changed.
#[derive(Debug, Default, Clone, Copy)]
struct VersionStamps {
    latest: u64,
    placement: u64,
    room: u64,
    payment: u64,
}

impl VersionStamps {
    fn all_at(version: u64) -> Self {
        Self {
            latest: version,
            placement: version,
            room: version,
            payment: version,
        }
    }

    fn get(&self, group: FieldGroup) -> u64 {
        match group {
            FieldGroup::Placement => self.placement,
            FieldGroup::Room => self.room,
            FieldGroup::Payment => self.payment,
        }
    }

    fn mark(&mut self, group: FieldGroup, version: u64) {
        self.latest = version;
        match group {
            FieldGroup::Placement => self.placement = version,
            FieldGroup::Room => self.room = version,
            FieldGroup::Payment => self.payment = version,
        }
    }
}

/// Local snapshot of the active day's appointments.
///
/// Components outside this crate only read from it; every write goes through
/// the state machine, the priority queue or the sync service.
#[derive(Debug, Default)]
pub struct AppointmentStore {
    active_date: Option<NaiveDate>,
    appointments: HashMap<Uuid, Appointment>,
    /// Survives eviction and removal so versions never repeat for an id.
    stamps: HashMap<Uuid, VersionStamps>,
}

impl AppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn active_date(&self) -> Option<NaiveDate> {
        self.active_date
    }

    /// Switch the view to `date`, evicting every appointment of another day.
    /// Returns the number of evicted entries.
    pub fn set_active_date(&mut self, date: NaiveDate) -> usize {
        if self.active_date == Some(date) {
            return 0;
        }

        let before = self.appointments.len();
        self.appointments.retain(|_, apt| apt.date == date);
        self.active_date = Some(date);
        PriorityQueue::new().normalize(self);

        let evicted = before - self.appointments.len();
        info!("Active date set to {} ({} appointments evicted)", date, evicted);
        evicted
    }

    pub fn get(&self, id: &Uuid) -> Option<&Appointment> {
        self.appointments.get(id)
    }

    pub fn require(&self, id: &Uuid) -> Result<&Appointment, AppointmentError> {
        self.appointments.get(id).ok_or(AppointmentError::NotFound(*id))
    }

    pub(crate) fn require_mut(&mut self, id: &Uuid) -> Result<&mut Appointment, AppointmentError> {
        self.appointments.get_mut(id).ok_or(AppointmentError::NotFound(*id))
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Appointment> {
        self.appointments.values()
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Appointment> {
        self.appointments.values_mut()
    }

    pub fn version(&self, id: &Uuid) -> Option<u64> {
        self.appointments.get(id).map(|apt| apt.version)
    }

    /// Version at which `group` of `id` last changed.
    pub fn group_version(&self, id: &Uuid, group: FieldGroup) -> Option<u64> {
        if !self.appointments.contains_key(id) {
            return None;
        }
        self.stamps.get(id).map(|stamps| stamps.get(group))
    }

    pub(crate) fn bump_version(&mut self, id: &Uuid, group: FieldGroup) -> Result<u64, AppointmentError> {
        let apt = self.appointments.get_mut(id).ok_or(AppointmentError::NotFound(*id))?;
        let stamps = self.stamps.entry(*id).or_default();
        let version = apt.version.max(stamps.latest) + 1;
        apt.version = version;
        stamps.mark(group, version);
        Ok(version)
    }

    /// Give an incoming record a version above anything this id ever had
    /// locally. Every field group counts as changed.
    fn stamp_incoming(&mut self, record: &mut Appointment) {
        if let Some(stamps) = self.stamps.get(&record.id) {
            record.version = record.version.max(stamps.latest + 1);
        }
        self.stamps.insert(record.id, VersionStamps::all_at(record.version));
    }

    /// All appointments of the view in schedule order.
    pub fn list(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.appointments.values().cloned().collect();
        all.sort_by_key(|apt| (apt.date, apt.time, apt.id));
        all
    }

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    /// Replace the snapshot with a fresh fetch of `date`.
    ///
    /// Returns `None` when the view moved to another day while the fetch was in
    /// flight. Versions of known ids always advance, including ids evicted by
    /// an earlier day switch, so that any pending compensation recorded
    /// against an older snapshot is stale.
    pub fn replace_day(&mut self, date: NaiveDate, records: Vec<Appointment>) -> Option<usize> {
        if self.active_date != Some(date) {
            debug!("Discarding snapshot for {}: view is on {:?}", date, self.active_date);
            return None;
        }

        let mut fresh = HashMap::with_capacity(records.len());
        for mut record in records.into_iter().filter(|r| r.date == date) {
            self.stamp_incoming(&mut record);
            fresh.insert(record.id, record);
        }

        self.appointments = fresh;
        PriorityQueue::new().normalize(self);

        debug!("Snapshot for {} replaced with {} appointments", date, self.appointments.len());
        Some(self.appointments.len())
    }

    /// Insert or replace one record pushed by the booking side.
    /// Records outside the active day are ignored.
    pub fn upsert(&mut self, mut record: Appointment) -> bool {
        if let Some(date) = self.active_date {
            if record.date != date {
                debug!("Ignoring appointment {} outside active date {}", record.id, date);
                return false;
            }
        }

        self.stamp_incoming(&mut record);

        let id = record.id;
        let waiting_without_slot = record.is_waiting() && record.priority.is_none();
        self.appointments.insert(id, record);

        let queue = PriorityQueue::new();
        if waiting_without_slot {
            queue.enqueue(self, &id);
        } else {
            queue.normalize(self);
        }
        true
    }

    /// Evict an appointment deleted upstream.
    pub fn remove(&mut self, id: &Uuid) -> Option<Appointment> {
        let removed = self.appointments.remove(id);
        if removed.is_some() {
            PriorityQueue::new().normalize(self);
            debug!("Appointment {} removed from snapshot", id);
        }
        removed
    }
}

// libs/appointment-cell/src/services/queue.rs
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, QueueDirection};
use crate::services::store::{AppointmentStore, FieldGroup};

/// Result of a single `reorder` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ReorderOutcome {
    pub moved: bool,
    /// Entry that swapped places with the moved one.
    pub displaced: Option<Uuid>,
    /// Waiting room after the move, front first.
    pub order: Vec<Uuid>,
}

/// Keeps waiting appointments in a contiguous `0..n` priority order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityQueue;

impl PriorityQueue {
    pub fn new() -> Self {
        Self
    }

    /// Waiting appointment ids, front of the queue first.
    ///
    /// Unset priorities sort after set ones; equal priorities fall back to id
    /// order so the result is deterministic.
    pub fn ordered_ids(&self, store: &AppointmentStore) -> Vec<Uuid> {
        let mut waiting: Vec<&Appointment> = store.values().filter(|apt| apt.is_waiting()).collect();
        waiting.sort_by_key(|apt| (apt.priority.is_none(), apt.priority, apt.id));
        waiting.into_iter().map(|apt| apt.id).collect()
    }

    pub fn waiting_room(&self, store: &AppointmentStore) -> Vec<Appointment> {
        self.ordered_ids(store)
            .iter()
            .filter_map(|id| store.get(id).cloned())
            .collect()
    }

    /// Move `id` one slot towards the front or the back of the waiting room.
    ///
    /// Moving past either end is a no-op. Both swapped entries get their
    /// placement version bumped.
    pub fn reorder(
        &self,
        store: &mut AppointmentStore,
        id: Uuid,
        direction: QueueDirection,
    ) -> Result<ReorderOutcome, AppointmentError> {
        if !store.require(&id)?.is_waiting() {
            warn!("Reorder requested for appointment {} which is not waiting", id);
            return Err(AppointmentError::NotInQueue(id));
        }

        let mut order = self.ordered_ids(store);
        let position = order
            .iter()
            .position(|entry| *entry == id)
            .ok_or(AppointmentError::NotInQueue(id))?;

        let target = match direction {
            QueueDirection::Earlier if position == 0 => None,
            QueueDirection::Earlier => Some(position - 1),
            QueueDirection::Later if position + 1 == order.len() => None,
            QueueDirection::Later => Some(position + 1),
        };

        let Some(target) = target else {
            debug!("Appointment {} already at the {:?} boundary", id, direction);
            self.assign(store, &order);
            return Ok(ReorderOutcome {
                moved: false,
                displaced: None,
                order,
            });
        };

        let moved = order.remove(position);
        order.insert(target, moved);
        let displaced = order[position];

        self.assign(store, &order);
        store.bump_version(&id, FieldGroup::Placement)?;
        store.bump_version(&displaced, FieldGroup::Placement)?;

        debug!("Appointment {} moved {:?} to position {}", id, direction, target);
        Ok(ReorderOutcome {
            moved: true,
            displaced: Some(displaced),
            order,
        })
    }

    /// Reassign `0..n` to the waiting room and clear priorities elsewhere.
    pub fn normalize(&self, store: &mut AppointmentStore) {
        for apt in store.values_mut().filter(|apt| !apt.is_waiting()) {
            apt.priority = None;
        }
        let order = self.ordered_ids(store);
        self.assign(store, &order);
    }

    /// Put a freshly waiting appointment at the back of the queue.
    pub(crate) fn enqueue(&self, store: &mut AppointmentStore, id: &Uuid) {
        let mut order: Vec<Uuid> = self
            .ordered_ids(store)
            .into_iter()
            .filter(|entry| entry != id)
            .collect();
        order.push(*id);
        self.assign(store, &order);
    }

    /// Put `id` back at `position` (clamped to the queue length).
    pub(crate) fn insert_at(&self, store: &mut AppointmentStore, id: &Uuid, position: usize) {
        let mut order: Vec<Uuid> = self
            .ordered_ids(store)
            .into_iter()
            .filter(|entry| entry != id)
            .collect();
        order.insert(position.min(order.len()), *id);
        self.assign(store, &order);
    }

    fn assign(&self, store: &mut AppointmentStore, order: &[Uuid]) {
        for (index, id) in order.iter().enumerate() {
            if let Ok(apt) = store.require_mut(id) {
                apt.priority = Some(index as u32);
            }
        }
    }
}

// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::queue::PriorityQueue;
use crate::services::store::{AppointmentStore, FieldGroup};

/// Status-related fields captured before a transition, used to undo it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: AppointmentStatus,
    pub waiting_since: Option<DateTime<Utc>>,
    pub wait_duration_minutes: Option<i64>,
    pub priority: Option<u32>,
}

impl From<&Appointment> for StatusSnapshot {
    fn from(apt: &Appointment) -> Self {
        Self {
            status: apt.status,
            waiting_since: apt.waiting_since,
            wait_duration_minutes: apt.wait_duration_minutes,
            priority: apt.priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub previous: StatusSnapshot,
    /// False for a same-status resubmission.
    pub changed: bool,
    pub appointment: Appointment,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusStateMachine {
    queue: PriorityQueue,
}

impl StatusStateMachine {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
        }
    }

    /// Get all valid next statuses for a given current status
    pub fn valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Waiting,
                AppointmentStatus::Late,
                AppointmentStatus::Absent,
            ],
            AppointmentStatus::Late => vec![
                AppointmentStatus::Waiting,
                AppointmentStatus::Absent,
            ],
            AppointmentStatus::Waiting => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Absent,
            ],
            AppointmentStatus::InProgress => vec![AppointmentStatus::Completed],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Absent => vec![],
        }
    }

    /// Validate that a status transition is allowed. Resubmitting the current
    /// status is always accepted.
    pub fn validate(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if current_status == new_status {
            return Ok(());
        }

        if !self.valid_transitions(current_status).contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidTransition {
                from: *current_status,
                to: *new_status,
            });
        }

        Ok(())
    }

    /// Apply `target` to appointment `id` at instant `now`.
    pub fn apply(
        &self,
        store: &mut AppointmentStore,
        id: Uuid,
        target: AppointmentStatus,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, AppointmentError> {
        let current = store.require(&id)?;
        let previous = StatusSnapshot::from(current);

        if current.status == target {
            debug!("Appointment {} already {}, nothing to apply", id, target);
            return Ok(TransitionOutcome {
                previous,
                changed: false,
                appointment: current.clone(),
            });
        }

        self.validate(&current.status, &target)?;

        {
            let apt = store.require_mut(&id)?;
            apt.status = target;

            match target {
                AppointmentStatus::Waiting => {
                    apt.waiting_since = Some(now);
                }
                AppointmentStatus::InProgress => {
                    apt.wait_duration_minutes = apt
                        .waiting_since
                        .map(|since| (now - since).num_minutes().max(0));
                }
                _ => {}
            }
        }

        if previous.status == AppointmentStatus::Waiting {
            self.queue.normalize(store);
        }
        if target == AppointmentStatus::Waiting {
            self.queue.enqueue(store, &id);
        }
        store.bump_version(&id, FieldGroup::Placement)?;

        info!("Appointment {} moved {} -> {}", id, previous.status, target);
        Ok(TransitionOutcome {
            previous,
            changed: true,
            appointment: store.require(&id)?.clone(),
        })
    }

    /// Put the status fields of `id` back to `snapshot`, bypassing the
    /// transition table. Counts as a change for versioning.
    pub fn restore(
        &self,
        store: &mut AppointmentStore,
        id: Uuid,
        snapshot: &StatusSnapshot,
    ) -> Result<(), AppointmentError> {
        let was_waiting = {
            let apt = store.require_mut(&id)?;
            let was_waiting = apt.is_waiting();
            apt.status = snapshot.status;
            apt.waiting_since = snapshot.waiting_since;
            apt.wait_duration_minutes = snapshot.wait_duration_minutes;
            apt.priority = None;
            was_waiting
        };

        if snapshot.status == AppointmentStatus::Waiting {
            let position = snapshot.priority.map_or(usize::MAX, |p| p as usize);
            self.queue.insert_at(store, &id, position);
        } else if was_waiting {
            self.queue.normalize(store);
        }
        store.bump_version(&id, FieldGroup::Placement)?;

        info!("Appointment {} restored to {}", id, snapshot.status);
        Ok(())
    }

    /// Scheduled appointments whose slot plus `grace` has already passed.
    pub fn late_candidates(
        &self,
        store: &AppointmentStore,
        local_now: NaiveDateTime,
        grace: Duration,
    ) -> Vec<Uuid> {
        let mut late: Vec<&Appointment> = store
            .values()
            .filter(|apt| apt.status == AppointmentStatus::Scheduled)
            .filter(|apt| apt.scheduled_at() + grace < local_now)
            .collect();
        late.sort_by_key(|apt| (apt.scheduled_at(), apt.id));
        late.into_iter().map(|apt| apt.id).collect()
    }
}

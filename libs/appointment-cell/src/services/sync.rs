// libs/appointment-cell/src/services/sync.rs
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_database::RemoteError;
use shared_models::events::{EventBus, FlowEvent};
use shared_utils::clock::Clock;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, Mutation, StatusUpdateRequest};
use crate::services::lifecycle::StatusStateMachine;
use crate::services::queue::PriorityQueue;
use crate::services::remote::AppointmentRemote;
use crate::services::store::{AppointmentStore, FieldGroup, SharedStore};

/// Inverse of a locally-applied mutation.
type Compensation = Box<dyn FnOnce(&mut AppointmentStore) -> Result<(), AppointmentError> + Send>;

/// How a mutation ended once the remote call resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncResolution {
    /// Nothing changed locally, so nothing was sent.
    Unchanged,
    Confirmed,
    /// The remote call failed and the local change was undone.
    Reverted(AppointmentError),
    /// The remote call failed but a newer local change had already landed on
    /// the appointment, so the undo was skipped.
    Superseded(AppointmentError),
    /// The background task died before resolving.
    Abandoned(String),
}

impl SyncResolution {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncResolution::Reverted(_) | SyncResolution::Superseded(_) | SyncResolution::Abandoned(_)
        )
    }
}

/// Handle returned by [`OptimisticSync::apply`]: the local state right after
/// the mutation, plus the in-flight remote call.
#[derive(Debug)]
pub struct PendingSync {
    pub appointment: Appointment,
    task: Option<JoinHandle<SyncResolution>>,
}

impl PendingSync {
    fn settled(appointment: Appointment) -> Self {
        Self {
            appointment,
            task: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.task.is_some()
    }

    /// Wait for the remote side of the mutation.
    pub async fn settled_outcome(self) -> SyncResolution {
        match self.task {
            None => SyncResolution::Unchanged,
            Some(task) => task
                .await
                .unwrap_or_else(|e| SyncResolution::Abandoned(e.to_string())),
        }
    }
}

struct AppliedMutation {
    mutation: Mutation,
    /// Version of `group` right after the local change.
    version: u64,
    group: FieldGroup,
    appointment: Appointment,
    compensation: Compensation,
    queue_changed: bool,
}

enum LocalOutcome {
    Unchanged(Appointment),
    Applied(AppliedMutation),
}

/// Applies mutations to the local snapshot first, then mirrors them to the
/// remote service and reconciles the result.
#[derive(Clone)]
pub struct OptimisticSync {
    store: SharedStore,
    remote: Arc<dyn AppointmentRemote>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    lifecycle: StatusStateMachine,
    queue: PriorityQueue,
}

impl OptimisticSync {
    pub fn new(
        store: SharedStore,
        remote: Arc<dyn AppointmentRemote>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            remote,
            events,
            clock,
            lifecycle: StatusStateMachine::new(),
            queue: PriorityQueue::new(),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Apply `mutation` locally and start mirroring it remotely.
    ///
    /// Local rule violations are returned here and never reach the network.
    /// Remote failures are handled by the background task: revert when still
    /// current, notify, then refetch once.
    pub async fn apply(&self, mutation: Mutation) -> Result<PendingSync, AppointmentError> {
        let now = self.clock.now();
        let outcome = {
            let mut store = self.store.write().await;
            self.apply_local(&mut *store, &mutation, now)?
        };

        let applied = match outcome {
            LocalOutcome::Unchanged(appointment) => return Ok(PendingSync::settled(appointment)),
            LocalOutcome::Applied(applied) => applied,
        };

        self.publish_local(applied.appointment.id, applied.version, applied.queue_changed)
            .await;

        let appointment = applied.appointment.clone();
        let sync = self.clone();
        let task = tokio::spawn(async move { sync.persist(applied).await });

        Ok(PendingSync {
            appointment,
            task: Some(task),
        })
    }

    /// Switch the view to `date` and load it from the remote service.
    pub async fn load_day(&self, date: NaiveDate) -> Result<usize, AppointmentError> {
        {
            let mut store = self.store.write().await;
            store.set_active_date(date);
        }
        self.fetch_into_store(date).await
    }

    /// Reload the active day. Without an active day there is nothing to do.
    pub async fn refetch(&self) -> Result<usize, AppointmentError> {
        let date = self.store.read().await.active_date();
        match date {
            Some(date) => self.fetch_into_store(date).await,
            None => {
                debug!("Refetch skipped: no active date");
                Ok(0)
            }
        }
    }

    fn apply_local(
        &self,
        store: &mut AppointmentStore,
        mutation: &Mutation,
        now: DateTime<Utc>,
    ) -> Result<LocalOutcome, AppointmentError> {
        match *mutation {
            Mutation::Status { appointment_id, status } => {
                let outcome = self.lifecycle.apply(store, appointment_id, status, now)?;
                if !outcome.changed {
                    return Ok(LocalOutcome::Unchanged(outcome.appointment));
                }

                let queue_changed = outcome.previous.status == AppointmentStatus::Waiting
                    || status == AppointmentStatus::Waiting;
                let lifecycle = self.lifecycle;
                let previous = outcome.previous;

                Ok(LocalOutcome::Applied(AppliedMutation {
                    mutation: mutation.clone(),
                    version: outcome.appointment.version,
                    group: FieldGroup::Placement,
                    appointment: outcome.appointment,
                    compensation: Box::new(move |store: &mut AppointmentStore| {
                        lifecycle.restore(store, appointment_id, &previous)
                    }),
                    queue_changed,
                }))
            }
            Mutation::Reorder { appointment_id, direction } => {
                let outcome = self.queue.reorder(store, appointment_id, direction)?;
                let appointment = store.require(&appointment_id)?.clone();
                if !outcome.moved {
                    return Ok(LocalOutcome::Unchanged(appointment));
                }

                let queue = self.queue;
                Ok(LocalOutcome::Applied(AppliedMutation {
                    mutation: mutation.clone(),
                    version: appointment.version,
                    group: FieldGroup::Placement,
                    appointment,
                    compensation: Box::new(move |store: &mut AppointmentStore| {
                        queue.reorder(store, appointment_id, direction.opposite()).map(|_| ())
                    }),
                    queue_changed: true,
                }))
            }
            Mutation::Room { appointment_id, room } => {
                let apt = store.require_mut(&appointment_id)?;
                if apt.room == room {
                    return Ok(LocalOutcome::Unchanged(apt.clone()));
                }
                let previous = apt.room;
                apt.room = room;
                store.bump_version(&appointment_id, FieldGroup::Room)?;

                let appointment = store.require(&appointment_id)?.clone();
                Ok(LocalOutcome::Applied(AppliedMutation {
                    mutation: mutation.clone(),
                    version: appointment.version,
                    group: FieldGroup::Room,
                    appointment,
                    compensation: Box::new(move |store: &mut AppointmentStore| {
                        store.require_mut(&appointment_id)?.room = previous;
                        store.bump_version(&appointment_id, FieldGroup::Room).map(|_| ())
                    }),
                    queue_changed: false,
                }))
            }
            Mutation::Payment { appointment_id, payment_state } => {
                let apt = store.require_mut(&appointment_id)?;
                if apt.payment_state == payment_state {
                    return Ok(LocalOutcome::Unchanged(apt.clone()));
                }
                let previous = apt.payment_state;
                apt.payment_state = payment_state;
                store.bump_version(&appointment_id, FieldGroup::Payment)?;

                let appointment = store.require(&appointment_id)?.clone();
                Ok(LocalOutcome::Applied(AppliedMutation {
                    mutation: mutation.clone(),
                    version: appointment.version,
                    group: FieldGroup::Payment,
                    appointment,
                    compensation: Box::new(move |store: &mut AppointmentStore| {
                        store.require_mut(&appointment_id)?.payment_state = previous;
                        store.bump_version(&appointment_id, FieldGroup::Payment).map(|_| ())
                    }),
                    queue_changed: false,
                }))
            }
        }
    }

    async fn publish_local(&self, appointment_id: Uuid, version: u64, queue_changed: bool) {
        self.events.publish(FlowEvent::AppointmentChanged {
            appointment_id,
            version,
        });

        if queue_changed {
            let order = self.queue.ordered_ids(&*self.store.read().await);
            self.events.publish(FlowEvent::QueueReordered { order });
        }
    }

    #[instrument(skip(self, applied), fields(appointment_id = %applied.mutation.appointment_id(), kind = applied.mutation.kind()))]
    async fn persist(self, applied: AppliedMutation) -> SyncResolution {
        let AppliedMutation {
            mutation,
            version,
            group,
            appointment,
            compensation,
            ..
        } = applied;

        match self.dispatch(&mutation, &appointment).await {
            Ok(server_record) => {
                if let Some(server_record) = server_record {
                    self.merge_server_fields(group, version, &server_record).await;
                }
                debug!("Remote confirmed {} on {}", mutation.kind(), mutation.appointment_id());
                SyncResolution::Confirmed
            }
            Err(remote_error) => {
                let error = AppointmentError::from(remote_error);
                warn!("Remote {} failed for {}: {}", mutation.kind(), mutation.appointment_id(), error);

                let reverted = self
                    .compensate(mutation.appointment_id(), group, version, compensation)
                    .await;

                self.events.publish(FlowEvent::SyncFailed {
                    appointment_id: mutation.appointment_id(),
                    mutation: mutation.kind().to_string(),
                    message: error.to_string(),
                    reverted,
                });

                if let Err(e) = self.refetch().await {
                    warn!("Resynchronization after failed {} did not complete: {}", mutation.kind(), e);
                }

                if reverted {
                    SyncResolution::Reverted(error)
                } else {
                    SyncResolution::Superseded(error)
                }
            }
        }
    }

    /// Issue the remote write. Returns the server's record when the endpoint
    /// sends one back and it may carry corrected fields.
    async fn dispatch(
        &self,
        mutation: &Mutation,
        appointment: &Appointment,
    ) -> Result<Option<Appointment>, RemoteError> {
        match *mutation {
            Mutation::Status { appointment_id, status } => {
                let update = StatusUpdateRequest {
                    status,
                    waiting_since: if status == AppointmentStatus::Waiting {
                        appointment.waiting_since
                    } else {
                        None
                    },
                };
                self.remote.update_status(appointment_id, &update).await.map(Some)
            }
            // The local recompute stays authoritative until the next refetch.
            Mutation::Reorder { appointment_id, direction } => self
                .remote
                .move_priority(appointment_id, direction)
                .await
                .map(|_| None),
            Mutation::Room { appointment_id, room } => {
                self.remote.assign_room(appointment_id, room).await.map(|_| None)
            }
            Mutation::Payment { appointment_id, payment_state } => self
                .remote
                .set_payment(appointment_id, payment_state)
                .await
                .map(|_| None),
        }
    }

    /// Take server-derived fields from a confirmed write, unless the entry
    /// changed locally in the meantime.
    async fn merge_server_fields(&self, group: FieldGroup, version: u64, server_record: &Appointment) {
        let mut store = self.store.write().await;
        if store.group_version(&server_record.id, group) != Some(version) {
            debug!("Skipping server merge for {}: local version moved on", server_record.id);
            return;
        }
        let Ok(apt) = store.require_mut(&server_record.id) else {
            return;
        };

        if server_record.wait_duration_minutes.is_some()
            && apt.wait_duration_minutes != server_record.wait_duration_minutes
        {
            apt.wait_duration_minutes = server_record.wait_duration_minutes;
            self.events.publish(FlowEvent::AppointmentChanged {
                appointment_id: apt.id,
                version: apt.version,
            });
        }
    }

    /// Run `compensation` only if `group` of `id` is still at `version`.
    async fn compensate(&self, id: Uuid, group: FieldGroup, version: u64, compensation: Compensation) -> bool {
        let mut store = self.store.write().await;

        match store.group_version(&id, group) {
            Some(current) if current == version => match compensation(&mut *store) {
                Ok(()) => {
                    info!("Reverted local change on {}", id);
                    let version = store.version(&id).unwrap_or(version);
                    drop(store);
                    self.events.publish(FlowEvent::AppointmentChanged {
                        appointment_id: id,
                        version,
                    });
                    true
                }
                Err(e) => {
                    error!("Failed to revert local change on {}: {}", id, e);
                    false
                }
            },
            Some(current) => {
                info!(
                    "Skipping stale revert on {}: applied at version {}, now {}",
                    id, version, current
                );
                false
            }
            None => {
                debug!("Skipping revert on {}: no longer in the snapshot", id);
                false
            }
        }
    }

    async fn fetch_into_store(&self, date: NaiveDate) -> Result<usize, AppointmentError> {
        let records = self.remote.fetch_day(date).await?;

        let replaced = {
            let mut store = self.store.write().await;
            store.replace_day(date, records)
        };

        match replaced {
            Some(count) => {
                info!("Loaded {} appointments for {}", count, date);
                self.events.publish(FlowEvent::SnapshotReloaded { date, count });
                Ok(count)
            }
            None => Ok(0),
        }
    }
}

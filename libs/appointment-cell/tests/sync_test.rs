mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Duration;
use uuid::Uuid;

use appointment_cell::*;
use common::{appointment, priorities, store_with, FakeRemote};
use shared_database::RemoteError;
use shared_models::events::{EventBus, EventReceiver, FlowEvent};
use shared_utils::test_utils::{ordered_ids, test_clock, test_day, test_morning};

struct Harness {
    sync: OptimisticSync,
    remote: Arc<FakeRemote>,
    events: EventReceiver,
}

fn harness(records: Vec<Appointment>) -> Harness {
    let remote = FakeRemote::with_day(records.clone());
    let store = store_with(records).shared();
    let bus = EventBus::new(64);
    let events = bus.subscribe();
    let sync = OptimisticSync::new(store, remote.clone(), bus, Arc::new(test_clock()));

    Harness { sync, remote, events }
}

fn drain(events: &mut EventReceiver) -> Vec<FlowEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

fn unreachable() -> RemoteError {
    RemoteError::Unreachable("connection refused".to_string())
}

fn waiting_room(ids: &[Uuid]) -> Vec<Appointment> {
    ids.iter()
        .map(|id| appointment(*id, AppointmentStatus::Waiting, "09:00"))
        .collect()
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn test_apply_future_can_move_across_threads() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Scheduled, "09:00")]);

    let apply = h
        .sync
        .apply(Mutation::Status { appointment_id: id, status: AppointmentStatus::Waiting });

    assert_send(&apply);
}

#[tokio::test]
async fn test_local_change_is_visible_before_remote_answers() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Scheduled, "09:00")]);
    let gate = h.remote.hold_status();

    let pending = h
        .sync
        .apply(Mutation::Status { appointment_id: id, status: AppointmentStatus::Waiting })
        .await
        .unwrap();

    assert!(pending.is_in_flight());
    assert_eq!(pending.appointment.status, AppointmentStatus::Waiting);
    {
        let store = h.sync.store().read().await;
        let apt = store.get(&id).unwrap();
        assert_eq!(apt.status, AppointmentStatus::Waiting);
        assert_eq!(apt.waiting_since, Some(test_morning()));
    }

    gate.notify_one();
    assert_eq!(pending.settled_outcome().await, SyncResolution::Confirmed);

    let calls = h.remote.status_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.waiting_since, Some(test_morning()));
}

#[tokio::test]
async fn test_failed_status_update_reverts_and_resyncs_once() {
    let id = Uuid::new_v4();
    let mut h = harness(vec![appointment(id, AppointmentStatus::Scheduled, "09:00")]);
    h.remote.fail_status(unreachable());

    let pending = h
        .sync
        .apply(Mutation::Status { appointment_id: id, status: AppointmentStatus::Waiting })
        .await
        .unwrap();

    let outcome = pending.settled_outcome().await;

    assert_matches!(outcome, SyncResolution::Reverted(AppointmentError::RemoteUnreachable(_)));
    assert_eq!(h.remote.fetches(), 1);

    let store = h.sync.store().read().await;
    let apt = store.get(&id).unwrap();
    assert_eq!(apt.status, AppointmentStatus::Scheduled);
    assert_eq!(apt.waiting_since, None);
    assert_eq!(apt.priority, None);
    drop(store);

    let events = drain(&mut h.events);
    assert!(events.iter().any(|event| matches!(
        event,
        FlowEvent::SyncFailed { appointment_id, reverted: true, .. } if *appointment_id == id
    )));
    assert!(events
        .iter()
        .any(|event| matches!(event, FlowEvent::SnapshotReloaded { count: 1, .. })));
}

#[tokio::test]
async fn test_rejected_update_is_reported_as_rejection() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Waiting, "09:00")]);
    h.remote.fail_status(RemoteError::Rejected {
        status: 409,
        message: "already started".to_string(),
    });

    let pending = h
        .sync
        .apply(Mutation::Status { appointment_id: id, status: AppointmentStatus::InProgress })
        .await
        .unwrap();

    assert_matches!(
        pending.settled_outcome().await,
        SyncResolution::Reverted(AppointmentError::RemoteRejected(_))
    );
    let store = h.sync.store().read().await;
    assert_eq!(store.get(&id).unwrap().status, AppointmentStatus::Waiting);
    assert_eq!(store.get(&id).unwrap().priority, Some(0));
}

#[tokio::test]
async fn test_stale_failure_does_not_undo_newer_change() {
    let ids = ordered_ids(3);
    let (late_arrival, b, c) = (ids[0], ids[1], ids[2]);
    let h = harness(vec![
        appointment(late_arrival, AppointmentStatus::Scheduled, "09:00"),
        appointment(b, AppointmentStatus::Waiting, "09:15"),
        appointment(c, AppointmentStatus::Waiting, "09:30"),
    ]);
    let gate = h.remote.hold_status();
    h.remote.fail_status(unreachable());
    h.remote.fail_fetch(unreachable());

    let arrival = h
        .sync
        .apply(Mutation::Status { appointment_id: late_arrival, status: AppointmentStatus::Waiting })
        .await
        .unwrap();
    assert_eq!(arrival.appointment.priority, Some(2));

    let moved = h
        .sync
        .apply(Mutation::Reorder { appointment_id: late_arrival, direction: QueueDirection::Earlier })
        .await
        .unwrap();
    assert_eq!(moved.settled_outcome().await, SyncResolution::Confirmed);

    gate.notify_one();
    let outcome = arrival.settled_outcome().await;

    assert_matches!(outcome, SyncResolution::Superseded(AppointmentError::RemoteUnreachable(_)));
    assert_eq!(h.remote.fetches(), 1);

    let store = h.sync.store().read().await;
    assert_eq!(store.get(&late_arrival).unwrap().status, AppointmentStatus::Waiting);
    assert_eq!(PriorityQueue::new().ordered_ids(&store), vec![b, late_arrival, c]);
}

#[tokio::test]
async fn test_failure_from_before_day_switch_does_not_undo_newer_change() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Waiting, "09:00")]);
    let gate = h.remote.hold_room_then_fail(unreachable());

    let first = h
        .sync
        .apply(Mutation::Room { appointment_id: id, room: Some(Room::Room1) })
        .await
        .unwrap();
    h.remote.room_call_started().await;

    h.sync.load_day(test_day() + Duration::days(1)).await.unwrap();
    h.sync.load_day(test_day()).await.unwrap();
    let second = h
        .sync
        .apply(Mutation::Room { appointment_id: id, room: Some(Room::Room2) })
        .await
        .unwrap();
    assert_eq!(second.settled_outcome().await, SyncResolution::Confirmed);

    h.remote.fail_fetch(unreachable());
    gate.notify_one();

    assert_matches!(first.settled_outcome().await, SyncResolution::Superseded(_));
    assert_eq!(h.sync.store().read().await.get(&id).unwrap().room, Some(Room::Room2));
}

#[tokio::test]
async fn test_reorder_does_not_block_neighbour_room_revert() {
    let ids = ordered_ids(2);
    let (a, b) = (ids[0], ids[1]);
    let h = harness(waiting_room(&ids));
    h.remote.fail_fetch(unreachable());
    let gate = h.remote.hold_room_then_fail(unreachable());

    let room = h
        .sync
        .apply(Mutation::Room { appointment_id: b, room: Some(Room::Room1) })
        .await
        .unwrap();
    h.remote.room_call_started().await;

    let moved = h
        .sync
        .apply(Mutation::Reorder { appointment_id: a, direction: QueueDirection::Later })
        .await
        .unwrap();
    assert_eq!(moved.settled_outcome().await, SyncResolution::Confirmed);

    gate.notify_one();

    assert_matches!(room.settled_outcome().await, SyncResolution::Reverted(_));
    let store = h.sync.store().read().await;
    assert_eq!(store.get(&b).unwrap().room, None);
    assert_eq!(PriorityQueue::new().ordered_ids(&store), vec![b, a]);
}

#[tokio::test]
async fn test_successful_reorder_keeps_local_order_without_refetch() {
    let ids = ordered_ids(3);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    let mut h = harness(waiting_room(&ids));

    let pending = h
        .sync
        .apply(Mutation::Reorder { appointment_id: c, direction: QueueDirection::Earlier })
        .await
        .unwrap();
    assert_eq!(pending.settled_outcome().await, SyncResolution::Confirmed);

    let store = h.sync.store().read().await;
    let p = priorities(&store);
    assert_eq!((p[&a], p[&c], p[&b]), (0, 1, 2));
    drop(store);

    assert_eq!(h.remote.fetches(), 0);
    assert_eq!(h.remote.priority_calls.load(Ordering::SeqCst), 1);

    let events = drain(&mut h.events);
    assert!(events.contains(&FlowEvent::QueueReordered { order: vec![a, c, b] }));
}

#[tokio::test]
async fn test_boundary_reorder_is_not_sent() {
    let ids = ordered_ids(2);
    let h = harness(waiting_room(&ids));

    let pending = h
        .sync
        .apply(Mutation::Reorder { appointment_id: ids[0], direction: QueueDirection::Earlier })
        .await
        .unwrap();

    assert!(!pending.is_in_flight());
    assert_eq!(pending.settled_outcome().await, SyncResolution::Unchanged);
    assert_eq!(h.remote.priority_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_reorder_restores_previous_order() {
    let ids = ordered_ids(3);
    let h = harness(waiting_room(&ids));
    *h.remote.priority_failure.lock().unwrap() = Some(unreachable());
    h.remote.fail_fetch(unreachable());

    let pending = h
        .sync
        .apply(Mutation::Reorder { appointment_id: ids[2], direction: QueueDirection::Earlier })
        .await
        .unwrap();
    assert_eq!(pending.appointment.priority, Some(1));

    assert_matches!(pending.settled_outcome().await, SyncResolution::Reverted(_));
    assert_eq!(h.remote.fetches(), 1);

    let store = h.sync.store().read().await;
    assert_eq!(PriorityQueue::new().ordered_ids(&store), ids);
}

#[tokio::test]
async fn test_reorder_outside_queue_is_rejected_locally() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Scheduled, "09:00")]);

    let result = h
        .sync
        .apply(Mutation::Reorder { appointment_id: id, direction: QueueDirection::Later })
        .await;

    assert_matches!(result, Err(AppointmentError::NotInQueue(rejected)) if rejected == id);
    assert_eq!(h.remote.priority_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_transition_never_reaches_remote() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Completed, "09:00")]);

    let result = h
        .sync
        .apply(Mutation::Status { appointment_id: id, status: AppointmentStatus::Absent })
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidTransition { .. }));
    assert!(h.remote.status_calls.lock().unwrap().is_empty());
    assert_eq!(h.remote.fetches(), 0);
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let h = harness(vec![]);
    let id = Uuid::new_v4();

    let result = h
        .sync
        .apply(Mutation::Room { appointment_id: id, room: Some(Room::Room1) })
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound(missing)) if missing == id);
}

#[tokio::test]
async fn test_failed_room_assignment_is_reverted() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Waiting, "09:00")]);
    *h.remote.room_failure.lock().unwrap() = Some(RemoteError::Rejected {
        status: 422,
        message: "room unavailable".to_string(),
    });
    h.remote.fail_fetch(unreachable());

    let pending = h
        .sync
        .apply(Mutation::Room { appointment_id: id, room: Some(Room::Room1) })
        .await
        .unwrap();
    assert_eq!(pending.appointment.room, Some(Room::Room1));

    assert_matches!(pending.settled_outcome().await, SyncResolution::Reverted(_));
    assert_eq!(h.sync.store().read().await.get(&id).unwrap().room, None);
}

#[tokio::test]
async fn test_payment_flag_is_relayed() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::InProgress, "09:00")]);

    let pending = h
        .sync
        .apply(Mutation::Payment { appointment_id: id, payment_state: PaymentState::Paid })
        .await
        .unwrap();

    assert_eq!(pending.settled_outcome().await, SyncResolution::Confirmed);
    assert_eq!(h.remote.payment_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.sync.store().read().await.get(&id).unwrap().payment_state,
        PaymentState::Paid
    );

    let repeat = h
        .sync
        .apply(Mutation::Payment { appointment_id: id, payment_state: PaymentState::Paid })
        .await
        .unwrap();
    assert_eq!(repeat.settled_outcome().await, SyncResolution::Unchanged);
    assert_eq!(h.remote.payment_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_confirmed_status_takes_server_wait_duration() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Waiting, "09:00")]);
    *h.remote.server_wait_duration.lock().unwrap() = Some(12);

    let pending = h
        .sync
        .apply(Mutation::Status { appointment_id: id, status: AppointmentStatus::InProgress })
        .await
        .unwrap();
    assert_eq!(pending.appointment.wait_duration_minutes, None);

    assert_eq!(pending.settled_outcome().await, SyncResolution::Confirmed);
    assert_eq!(
        h.sync.store().read().await.get(&id).unwrap().wait_duration_minutes,
        Some(12)
    );
}

#[tokio::test]
async fn test_load_day_replaces_snapshot() {
    let ids = ordered_ids(2);
    let remote = FakeRemote::with_day(waiting_room(&ids));
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let sync = OptimisticSync::new(AppointmentStore::new().shared(), remote.clone(), bus, Arc::new(test_clock()));

    let count = sync.load_day(test_day()).await.unwrap();

    assert_eq!(count, 2);
    let store = sync.store().read().await;
    assert_eq!(store.active_date(), Some(test_day()));
    assert_eq!(PriorityQueue::new().ordered_ids(&store), ids);
    assert_eq!(
        drain(&mut events),
        vec![FlowEvent::SnapshotReloaded { date: test_day(), count: 2 }]
    );
}

#[tokio::test]
async fn test_refetch_failure_surfaces_error_and_keeps_snapshot() {
    let id = Uuid::new_v4();
    let h = harness(vec![appointment(id, AppointmentStatus::Scheduled, "09:00")]);
    h.remote.fail_fetch(unreachable());

    let result = h.sync.refetch().await;

    assert_matches!(result, Err(AppointmentError::RemoteUnreachable(_)));
    assert_eq!(h.sync.store().read().await.len(), 1);
}

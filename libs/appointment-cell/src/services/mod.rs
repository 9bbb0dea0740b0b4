pub mod lifecycle;
pub mod queue;
pub mod remote;
pub mod store;
pub mod sync;

pub use lifecycle::{StatusSnapshot, StatusStateMachine, TransitionOutcome};
pub use queue::{PriorityQueue, ReorderOutcome};
pub use remote::{AppointmentRemote, HttpAppointmentRemote};
pub use store::{AppointmentStore, FieldGroup, SharedStore};
pub use sync::{OptimisticSync, PendingSync, SyncResolution};

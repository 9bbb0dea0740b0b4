//! # Appointment Cell
//!
//! Local view of the clinic day and the rules that move patients through it.
//!
//! ```text
//! +-----------------------------------------------------+
//! |                 Appointment Cell                    |
//! +-----------------------------------------------------+
//! |  models.rs      |  Appointment, statuses, errors    |
//! |  services/      |                                   |
//! |    store.rs     |  Snapshot of the active day       |
//! |    lifecycle.rs |  Status transition table          |
//! |    queue.rs     |  Waiting-room ordering            |
//! |    remote.rs    |  Remote appointment service       |
//! |    sync.rs      |  Optimistic apply / revert        |
//! +-----------------------------------------------------+
//! ```
//!
//! Every change is applied to the snapshot first and mirrored remotely
//! afterwards. A failed remote write is undone only if no newer change has
//! landed on the same appointment, then the day is refetched.

pub mod models;
pub mod services;

pub use models::*;
pub use services::*;

//! # Patient Flow Cell
//!
//! [`ClinicFlow`] wires the appointment and consultation cells over one
//! shared snapshot and exposes them to the hosting layer, in process or over
//! HTTP through [`router::flow_routes`].

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::FlowError;
pub use models::*;
pub use router::flow_routes;
pub use services::*;

//! # Consultation Cell
//!
//! Concurrent consultation sessions and the timers that measure them.
//!
//! Sessions and timers each live in a single table keyed by appointment id.
//! One scheduler tick advances every running timer; pausing a timer simply
//! takes it out of the next tick.

pub mod models;
pub mod services;

pub use models::*;
pub use services::*;

pub mod flow;

pub use flow::ClinicFlow;

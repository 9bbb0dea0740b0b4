pub mod persistence;
pub mod session;
pub mod timer;

pub use persistence::{ConsultationPersistence, HttpConsultationPersistence};
pub use session::ConsultationSessionManager;
pub use timer::{TimerScheduler, TICK_PERIOD};

pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod stats;
pub mod types;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
pub use stats::AppointmentStatsService;
pub use types::AppointmentTypeService;

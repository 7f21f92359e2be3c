pub mod schedule;
pub mod slots;

pub use schedule::AvailabilityScheduleService;
pub use slots::SlotGenerationService;

pub mod booking;
pub mod booking_code;
pub mod consistency;
pub mod lifecycle;

pub use booking::{AppointmentBookingService, BookingDependencies};
pub use consistency::SchedulingConsistencyService;
pub use lifecycle::AppointmentLifecycleService;

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::*;
pub use services::{AppointmentBookingService, BookingDependencies, SchedulingConsistencyService};
pub use store::{AppointmentStore, AppointmentWrite, InMemoryAppointmentStore, SupabaseAppointmentStore};

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::*;
pub use services::{QuotaLedger, ScheduleService};
pub use store::{
    InMemoryScheduleStore, OccupancyGuard, ScheduleReferences, ScheduleStore, SupabaseScheduleStore, WriteOutcome,
};

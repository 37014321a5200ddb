pub mod ledger;
pub mod schedule;

pub use ledger::QuotaLedger;
pub use schedule::ScheduleService;

// libs/appointment-cell/src/services/booking_code.rs
use chrono::NaiveDate;
use rand::Rng;

const PREFIX: char = 'A';
const SUFFIX_DIGITS: usize = 6;

/// `A` + booking day as `yyyyMMdd` + six random digits, e.g. `A20240601042917`.
///
/// Codes are not guaranteed unique; the store's unique constraint is the guard.
pub fn generate(booked_on: NaiveDate) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{}{}{:06}", PREFIX, booked_on.format("%Y%m%d"), suffix)
}

pub fn is_well_formed(code: &str) -> bool {
    let Some(rest) = code.strip_prefix(PREFIX) else {
        return false;
    };
    rest.len() == 8 + SUFFIX_DIGITS
        && rest.chars().all(|c| c.is_ascii_digit())
        && NaiveDate::parse_from_str(&rest[..8], "%Y%m%d").is_ok()
}

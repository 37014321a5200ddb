pub mod directory;
pub mod error;
pub mod supabase;

pub use directory::{DoctorDirectory, DoctorRecord, InMemoryDirectory, PatientDirectory, PatientRecord, SupabaseDirectory};
pub use error::SupabaseError;
pub use supabase::SupabaseClient;

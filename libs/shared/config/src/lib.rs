use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_API_PORT: u16 = 3000;
pub const DEFAULT_BOOKING_CODE_ATTEMPTS: u32 = 3;
pub const DEFAULT_LEDGER_RELEASE_ATTEMPTS: u32 = 3;
pub const DEFAULT_SUPABASE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub api_port: u16,
    pub booking_code_attempts: u32,
    pub ledger_release_attempts: u32,
    /// Upper bound on a single Supabase request, connect through body.
    pub supabase_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            supabase_service_role_key: String::new(),
            api_port: DEFAULT_API_PORT,
            booking_code_attempts: DEFAULT_BOOKING_CODE_ATTEMPTS,
            ledger_release_attempts: DEFAULT_LEDGER_RELEASE_ATTEMPTS,
            supabase_timeout_secs: DEFAULT_SUPABASE_TIMEOUT_SECS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, stores will fall back to the anon key");
                    String::new()
                }),
            api_port: parse_or_default("API_PORT", DEFAULT_API_PORT),
            booking_code_attempts: parse_or_default("BOOKING_CODE_ATTEMPTS", DEFAULT_BOOKING_CODE_ATTEMPTS),
            ledger_release_attempts: parse_or_default("LEDGER_RELEASE_ATTEMPTS", DEFAULT_LEDGER_RELEASE_ATTEMPTS),
            supabase_timeout_secs: parse_or_default("SUPABASE_TIMEOUT_SECS", DEFAULT_SUPABASE_TIMEOUT_SECS),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Key used for store traffic; the ledger must not depend on the caller's row-level policies.
    pub fn store_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }
}

fn parse_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}

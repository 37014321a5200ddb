use reqwest::header::InvalidHeaderValue;
use serde::Deserialize;
use thiserror::Error;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("Unique constraint violated: {message}")]
    UniqueViolation {
        constraint: Option<String>,
        message: String,
    },

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Error body returned by PostgREST.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

impl SupabaseError {
    /// Classify a non-success response from the REST API.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| body.to_string());

        match parsed.as_ref().and_then(|e| e.code.as_deref()) {
            Some(UNIQUE_VIOLATION) => {
                let constraint = constraint_name(&message).or_else(|| {
                    parsed
                        .as_ref()
                        .and_then(|e| e.details.as_deref())
                        .and_then(constraint_name)
                });
                return SupabaseError::UniqueViolation { constraint, message };
            }
            Some(FOREIGN_KEY_VIOLATION) => return SupabaseError::ForeignKeyViolation(message),
            _ => {}
        }

        match status {
            401 | 403 => SupabaseError::Auth(message),
            404 => SupabaseError::NotFound(message),
            409 => SupabaseError::UniqueViolation {
                constraint: constraint_name(&message),
                message,
            },
            _ => SupabaseError::Api { status, message },
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, SupabaseError::UniqueViolation { .. })
    }

    /// True when the violated unique constraint's name contains `needle`.
    pub fn violates(&self, needle: &str) -> bool {
        match self {
            SupabaseError::UniqueViolation { constraint: Some(name), .. } => name.contains(needle),
            _ => false,
        }
    }
}

fn constraint_name(message: &str) -> Option<String> {
    let rest = &message[message.find("constraint \"")? + "constraint \"".len()..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

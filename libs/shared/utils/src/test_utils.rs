use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{JwtClaims, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Authenticated caller with a clinic role.
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::patient("test@clinic.test")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    fn claims(&self, issued_at: i64, expires_at: i64) -> JwtClaims {
        JwtClaims {
            sub: self.id.clone(),
            exp: Some(expires_at.max(0) as u64),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            app_metadata: None,
            user_metadata: None,
            aud: Some("authenticated".to_string()),
            iat: Some(issued_at.max(0) as u64),
        }
    }
}

/// Mints HS256 tokens shaped like the ones Supabase issues.
pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let expires_at = now + Duration::hours(exp_hours.unwrap_or(24));
        Self::sign(&user.claims(now.timestamp(), expires_at.timestamp()), secret)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        let issued_at = Utc::now() - Duration::hours(2);
        let expired_at = Utc::now() - Duration::hours(1);
        Self::sign(&user.claims(issued_at.timestamp(), expired_at.timestamp()), secret)
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "not-the-clinic-secret", Some(1))
    }

    fn sign(claims: &JwtClaims, secret: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "HS256", "typ": "JWT" }).to_string());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims serialize"));
        let signing_input = format!("{}.{}", header, payload);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
        mac.update(signing_input.as_bytes());
        format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

/// Canned PostgREST payloads for wiremock-backed tests.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn schedule_row(
        schedule_id: Uuid,
        doctor_id: Uuid,
        date: &str,
        time_slot: &str,
        max_patients: i32,
        current_patients: i32,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": schedule_id,
            "doctor_id": doctor_id,
            "schedule_date": date,
            "time_slot": time_slot,
            "max_patients": max_patients,
            "current_patients": current_patients,
            "status": status,
            "created_at": "2024-05-01T00:00:00Z",
            "updated_at": "2024-05-01T00:00:00Z"
        })
    }

    pub fn appointment_row(
        appointment_id: Uuid,
        patient_id: Uuid,
        doctor_id: Uuid,
        schedule_id: Uuid,
        date: &str,
        status: i32,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "appointment_no": "A20240520123456",
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "schedule_id": schedule_id,
            "appointment_date": date,
            "time_slot": "morning",
            "symptoms": "headache",
            "status": status,
            "quota_hold_id": Uuid::new_v4(),
            "created_at": "2024-05-20T09:00:00Z",
            "updated_at": "2024-05-20T09:00:00Z"
        })
    }

    pub fn unique_violation(constraint: &str) -> serde_json::Value {
        json!({
            "code": "23505",
            "details": null,
            "hint": null,
            "message": format!("duplicate key value violates unique constraint \"{}\"", constraint)
        })
    }
}

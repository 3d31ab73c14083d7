use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub const META_LAST_LOGIN_ATTEMPT: &str = "last_login_attempt";
pub const META_LAST_FAILED_LOGIN_ATTEMPT: &str = "last_failed_login_attempt";
pub const META_FAILED_LOGIN_ATTEMPTS: &str = "failed_login_attempts";

/// Metadata keys only the sign-in flow may write.
pub const RESERVED_METADATA: [&str; 3] = [
    META_LAST_LOGIN_ATTEMPT,
    META_LAST_FAILED_LOGIN_ATTEMPT,
    META_FAILED_LOGIN_ATTEMPTS,
];

pub type UserMetadata = BTreeMap<String, Value>;

/// A `users` row. `email_address` is envelope-encrypted base64,
/// `email_hash` the hex MAC of the normalised address.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: String,
    pub display_name: String,
    pub email_address: String,
    pub email_hash: String,
    /// Base64 PBKDF2 digest.
    pub password_digest: String,
    /// Base64 salt.
    pub salt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub nuked_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A user row together with its metadata entries.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub row: UserRow,
    pub metadata: UserMetadata,
}

impl UserRecord {
    pub fn metadata_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(Value::as_i64)
    }
}

/// The user document returned to clients. Never carries the digest or salt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeUser {
    pub user_id: String,
    pub display_name: String,
    pub email_address: String,
    pub metadata: UserMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub nuked_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Renders a metadata value the way it is stored in `user_metadata`.
pub fn metadata_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads a stored metadata value back, recovering nulls, booleans and numbers.
pub fn metadata_from_text(text: &str) -> Value {
    match text.to_ascii_lowercase().as_str() {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }

    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(text.to_string())),
        _ => Value::String(text.to_string()),
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Header carrying the compression flag of the stored payload.
pub const HEADER_COMPRESSION: &str = "compression";
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
/// Audience header checked by the refresh middleware.
pub const HEADER_AUDIENCE: &str = "aud";

/// Session kind used for authenticated user sessions.
pub const KIND_AUTH: &str = "authx";
/// Audience of sessions minted for end users.
pub const AUDIENCE_USER: &str = "usr";

/// A `sessions` row as persisted. Every sensitive column is already
/// encrypted and base64 encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRow {
    pub session_id: String,
    pub public_id: String,
    pub user_id: Option<String>,
    /// Base64 of the (redacted, possibly compressed) binary payload.
    pub payload: String,
    pub kind: String,
    pub tdi: Option<String>,
    /// Base64 of the redacted headers JSON.
    pub headers: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Base64 HMAC over `headers-json:payload`.
    pub signature: String,
}

/// When a new session stops being valid.
#[derive(Debug, Clone, PartialEq)]
pub enum Expiry {
    At(DateTime<Utc>),
    /// An RFC 3339 / RFC 2822 date or a relative expression like `15m`.
    Expr(String),
}

impl From<&str> for Expiry {
    fn from(value: &str) -> Self {
        Expiry::Expr(value.to_string())
    }
}

impl From<DateTime<Utc>> for Expiry {
    fn from(value: DateTime<Utc>) -> Self {
        Expiry::At(value)
    }
}

/// Everything needed to mint a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub kind: String,
    pub payload: Value,
    pub headers: Map<String, Value>,
    pub user_id: Option<String>,
    pub tdi: Option<String>,
    pub expires: Option<Expiry>,
    /// Skip packet framing of the stored payload.
    pub avoid_compression: bool,
}

impl NewSession {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            headers: Map::new(),
            user_id: None,
            tdi: None,
            expires: None,
            avoid_compression: false,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: Map<String, Value>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn expires(mut self, expires: impl Into<Expiry>) -> Self {
        self.expires = Some(expires.into());
        self
    }

    pub fn uncompressed(mut self) -> Self {
        self.avoid_compression = true;
        self
    }
}

/// A live, verified session.
///
/// Deliberately not `Clone`: erasing consumes it, so a destroyed session
/// cannot be used again.
#[derive(Debug)]
pub struct Session {
    pub(crate) session_id: String,
    pub(crate) public_id: String,
    pub(crate) kind: String,
    pub(crate) headers: Map<String, Value>,
    pub(crate) payload: Value,
    pub(crate) signature: String,
    pub(crate) tdi: Option<String>,
    pub(crate) user_id: Option<String>,
    pub(crate) expires_at: Option<DateTime<Utc>>,
    pub(crate) created_at: DateTime<Utc>,
}

impl Session {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn public_id(&self) -> &str {
        &self.public_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn headers(&self) -> &Map<String, Value> {
        &self.headers
    }

    pub fn header_str(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(Value::as_str)
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn tdi(&self) -> Option<&str> {
        self.tdi.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Caller headers without the reserved entries, for re-minting.
    pub fn caller_headers(&self) -> Map<String, Value> {
        self.headers
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    HEADER_COMPRESSION | HEADER_CONTENT_LENGTH | HEADER_CONTENT_TYPE
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The only representation handed to code that does not own the session.
    pub fn to_redacted(&self) -> RedactedSession {
        RedactedSession {
            session_id: self.session_id.clone(),
            public_id: self.public_id.clone(),
            kind: self.kind.clone(),
            user_id: self.user_id.clone(),
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// Session fields that are safe to pass around: no payload, headers or
/// signature. The internal id is kept for server-side use and never
/// serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedSession {
    #[serde(skip_serializing)]
    pub session_id: String,
    pub public_id: String,
    pub kind: String,
    pub user_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

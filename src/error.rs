use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

tokio::task_local! {
    /// The id of the request currently being served, scoped by the request
    /// context middleware.
    pub static REQUEST_ID: String;
}

/// An error raised explicitly by a handler, carrying its own status and an
/// optional context that stays hidden unless the handler reveals it.
#[derive(Debug, Clone)]
pub struct HttpError {
    message: String,
    status: StatusCode,
    code: &'static str,
    context: Option<serde_json::Value>,
    hide_context: bool,
}

impl HttpError {
    /// Creates a new `HttpError` with the given status and user-facing message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            code: code_for_status(status),
            context: None,
            hide_context: true,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Allows the context to be rendered in the response body.
    pub fn show_unsafe_context(mut self) -> Self {
        self.hide_context = false;
        self
    }

    pub fn hide_unsafe_context(mut self) -> Self {
        self.hide_context = true;
        self
    }

    pub fn should_hide_unsafe_context(&self) -> bool {
        self.hide_context
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

fn code_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "ERR_INVALID_ARGUMENT",
        StatusCode::UNAUTHORIZED => "ERR_UNAUTHORIZED",
        StatusCode::FORBIDDEN => "ERR_FORBIDDEN",
        StatusCode::NOT_FOUND => "ERR_NOT_FOUND",
        StatusCode::CONFLICT => "ERR_CONFLICT",
        StatusCode::TOO_MANY_REQUESTS => "ERR_RATE_LIMITED",
        _ => "ERR_UNKNOWN_ERROR",
    }
}

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured key material cannot supply the bytes an algorithm needs.
    #[error("Crypto key too short: {0}")]
    ShortKey(String),

    /// A MAC did not match the recomputed value.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// A compressed packet did not start with the expected magic header.
    #[error("Cannot ensure this buffer is a compressed packet")]
    MagicNumberMismatch,

    /// A compressed packet carried a flag byte the codec does not know.
    #[error("Unknown compression flag 0x{0:02x}")]
    UnknownPacketFlag(u8),

    /// A resource outlived its expiry.
    #[error("Resource expired: {0}")]
    ResourceExpired(String),

    /// An operation was cancelled through its cancellation token.
    #[error("Operation cancelled: {0}")]
    TokenCancelled(String),

    /// A caller handed in a malformed value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored card chunk failed verification.
    #[error("Could not validate the signature of card chunk #{index}")]
    ChunkIntegrity { index: usize },

    /// An authentication error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An authorization error.
    #[error("Authorization failed: {0}")]
    Forbidden(String),

    /// A conflicting resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// An error raised by a handler with its own status.
    #[error("{0}")]
    Http(HttpError),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        AppError::Http(e)
    }
}

impl AppError {
    /// The stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ShortKey(_) => "ERR_CRYPTO_SHORT_KEY",
            AppError::InvalidSignature(_) | AppError::ChunkIntegrity { .. } => {
                "ERR_INVALID_SIGNATURE"
            }
            AppError::MagicNumberMismatch => "ERR_MAGIC_NUMBER_MISMATCH",
            AppError::UnknownPacketFlag(_) => "ERR_UNKNOWN_ERROR",
            AppError::ResourceExpired(_) => "ERR_RESOURCE_EXPIRED",
            AppError::TokenCancelled(_) => "ERR_TOKEN_CANCELLED",
            AppError::InvalidArgument(_) | AppError::Validation(_) => "ERR_INVALID_ARGUMENT",
            AppError::Authentication(_) => "ERR_UNAUTHORIZED",
            AppError::Forbidden(_) => "ERR_FORBIDDEN",
            AppError::Conflict(_) => "ERR_CONFLICT",
            AppError::NotFound => "ERR_NOT_FOUND",
            AppError::RateLimitExceeded(_) => "ERR_RATE_LIMITED",
            AppError::Http(e) => e.code,
            _ => "ERR_UNKNOWN_ERROR",
        }
    }

    /// The HTTP status the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidSignature(_) | AppError::ResourceExpired(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidArgument(_)
            | AppError::Validation(_)
            | AppError::UnknownPacketFlag(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Http(e) => e.status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Pool(_) => "Database unavailable".to_string(),
            AppError::Io(_) => "File system error".to_string(),
            AppError::ShortKey(_) | AppError::Encryption(_) => "Encryption error".to_string(),
            AppError::ChunkIntegrity { .. } => self.to_string(),
            AppError::MagicNumberMismatch | AppError::UnknownPacketFlag(_) => {
                "Malformed packet".to_string()
            }
            AppError::TokenCancelled(_) => "Operation cancelled".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InvalidSignature(_) => "Unable to validate your session".to_string(),
            AppError::ResourceExpired(msg)
            | AppError::InvalidArgument(msg)
            | AppError::Authentication(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg)
            | AppError::RateLimitExceeded(msg) => msg.clone(),
            AppError::NotFound => "Resource not found".to_string(),
            AppError::Http(e) => e.message.clone(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Io(_)
            | AppError::ShortKey(_)
            | AppError::Encryption(_)
            | AppError::Internal(_)
            | AppError::ChunkIntegrity { .. } => tracing::error!("❌ {}", self),
            AppError::InvalidSignature(_) | AppError::MagicNumberMismatch => {
                tracing::warn!("⚠️  Integrity violation: {}", self)
            }
            AppError::Authentication(_) | AppError::Forbidden(_) | AppError::RateLimitExceeded(_) => {
                tracing::warn!("{}", self)
            }
            _ => tracing::debug!("{}", self),
        }
    }
}

/// Replaces messages that would leak infrastructure details.
pub(crate) fn scrub_message(message: String) -> String {
    if message.to_uppercase().contains("ECONNREFUSED") {
        "[REDACTED]".to_string()
    } else {
        message
    }
}

fn current_request_id() -> String {
    REQUEST_ID
        .try_with(|rid| rid.clone())
        .unwrap_or_else(|_| "[UNKNOWN]".to_string())
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status();
        let message = scrub_message(self.public_message());

        let context = match &self {
            AppError::Http(e) if !e.hide_context => e.context.clone(),
            _ => None,
        };

        let mut body = serde_json::json!({
            "httpStatusCode": status.as_u16(),
            "code": self.code(),
            "requestId": current_request_id(),
            "message": message,
        });

        if let Some(ctx) = context {
            body["context"] = ctx;
        }

        let body = sonic_rs::to_string(&body)
            .unwrap_or_else(|_| r#"{"code":"ERR_UNKNOWN_ERROR","message":"Internal server error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json; charset=UTF-8")],
            body,
        )
            .into_response()
    }
}

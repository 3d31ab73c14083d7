use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use crate::{
    error::{AppError, Result},
    models::session::{RedactedSession, AUDIENCE_USER, HEADER_AUDIENCE, KIND_AUTH},
    state::AppState,
};

/// Name of the opaque session cookie.
pub const SESSION_COOKIE: &str = "_CSID";

/// What downstream handlers learn about the caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session: RedactedSession,
}

impl AuthContext {
    /// The session owner. Authenticated sessions always carry one.
    pub fn user_id(&self) -> Result<&str> {
        self.session
            .user_id
            .as_deref()
            .ok_or_else(|| AppError::Authentication("Unable to find your session".to_string()))
    }
}

/// Builds the `_CSID` cookie for a session id.
///
/// # Arguments
///
/// * `state` - The application state holding the envelope key.
/// * `session_id` - The internal session id to wrap.
///
/// # Returns
///
/// An HttpOnly, SameSite=Strict cookie, Secure in production.
pub fn session_cookie(state: &AppState, session_id: &str) -> Result<Cookie<'static>> {
    let value = URL_SAFE_NO_PAD.encode(state.keys.envelope.redact(session_id.as_bytes())?);

    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_same_site(SameSite::Strict);

    if state.config.is_production() {
        cookie.set_secure(true);
    }

    Ok(cookie)
}

/// Recovers the internal session id from a cookie value.
pub fn session_id_from_cookie(state: &AppState, value: &str) -> Option<String> {
    let ct = URL_SAFE_NO_PAD.decode(value.trim_end_matches('=')).ok()?;
    let plain = state.keys.envelope.unwrap_redacted(&ct).ok()?;
    String::from_utf8(plain).ok()
}

fn missing_session() -> AppError {
    AppError::Authentication("Unable to find your session".to_string())
}

/// Validates the inbound `_CSID` cookie, rotates the session and exposes
/// the new session to the wrapped handler.
pub async fn refresh_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    tracing::debug!("🔐 Checking session...");

    let cookie = cookies.get(SESSION_COOKIE).ok_or_else(|| {
        tracing::debug!("No {} cookie found", SESSION_COOKIE);
        missing_session()
    })?;

    let session_id = session_id_from_cookie(&state, cookie.value()).ok_or_else(|| {
        tracing::warn!("⚠️  Undecipherable {} cookie", SESSION_COOKIE);
        missing_session()
    })?;

    let session = match state.sessions.find_by_id(&session_id).await {
        Ok(Some(session)) => session,
        Ok(None) => return Err(missing_session()),
        Err(e @ AppError::Database(_)) | Err(e @ AppError::Pool(_)) => return Err(e),
        Err(e) => {
            tracing::warn!("❌ Session rejected: {}", e);
            return Err(missing_session());
        }
    };

    if session.kind() != KIND_AUTH || session.header_str(HEADER_AUDIENCE) != Some(AUDIENCE_USER) {
        tracing::warn!("❌ Session {} has the wrong kind or audience", session.public_id());
        return Err(AppError::Forbidden("The provided auth session is invalid".to_string()));
    }

    let rotated = state
        .sessions
        .rotate(session, &state.config.session_ttl)
        .await
        .map_err(|e| match e {
            AppError::ResourceExpired(_) => missing_session(),
            other => other,
        })?;

    cookies.add(session_cookie(&state, rotated.session_id())?);

    request.extensions_mut().insert(AuthContext {
        session: rotated.to_redacted(),
    });

    Ok(next.run(request).await)
}

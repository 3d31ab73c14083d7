use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    crypto::{
        ids::{generate_id, IdKind},
        password::{random_salt, Password},
    },
    error::{AppError, HttpError, Result},
    models::{
        session::{NewSession, RedactedSession, Session, AUDIENCE_USER, HEADER_AUDIENCE, KIND_AUTH},
        user::{
            SafeUser, UserMetadata, UserRecord, UserRow, META_FAILED_LOGIN_ATTEMPTS,
            META_LAST_FAILED_LOGIN_ATTEMPT, META_LAST_LOGIN_ATTEMPT, RESERVED_METADATA,
        },
    },
    state::AppState,
    validation::auth::normalize_email,
};
use axum::http::StatusCode;

/// Salt length for newly registered users.
const USER_SALT_LEN: usize = 80;
/// Failed attempts that trigger the lockout.
const MAX_FAILED_ATTEMPTS: i64 = 3;
/// How long the lockout lasts, in minutes.
const LOCKOUT_MINUTES: i64 = 120;
/// Header carrying the client address a session was minted for.
const HEADER_INET: &str = "inet";

fn wrong_credentials() -> AppError {
    HttpError::new(StatusCode::UNAUTHORIZED, "The provided credentials are wrong").into()
}

/// Decrypts the stored email and renders the client-safe document.
pub fn safe_user(state: &AppState, record: &UserRecord) -> Result<SafeUser> {
    let ct = B64
        .decode(&record.row.email_address)
        .map_err(|e| AppError::Encryption(format!("Stored email is not base64: {}", e)))?;
    let email = state.keys.envelope.unwrap_redacted(&ct)?;
    let email = String::from_utf8(email)
        .map_err(|_| AppError::Encryption("Stored email is not UTF-8".to_string()))?;

    Ok(SafeUser {
        user_id: record.row.user_id.clone(),
        display_name: record.row.display_name.clone(),
        email_address: email,
        metadata: record.metadata.clone(),
        created_at: record.row.created_at,
        updated_at: record.row.updated_at,
        nuked_at: record.row.nuked_at,
        deleted_at: record.row.deleted_at,
    })
}

async fn find_user(state: &AppState, identifier: &str) -> Result<Option<UserRecord>> {
    let email_hash = state.keys.signer.sign_hex(normalize_email(identifier).as_bytes());
    state.users.find(identifier, &email_hash).await
}

async fn mint_session(
    state: &AppState,
    user: &UserRecord,
    inet: Option<&str>,
) -> Result<Session> {
    let meta: UserMetadata = user
        .metadata
        .iter()
        .filter(|(k, _)| !is_reserved_metadata(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let payload = json!({ "role": "standard", "meta": meta });

    state
        .sessions
        .create(
            NewSession::new(KIND_AUTH, payload)
                .header(HEADER_AUDIENCE, AUDIENCE_USER)
                .header(HEADER_INET, inet.map(Value::from).unwrap_or(Value::Null))
                .user(user.row.user_id.clone())
                .expires(state.config.session_ttl.as_str()),
        )
        .await
}

/// Registers a user and opens their first session.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `display_name` - The unique public name.
/// * `email` - The email address, normalised before storage.
/// * `password` - The plaintext password.
/// * `inet` - The client address, if known.
///
/// # Returns
///
/// The safe user document and the new session. Duplicate names or emails
/// fail with 409.
pub async fn sign_up(
    state: &AppState,
    display_name: &str,
    email: &str,
    password: &str,
    inet: Option<&str>,
) -> Result<(SafeUser, Session)> {
    let email = normalize_email(email);
    let display_name = display_name.trim();
    let email_hash = state.keys.signer.sign_hex(email.as_bytes());

    if find_user(state, &email).await?.is_some() {
        return Err(HttpError::new(StatusCode::CONFLICT, "An user with this email already exists").into());
    }

    if state.users.exists(display_name, &email_hash).await? {
        return Err(
            HttpError::new(StatusCode::CONFLICT, "An user with this username already exists").into(),
        );
    }

    let salt = random_salt(USER_SALT_LEN);
    let mut pwd = Password::create(password, false, Some(salt.clone()))?;
    let digest = pwd.hashed_value().await?;

    let now = Utc::now();
    let row = UserRow {
        user_id: generate_id(IdKind::Long),
        display_name: display_name.to_string(),
        email_address: B64.encode(state.keys.envelope.redact(email.as_bytes())?),
        email_hash,
        password_digest: B64.encode(digest),
        salt: B64.encode(salt),
        created_at: now,
        updated_at: now,
        nuked_at: None,
        deleted_at: None,
    };

    let record = UserRecord {
        row,
        metadata: UserMetadata::new(),
    };

    state
        .users
        .insert(&record.row, &record.metadata)
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => {
                HttpError::new(StatusCode::CONFLICT, "An user with this email already exists").into()
            }
            other => other,
        })?;

    tracing::info!("✅ User registered: {}", record.row.user_id);

    let session = mint_session(state, &record, inet).await?;
    Ok((safe_user(state, &record)?, session))
}

/// Verifies credentials and opens a session.
///
/// Unknown or deleted users get 401, banned users 403. Three failures
/// within two hours lock the account for the rest of that window.
pub async fn sign_in(
    state: &AppState,
    identifier: &str,
    password: &str,
    inet: Option<&str>,
) -> Result<(SafeUser, Session)> {
    let mut user = find_user(state, identifier.trim())
        .await?
        .filter(|u| u.row.deleted_at.is_none())
        .ok_or_else(wrong_credentials)?;

    if user.row.nuked_at.is_some() {
        return Err(HttpError::new(StatusCode::FORBIDDEN, "Your account was banned").into());
    }

    let now = Utc::now().timestamp_millis();
    let failed_attempts = user.metadata_i64(META_FAILED_LOGIN_ATTEMPTS).unwrap_or(0);

    if failed_attempts >= MAX_FAILED_ATTEMPTS {
        if let Some(last_failed) = user.metadata_i64(META_LAST_FAILED_LOGIN_ATTEMPT) {
            let minutes_since = (now - last_failed) / 60_000;

            if minutes_since < LOCKOUT_MINUTES {
                tracing::warn!("🔒 Sign-in blocked for locked user {}", user.row.user_id);
                return Err(HttpError::new(
                    StatusCode::FORBIDDEN,
                    format!(
                        "Too many failed login attempts. Try again in {} minutes.",
                        LOCKOUT_MINUTES - minutes_since
                    ),
                )
                .into());
            }
        }
    }

    user.metadata
        .insert(META_LAST_LOGIN_ATTEMPT.to_string(), Value::from(now));

    let digest = B64
        .decode(&user.row.password_digest)
        .map_err(|e| AppError::Encryption(format!("Stored digest is not base64: {}", e)))?;
    let salt = B64
        .decode(&user.row.salt)
        .map_err(|e| AppError::Encryption(format!("Stored salt is not base64: {}", e)))?;

    let stored = Password::create(digest, true, Some(salt))?;

    if !stored.compare(password).await? {
        user.metadata
            .insert(META_FAILED_LOGIN_ATTEMPTS.to_string(), Value::from(failed_attempts + 1));
        user.metadata
            .insert(META_LAST_FAILED_LOGIN_ATTEMPT.to_string(), Value::from(now));
        state
            .users
            .save_metadata(&user.row.user_id, &user.metadata, Utc::now())
            .await?;

        tracing::warn!("❌ Wrong password for user {}", user.row.user_id);
        return Err(wrong_credentials());
    }

    user.metadata
        .insert(META_FAILED_LOGIN_ATTEMPTS.to_string(), Value::from(0));
    state
        .users
        .save_metadata(&user.row.user_id, &user.metadata, Utc::now())
        .await?;

    tracing::info!("✅ User authenticated: {}", user.row.user_id);

    let session = mint_session(state, &user, inet).await?;
    Ok((safe_user(state, &user)?, session))
}

/// Loads the user behind an authenticated session.
pub async fn current_user(state: &AppState, user_id: &str) -> Result<SafeUser> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .filter(|u| u.row.deleted_at.is_none())
        .ok_or_else(|| {
            AppError::from(HttpError::new(
                StatusCode::UNAUTHORIZED,
                "You must be authenticated to access this resource",
            ))
        })?;

    safe_user(state, &user)
}

/// Ends the caller's session.
pub async fn sign_out(state: &AppState, session: &RedactedSession) -> Result<()> {
    state.sessions.revoke(session).await?;
    tracing::info!("👋 Session {} signed out", session.public_id);
    Ok(())
}

/// Sign-in bookkeeping keys. They never travel inside session payloads.
pub fn is_reserved_metadata(key: &str) -> bool {
    RESERVED_METADATA.contains(&key)
}

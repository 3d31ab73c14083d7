use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
    codec::{
        binary,
        packet::{self, ZOptions},
    },
    crypto::{ids::{generate_id, IdKind}, keyring::Keyring, mac::tags_equal},
    error::{AppError, Result},
    models::session::{
        Expiry, NewSession, RedactedSession, Session, SessionRow, HEADER_COMPRESSION, HEADER_CONTENT_LENGTH,
        HEADER_CONTENT_TYPE,
    },
    repositories::session::SessionRepository,
    utils::time::{parse_absolute_time, parse_relative_time},
};

/// Longest stored `kind`.
const MAX_KIND_LEN: usize = 64;

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "object",
    }
}

fn resolve_expiry(expires: Option<Expiry>) -> Result<Option<DateTime<Utc>>> {
    let at = match expires {
        None => return Ok(None),
        Some(Expiry::Expr(s)) if s.trim().is_empty() => return Ok(None),
        Some(Expiry::At(at)) => at,
        Some(Expiry::Expr(s)) => match parse_absolute_time(&s) {
            Some(at) => at,
            None => parse_relative_time(&s)?,
        },
    };

    if at <= Utc::now() {
        return Err(AppError::InvalidArgument(
            "Session expiration time should be in the future".to_string(),
        ));
    }

    Ok(Some(at))
}

/// The canonical string the session signature covers: `headers-json:payload`.
fn signed_parts<'a>(headers_json: &'a str, payload: &'a [u8]) -> [&'a [u8]; 3] {
    [headers_json.as_bytes(), b":", payload]
}

fn integrity(reason: impl std::fmt::Display) -> AppError {
    AppError::InvalidSignature(format!("Couldn't validate the session signature: {}", reason))
}

/// Creates, verifies, rotates and erases opaque sessions.
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    keys: Arc<Keyring>,
    packets: ZOptions,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, keys: Arc<Keyring>, packets: ZOptions) -> Self {
        Self { repo, keys, packets }
    }

    /// Builds the row for a new session without persisting it.
    async fn prepare(&self, props: NewSession) -> Result<(SessionRow, Session)> {
        let expires_at = resolve_expiry(props.expires)?;
        let compress = !props.avoid_compression;

        let payload_bytes = binary::to_bytes(&props.payload)?;

        let mut headers: Map<String, Value> = props.headers;
        headers.insert(HEADER_COMPRESSION.to_string(), Value::from(u8::from(compress)));
        headers.insert(HEADER_CONTENT_LENGTH.to_string(), Value::from(payload_bytes.len()));
        headers.insert(
            HEADER_CONTENT_TYPE.to_string(),
            Value::from(format!(
                "binary/typeof {}; enc=chunked-buffer",
                type_name(&props.payload)
            )),
        );

        let headers_json = serde_json::to_string(&headers)
            .map_err(|e| AppError::Internal(format!("Header serialization failed: {}", e)))?;

        let signature = self
            .keys
            .signer
            .sign_parts(&signed_parts(&headers_json, &payload_bytes));
        let signature = B64.encode(signature);

        let mut stored = self.keys.envelope.redact(&payload_bytes)?;
        if compress {
            stored = packet::create_compressed_packet(stored.as_slice(), &self.packets).await?;
        }

        let kind: String = props.kind.chars().take(MAX_KIND_LEN).collect();

        let row = SessionRow {
            session_id: generate_id(IdKind::Long),
            public_id: generate_id(IdKind::UuidV7),
            user_id: props.user_id,
            payload: B64.encode(&stored),
            kind,
            tdi: props.tdi,
            headers: B64.encode(self.keys.envelope.redact(headers_json.as_bytes())?),
            created_at: Utc::now(),
            expires_at,
            signature,
        };

        let session = Session {
            session_id: row.session_id.clone(),
            public_id: row.public_id.clone(),
            kind: row.kind.clone(),
            headers,
            payload: props.payload,
            signature: row.signature.clone(),
            tdi: row.tdi.clone(),
            user_id: row.user_id.clone(),
            expires_at: row.expires_at,
            created_at: row.created_at,
        };

        Ok((row, session))
    }

    /// Mints and persists a new session.
    ///
    /// # Arguments
    ///
    /// * `props` - Kind, payload, caller headers, owner and expiry.
    ///
    /// # Returns
    ///
    /// The live `Session`, or `ERR_INVALID_ARGUMENT` if the expiry is not in
    /// the future.
    pub async fn create(&self, props: NewSession) -> Result<Session> {
        let (row, session) = self.prepare(props).await?;
        self.repo.insert(&row).await?;

        tracing::debug!("🎫 Session {} created (kind: {})", row.public_id, row.kind);
        Ok(session)
    }

    /// Decodes and verifies a stored row. Any failure here is an integrity
    /// failure of the row.
    async fn open_row(&self, row: &SessionRow) -> Result<Session> {
        let headers_ct = B64.decode(&row.headers).map_err(integrity)?;
        let headers_json = self.keys.envelope.unwrap_redacted(&headers_ct).map_err(integrity)?;
        let headers: Map<String, Value> = serde_json::from_slice(&headers_json).map_err(integrity)?;

        let mut stored = B64.decode(&row.payload).map_err(integrity)?;
        if headers.get(HEADER_COMPRESSION).and_then(Value::as_u64) == Some(1) {
            stored = packet::decompress_packet(&stored, &self.packets)
                .await
                .map_err(integrity)?;
        }
        let payload_bytes = self.keys.envelope.unwrap_redacted(&stored).map_err(integrity)?;

        let canonical = serde_json::to_string(&headers).map_err(integrity)?;
        let expected = self
            .keys
            .signer
            .sign_parts(&signed_parts(&canonical, &payload_bytes));
        let stored_signature = B64.decode(&row.signature).map_err(integrity)?;

        if !tags_equal(&expected, &stored_signature) {
            return Err(integrity("signature mismatch"));
        }

        let payload = binary::from_bytes(payload_bytes).map_err(integrity)?;

        Ok(Session {
            session_id: row.session_id.clone(),
            public_id: row.public_id.clone(),
            kind: row.kind.clone(),
            headers,
            payload,
            signature: row.signature.clone(),
            tdi: row.tdi.clone(),
            user_id: row.user_id.clone(),
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }

    /// Looks a session up by internal or public id.
    ///
    /// Expired rows are deleted and reported as `ERR_RESOURCE_EXPIRED`; rows
    /// that fail verification are deleted and reported as
    /// `ERR_INVALID_SIGNATURE`. A missing row is `Ok(None)`.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Session>> {
        let Some(row) = self.repo.find(id).await? else {
            return Ok(None);
        };

        if row.expires_at.is_some_and(|at| at <= Utc::now()) {
            self.repo.delete(&row.session_id).await?;
            tracing::debug!("⌛ Session {} expired and was removed", row.public_id);
            return Err(AppError::ResourceExpired("This session was expired".to_string()));
        }

        match self.open_row(&row).await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!("⚠️  Session {} failed verification, deleting it", row.public_id);
                self.repo.delete(&row.session_id).await?;
                Err(e)
            }
        }
    }

    /// Deletes the session's row, scoped to its owner, and consumes it.
    pub async fn erase(&self, session: Session) -> Result<()> {
        let n = self
            .repo
            .delete_owned(&session.session_id, session.user_id.as_deref())
            .await?;

        if n == 0 {
            tracing::debug!("Session {} was already gone on erase", session.public_id);
        }

        Ok(())
    }

    /// Deletes a session known only by its redacted form, scoped to its owner.
    pub async fn revoke(&self, session: &RedactedSession) -> Result<bool> {
        let n = self
            .repo
            .delete_owned(&session.session_id, session.user_id.as_deref())
            .await?;
        Ok(n > 0)
    }

    /// Replaces `old` with a fresh session carrying the same owner, headers
    /// and payload.
    ///
    /// # Arguments
    ///
    /// * `old` - The verified session presented by the client.
    /// * `ttl` - Relative lifetime of the new session.
    ///
    /// # Returns
    ///
    /// The new `Session`. When another request already rotated `old` this
    /// fails with `ERR_RESOURCE_EXPIRED` and mints nothing. On any other
    /// failure the old session is still erased before the error surfaces.
    pub async fn rotate(&self, old: Session, ttl: &str) -> Result<Session> {
        let props = NewSession {
            kind: old.kind.clone(),
            payload: old.payload.clone(),
            headers: old.caller_headers(),
            user_id: old.user_id.clone(),
            tdi: old.tdi.clone(),
            expires: Some(Expiry::Expr(ttl.to_string())),
            avoid_compression: old.headers.get(HEADER_COMPRESSION).and_then(Value::as_u64) == Some(0),
        };

        let outcome = match self.prepare(props).await {
            Ok((row, session)) => self.repo.rotate(&old.session_id, &row).await.map(|_| session),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(session) => {
                tracing::debug!("🔄 Session {} rotated into {}", old.public_id, session.public_id);
                Ok(session)
            }
            Err(e @ AppError::ResourceExpired(_)) => Err(e),
            Err(e) => {
                if let Err(cleanup) = self.repo.delete(&old.session_id).await {
                    tracing::error!("❌ Failed to erase session {} after rotation error: {}", old.public_id, cleanup);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keyring::tests::test_keyring;
    use crate::models::session::{AUDIENCE_USER, HEADER_AUDIENCE, KIND_AUTH};
    use crate::repositories::memory::MemorySessionRepository;
    use serde_json::json;

    fn store() -> (SessionStore, MemorySessionRepository) {
        let repo = MemorySessionRepository::new();
        let store = SessionStore::new(
            Arc::new(repo.clone()),
            Arc::new(test_keyring()),
            ZOptions::default(),
        );
        (store, repo)
    }

    fn auth_session(payload: Value) -> NewSession {
        NewSession::new(KIND_AUTH, payload)
            .header(HEADER_AUDIENCE, AUDIENCE_USER)
            .user("user-1")
            .expires("15m")
    }

    #[tokio::test]
    async fn create_then_find_by_either_id() {
        let (store, _) = store();
        let payload = json!({ "role": "standard", "meta": { "n": 1 } });
        let session = store.create(auth_session(payload.clone())).await.unwrap();

        for id in [session.session_id(), session.public_id()] {
            let found = store.find_by_id(id).await.unwrap().unwrap();
            assert_eq!(found.payload(), &payload);
            assert_eq!(found.header_str(HEADER_AUDIENCE), Some(AUDIENCE_USER));
            assert_eq!(found.user_id(), Some("user-1"));
            assert_eq!(found.headers()[HEADER_COMPRESSION], json!(1));
        }

        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn large_uncompressed_payloads_round_trip() {
        let (store, _) = store();
        let payload = json!({ "blob": "z".repeat(5000) });

        let compressed = store.create(auth_session(payload.clone())).await.unwrap();
        let raw = store
            .create(auth_session(payload.clone()).uncompressed())
            .await
            .unwrap();

        let found = store.find_by_id(raw.public_id()).await.unwrap().unwrap();
        assert_eq!(found.headers()[HEADER_COMPRESSION], json!(0));
        assert_eq!(found.payload(), &payload);
        assert!(store.find_by_id(compressed.public_id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn tampered_rows_are_deleted() {
        let (store, repo) = store();
        let session = store.create(auth_session(json!("hello"))).await.unwrap();

        let mut row = repo.find(session.session_id()).await.unwrap().unwrap();
        let mut sig = B64.decode(&row.signature).unwrap();
        sig[0] ^= 0x01;
        row.signature = B64.encode(sig);
        repo.delete(&row.session_id).await.unwrap();
        repo.insert(&row).await.unwrap();

        let err = store.find_by_id(session.session_id()).await.unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_SIGNATURE");
        assert!(store.find_by_id(session.session_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tampered_payload_bytes_are_deleted() {
        let (store, repo) = store();
        let session = store
            .create(auth_session(json!({ "k": "v" })).uncompressed())
            .await
            .unwrap();

        let mut row = repo.find(session.session_id()).await.unwrap().unwrap();
        let mut payload = B64.decode(&row.payload).unwrap();
        payload[0] ^= 0x80;
        row.payload = B64.encode(payload);
        repo.delete(&row.session_id).await.unwrap();
        repo.insert(&row).await.unwrap();

        let err = store.find_by_id(session.public_id()).await.unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_SIGNATURE");
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn sessions_expire() {
        let (store, repo) = store();
        let session = store
            .create(NewSession::new(KIND_AUTH, json!(null)).expires("1s"))
            .await
            .unwrap();

        assert!(store.find_by_id(session.session_id()).await.unwrap().is_some());

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let err = store.find_by_id(session.session_id()).await.unwrap_err();
        assert_eq!(err.code(), "ERR_RESOURCE_EXPIRED");
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn past_expiry_is_rejected() {
        let (store, _) = store();
        let past = Utc::now() - chrono::Duration::minutes(1);
        let err = store
            .create(NewSession::new(KIND_AUTH, json!(1)).expires(past))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn rotation_replaces_and_loses_races() {
        let (store, repo) = store();
        let first = store.create(auth_session(json!({ "a": 1 }))).await.unwrap();
        let old_id = first.session_id().to_string();

        let stale = store.find_by_id(&old_id).await.unwrap().unwrap();
        let rotated = store.rotate(first, "15m").await.unwrap();

        assert_ne!(rotated.session_id(), old_id);
        assert_eq!(rotated.header_str(HEADER_AUDIENCE), Some(AUDIENCE_USER));
        assert_eq!(rotated.payload(), &json!({ "a": 1 }));
        assert!(store.find_by_id(&old_id).await.unwrap().is_none());

        // A concurrent request holding the same old session gets nothing.
        let err = store.rotate(stale, "15m").await.unwrap_err();
        assert_eq!(err.code(), "ERR_RESOURCE_EXPIRED");
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn erase_consumes_and_deletes() {
        let (store, repo) = store();
        let session = store.create(auth_session(json!(true))).await.unwrap();
        let id = session.session_id().to_string();

        store.erase(session).await.unwrap();
        assert!(store.find_by_id(&id).await.unwrap().is_none());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn revoke_by_redacted_form() {
        let (store, repo) = store();
        let redacted = store.create(auth_session(json!(1))).await.unwrap().to_redacted();

        assert!(store.revoke(&redacted).await.unwrap());
        assert!(!store.revoke(&redacted).await.unwrap());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn redacted_document_hides_internals() {
        let (store, _) = store();
        let session = store.create(auth_session(json!({ "secret": 1 }))).await.unwrap();
        let doc = serde_json::to_value(session.to_redacted()).unwrap();

        assert_eq!(doc["publicId"], json!(session.public_id()));
        assert!(doc.get("sessionId").is_none());
        assert!(doc.get("payload").is_none());
        assert!(doc.get("signature").is_none());
        assert!(doc.get("headers").is_none());
    }
}

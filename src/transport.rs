//! Sealed request and response bodies.
//!
//! A sealed body is `AES-256-GCM(nonce || ciphertext)` over a compressed
//! packet of the JSON value, keyed from `TOKEN_KEY`. JSON bodies may also
//! carry a quoted HS256 web token signed with the same key.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec::packet::{self, ZOptions},
    crypto::{
        aes::{self, SecureKey},
        web_token::WebTokens,
    },
    error::{AppError, Result},
    state::AppState,
};

pub const SEALED_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct Transport {
    key: SecureKey,
    tokens: WebTokens,
    packets: ZOptions,
}

impl Transport {
    pub fn new(key: SecureKey, tokens: WebTokens, packets: ZOptions) -> Self {
        Self {
            key,
            tokens,
            packets,
        }
    }

    /// Serializes, frames and encrypts `value`.
    pub async fn seal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = sonic_rs::to_vec(value)
            .map_err(|e| AppError::Internal(format!("Body serialization failed: {}", e)))?;
        let framed = packet::create_compressed_packet(json.as_slice(), &self.packets).await?;
        aes::seal(&self.key, &framed)
    }

    /// Reverses [`Transport::seal`].
    pub async fn open<T: DeserializeOwned>(&self, sealed: &[u8]) -> Result<T> {
        let framed = aes::open(&self.key, sealed)?;
        let json = packet::decompress_packet(&framed, &self.packets).await?;
        sonic_rs::from_slice(&json)
            .map_err(|e| AppError::InvalidArgument(format!("Malformed request body: {}", e)))
    }

    /// Signs `value` into a web token a client can post as a JSON string.
    pub fn sign_token<T: Serialize>(&self, value: &T, ttl: Option<Duration>) -> Result<String> {
        self.tokens.sign(value, ttl)
    }

    /// Reads an `application/json` body. A JSON string holding a valid web
    /// token yields the token's payload; anything else is parsed as is.
    pub fn open_json<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T> {
        if let Ok(token) = sonic_rs::from_slice::<String>(body) {
            match self.tokens.parse(&token) {
                Ok(value) => return Ok(value),
                Err(e) => tracing::debug!("Body is not a usable web token: {}", e),
            }
        }

        sonic_rs::from_slice(body)
            .map_err(|e| AppError::InvalidArgument(format!("Malformed request body: {}", e)))
    }

    /// Builds an `application/octet-stream` response carrying `value` sealed.
    pub async fn respond<T: Serialize>(&self, status: StatusCode, value: &T) -> Result<Response> {
        let body = self.seal(value).await?;
        Ok((status, [(header::CONTENT_TYPE, SEALED_CONTENT_TYPE)], body).into_response())
    }
}

/// Extracts a body that is either sealed (`application/octet-stream`) or
/// JSON, optionally wrapped in a web token.
pub struct Sealed<T>(pub T);

impl<T> FromRequest<AppState> for Sealed<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::InvalidArgument(format!("Unreadable request body: {}", e)))?;

        if content_type.starts_with(SEALED_CONTENT_TYPE) {
            return state.transport.open(&bytes).await.map(Sealed);
        }

        if content_type.starts_with("application/json") {
            return state.transport.open_json(&bytes).map(Sealed);
        }

        Err(AppError::InvalidArgument(
            "One or more required fields are missing on request".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn transport() -> Transport {
        Transport::new(
            SecureKey::new([4u8; 32]),
            WebTokens::new(&[4u8; 32]),
            ZOptions::default(),
        )
    }

    #[tokio::test]
    async fn seal_then_open() {
        let t = transport();
        let value = json!({ "identifier": "someone", "password": "secret-ish", "pad": "p".repeat(600) });
        let sealed = t.seal(&value).await.unwrap();
        let opened: Value = t.open(&sealed).await.unwrap();
        assert_eq!(opened, value);
    }

    #[tokio::test]
    async fn other_keys_cannot_open() {
        let sealed = transport().seal(&json!({ "a": 1 })).await.unwrap();
        let other = Transport::new(
            SecureKey::new([5u8; 32]),
            WebTokens::new(&[5u8; 32]),
            ZOptions::default(),
        );
        let err = other.open::<Value>(&sealed).await.unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_SIGNATURE");
    }

    #[test]
    fn json_bodies_accept_tokens_and_plain_values() {
        let t = transport();
        let value = json!({ "identifier": "ana", "password": "hunter22" });

        let token = t.sign_token(&value, Some(Duration::minutes(5))).unwrap();
        let body = serde_json::to_vec(&token).unwrap();
        assert_eq!(t.open_json::<Value>(&body).unwrap(), value);

        let plain = serde_json::to_vec(&value).unwrap();
        assert_eq!(t.open_json::<Value>(&plain).unwrap(), value);
    }

    #[derive(Debug, serde::Deserialize)]
    struct Login {
        #[allow(dead_code)]
        identifier: String,
    }

    #[test]
    fn foreign_tokens_fall_back_to_plain_json() {
        let foreign = WebTokens::new(&[7u8; 32])
            .sign(&json!({ "identifier": "ana" }), None)
            .unwrap();
        let body = serde_json::to_vec(&foreign).unwrap();

        let err = transport().open_json::<Login>(&body).unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_ARGUMENT");
    }
}

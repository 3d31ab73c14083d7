//! HS256 web tokens keyed by `TOKEN_KEY`.
//!
//! Claims carry the caller's value under `payload` next to a `__brand`
//! marker; tokens without the marker are refused even if the MAC holds.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{AppError, Result};

const BRAND: &str = "__t";

#[derive(Serialize, Deserialize)]
struct Claims<T> {
    #[serde(rename = "__brand", default)]
    brand: String,
    payload: T,
    #[serde(default)]
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

#[derive(Clone)]
pub struct WebTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl WebTokens {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Signs `payload` into a compact token.
    ///
    /// # Arguments
    ///
    /// * `payload` - The value to carry.
    /// * `ttl` - Lifetime of the token; `None` never expires.
    pub fn sign<T: Serialize>(&self, payload: &T, ttl: Option<Duration>) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            brand: BRAND.to_string(),
            payload,
            iat: now.timestamp(),
            exp: ttl.map(|ttl| (now + ttl).timestamp()),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Encryption(format!("Failed to sign web token: {}", e)))
    }

    /// Verifies `token` and returns its payload.
    pub fn parse<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<Claims<T>>(token, &self.decoding, &validation)
            .map_err(|e| AppError::InvalidSignature(format!("Web token rejected: {}", e)))?;

        if data.claims.brand != BRAND {
            return Err(AppError::InvalidSignature(
                "Something was wrong with the web token".to_string(),
            ));
        }

        Ok(data.claims.payload)
    }
}

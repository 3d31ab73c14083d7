use std::env;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

use crate::codec::packet::DEFAULT_THRESHOLD;
use crate::crypto::envelope::EnvelopeScheme;
use crate::crypto::key_material::decode_secret;
use crate::models::card::DEFAULT_CHUNK_SIZE;
use crate::utils::time::parse_duration;

/// Where rows are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database, required for the Postgres backend.
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    /// `APP_ENV`; `production` turns on `Secure` cookies.
    pub app_env: String,
    pub bind_addr: String,
    /// Lifetime of every minted session, as a relative expression.
    pub session_ttl: String,
    pub card_chunk_size: usize,
    pub compression_threshold: usize,
    pub envelope_scheme: EnvelopeScheme,
    /// Envelope key material.
    pub enc_key: Zeroizing<Vec<u8>>,
    /// MAC key.
    pub sign_key: Zeroizing<Vec<u8>>,
    /// Transport key material.
    pub token_key: Zeroizing<Vec<u8>>,
}

fn secret(name: &str, encoding_var: &str) -> Result<Zeroizing<Vec<u8>>> {
    let raw = Zeroizing::new(env::var(name).with_context(|| format!("{} must be set", name))?);
    let encoding = env::var(encoding_var).ok();

    decode_secret(&raw, encoding.as_deref())
        .map_err(|e| anyhow::anyhow!("{} could not be decoded: {}", name, e))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

/// Checks that `raw` is a relative time that leaves sessions a lifetime.
fn validate_session_ttl(raw: &str) -> Result<()> {
    let ttl = parse_duration(raw).map_err(|e| anyhow::anyhow!("Invalid SESSION_TTL: {}", e))?;
    if ttl <= chrono::Duration::zero() {
        anyhow::bail!("SESSION_TTL must be positive, got '{}'", raw);
    }
    Ok(())
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => anyhow::bail!("Unknown STORE_BACKEND '{}'", other),
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let envelope_scheme = match env::var("ENVELOPE_SCHEME") {
            Ok(s) => s
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid ENVELOPE_SCHEME: {}", e))?,
            Err(_) => EnvelopeScheme::default(),
        };

        let session_ttl = env::var("SESSION_TTL").unwrap_or_else(|_| "15m".to_string());
        validate_session_ttl(&session_ttl)?;

        let card_chunk_size: usize = parse_or("CARD_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        if card_chunk_size == 0 {
            anyhow::bail!("CARD_CHUNK_SIZE must be positive");
        }

        Ok(Self {
            database_url,
            store_backend,
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:4001".to_string()),
            session_ttl,
            card_chunk_size,
            compression_threshold: parse_or("COMPRESSION_THRESHOLD", DEFAULT_THRESHOLD)?,
            envelope_scheme,
            enc_key: secret("K_ENC_KEY", "KEC_ENCODING")?,
            sign_key: secret("K_SIGN_KEY", "KSN_ENCODING")?,
            token_key: secret("TOKEN_KEY", "KWT_ENCODING")?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}

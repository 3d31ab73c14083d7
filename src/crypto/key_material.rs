use base64::{Engine as _, engine::general_purpose};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// Byte layout of a cipher's key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthInfo {
    /// Length of the master key.
    pub length: usize,
    /// Length of the initialization vector (0 when unused).
    pub iv_length: usize,
    /// Length of the authentication tag (0 when unused).
    pub auth_tag_length: usize,
}

/// Preset algorithms whose key layout is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20,
    Custom(LengthInfo),
}

impl Algorithm {
    pub fn length_info(&self) -> LengthInfo {
        let (length, iv_length, auth_tag_length) = match self {
            Algorithm::Aes128Cbc => (16, 16, 0),
            Algorithm::Aes256Cbc => (32, 16, 0),
            Algorithm::Aes128Gcm => (16, 12, 16),
            Algorithm::Aes256Gcm => (32, 12, 16),
            Algorithm::ChaCha20 => (32, 12, 0),
            Algorithm::Custom(info) => return *info,
        };

        LengthInfo {
            length,
            iv_length,
            auth_tag_length,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Aes128Cbc => "aes-128-cbc",
            Algorithm::Aes256Cbc => "aes-256-cbc",
            Algorithm::Aes128Gcm => "aes-128-gcm",
            Algorithm::Aes256Gcm => "aes-256-gcm",
            Algorithm::ChaCha20 => "chacha20",
            Algorithm::Custom(_) => "custom",
        }
    }
}

impl std::str::FromStr for Algorithm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aes-128-cbc" => Ok(Algorithm::Aes128Cbc),
            "aes-256-cbc" => Ok(Algorithm::Aes256Cbc),
            "aes-128-gcm" => Ok(Algorithm::Aes128Gcm),
            "aes-256-gcm" => Ok(Algorithm::Aes256Gcm),
            "chacha20" => Ok(Algorithm::ChaCha20),
            other => Err(AppError::InvalidArgument(format!(
                "An unknown encryption algorithm was received in some operation: e_no_cipher_{}",
                other
            ))),
        }
    }
}

/// Key material carved positionally out of one secret.
pub struct KeyInfo {
    pub master: Zeroizing<Vec<u8>>,
    pub iv: Option<Zeroizing<Vec<u8>>>,
    pub auth_tag: Option<Zeroizing<Vec<u8>>>,
    pub left: Option<Zeroizing<Vec<u8>>>,
    pub byte_length: usize,
}

impl KeyInfo {
    /// Returns the IV or fails with `ERR_CRYPTO_SHORT_KEY`.
    pub fn require_iv(&self) -> Result<&[u8]> {
        self.iv.as_deref().map(Vec::as_slice).ok_or_else(|| {
            AppError::ShortKey("The encryption key in current environment is too short".to_string())
        })
    }
}

/// Splits `secret` into master key, IV, auth tag and leftover bytes.
///
/// # Arguments
///
/// * `algorithm` - The algorithm whose layout drives the split.
/// * `secret` - The raw key material.
///
/// # Returns
///
/// A `KeyInfo` with every portion the secret is long enough to supply.
pub fn consume(algorithm: Algorithm, secret: &[u8]) -> Result<KeyInfo> {
    let LengthInfo {
        length,
        iv_length,
        auth_tag_length,
    } = algorithm.length_info();

    if secret.len() < length {
        return Err(AppError::ShortKey(format!(
            "Cannot consume a short key ({}) for algorithm '{}'",
            secret.len(),
            algorithm.name()
        )));
    }

    let master = Zeroizing::new(secret[..length].to_vec());

    let iv = (iv_length > 0 && secret.len() >= length + iv_length)
        .then(|| Zeroizing::new(secret[length..length + iv_length].to_vec()));

    let tag_end = length + iv_length + auth_tag_length;
    let auth_tag = (auth_tag_length > 0 && secret.len() >= tag_end)
        .then(|| Zeroizing::new(secret[length + iv_length..tag_end].to_vec()));

    let left = (secret.len() > tag_end).then(|| Zeroizing::new(secret[tag_end..].to_vec()));

    Ok(KeyInfo {
        master,
        iv,
        auth_tag,
        left,
        byte_length: secret.len(),
    })
}

/// Turns a configured secret string into raw bytes according to an optional
/// encoding hint. Unknown or absent hints keep the UTF-8 bytes.
pub fn decode_secret(raw: &str, encoding: Option<&str>) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
        Some("hex") => hex::decode(raw.trim())
            .map_err(|e| AppError::InvalidArgument(format!("Invalid hex key material: {}", e)))?,
        Some("base64") => general_purpose::STANDARD
            .decode(raw.trim())
            .map_err(|e| AppError::InvalidArgument(format!("Invalid base64 key material: {}", e)))?,
        Some("base64url") => general_purpose::URL_SAFE_NO_PAD
            .decode(raw.trim().trim_end_matches('='))
            .map_err(|e| AppError::InvalidArgument(format!("Invalid base64url key material: {}", e)))?,
        Some("latin1") | Some("binary") => raw.chars().map(|c| c as u32 as u8).collect(),
        _ => raw.as_bytes().to_vec(),
    };

    Ok(Zeroizing::new(bytes))
}

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

type HmacSha512 = Hmac<Sha512>;

/// The size of an HMAC-SHA512 tag in bytes.
pub const TAG_SIZE: usize = 64;

/// HMAC-SHA512 signer keyed independently from the envelope cipher.
#[derive(Clone)]
pub struct Signer {
    key: Zeroizing<Vec<u8>>,
}

impl Signer {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(AppError::ShortKey("Sign key must not be empty".to_string()));
        }

        Ok(Self {
            key: Zeroizing::new(key.to_vec()),
        })
    }

    fn mac(&self) -> HmacSha512 {
        // HMAC accepts keys of any length, this cannot fail.
        <HmacSha512 as Mac>::new_from_slice(&self.key).unwrap_or_else(|_| unreachable!())
    }

    /// Computes the tag over `payload`.
    pub fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Computes the tag over several parts as if they were concatenated.
    pub fn sign_parts(&self, parts: &[&[u8]]) -> Vec<u8> {
        let mut mac = self.mac();
        for part in parts {
            mac.update(part);
        }
        mac.finalize().into_bytes().to_vec()
    }

    pub fn sign_base64(&self, payload: &[u8]) -> String {
        general_purpose::STANDARD.encode(self.sign(payload))
    }

    /// Deterministic lookup hash, hex encoded.
    pub fn sign_hex(&self, payload: &[u8]) -> String {
        hex::encode(self.sign(payload))
    }

    /// Constant-time comparison of a recomputed tag against `expected`.
    pub fn verify(&self, payload: &[u8], expected: &[u8]) -> bool {
        tags_equal(&self.sign(payload), expected)
    }
}

/// Constant-time tag equality; length mismatches compare unequal.
pub fn tags_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

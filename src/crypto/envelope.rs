//! Envelope encryption of arbitrary byte payloads.
//!
//! The default scheme is AES-256-CBC with key and IV carved from the
//! configured secret, so equal plaintexts produce equal ciphertexts. The
//! `Aes256Gcm` scheme prefixes a random nonce to every ciphertext instead.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use crate::crypto::aes::{self as gcm, SecureKey};
use crate::crypto::key_material::{self, Algorithm};
use crate::error::{AppError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Which cipher construction wraps payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeScheme {
    /// Static IV from key material; interoperable with previously stored data.
    #[default]
    Aes256Cbc,
    /// Per-message random nonce, authenticated.
    Aes256Gcm,
}

impl std::str::FromStr for EnvelopeScheme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-256-cbc" | "cbc" => Ok(EnvelopeScheme::Aes256Cbc),
            "aes-256-gcm" | "gcm" => Ok(EnvelopeScheme::Aes256Gcm),
            other => Err(AppError::InvalidArgument(format!(
                "Unknown envelope scheme '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone)]
enum EnvelopeKey {
    Cbc {
        key: Zeroizing<Vec<u8>>,
        iv: Zeroizing<Vec<u8>>,
    },
    Gcm(SecureKey),
}

/// Wraps and unwraps payloads with the envelope key.
#[derive(Clone)]
pub struct Envelope {
    key: EnvelopeKey,
}

impl Envelope {
    /// Builds an envelope from raw key material.
    ///
    /// # Arguments
    ///
    /// * `secret` - The raw `K_ENC_KEY` bytes.
    /// * `scheme` - The cipher construction to use.
    ///
    /// # Returns
    ///
    /// An `Envelope`, or `ERR_CRYPTO_SHORT_KEY` when the secret cannot supply
    /// the key (and, for CBC, the IV).
    pub fn new(secret: &[u8], scheme: EnvelopeScheme) -> Result<Self> {
        let key = match scheme {
            EnvelopeScheme::Aes256Cbc => {
                let info = key_material::consume(Algorithm::Aes256Cbc, secret)?;
                let iv = Zeroizing::new(info.require_iv()?.to_vec());
                EnvelopeKey::Cbc {
                    key: info.master,
                    iv,
                }
            }
            EnvelopeScheme::Aes256Gcm => {
                let info = key_material::consume(Algorithm::Aes256Gcm, secret)?;
                EnvelopeKey::Gcm(SecureKey::from_slice(&info.master)?)
            }
        };

        Ok(Self { key })
    }

    pub fn scheme(&self) -> EnvelopeScheme {
        match self.key {
            EnvelopeKey::Cbc { .. } => EnvelopeScheme::Aes256Cbc,
            EnvelopeKey::Gcm(_) => EnvelopeScheme::Aes256Gcm,
        }
    }

    /// Encrypts `plaintext`.
    pub fn redact(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            EnvelopeKey::Cbc { key, iv } => {
                let cipher = Aes256CbcEnc::new_from_slices(key, iv)
                    .map_err(|e| AppError::ShortKey(format!("Invalid envelope key: {}", e)))?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
            }
            EnvelopeKey::Gcm(key) => gcm::seal(key, plaintext),
        }
    }

    /// Decrypts a buffer produced by [`Envelope::redact`].
    pub fn unwrap_redacted(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            EnvelopeKey::Cbc { key, iv } => {
                let cipher = Aes256CbcDec::new_from_slices(key, iv)
                    .map_err(|e| AppError::ShortKey(format!("Invalid envelope key: {}", e)))?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| AppError::InvalidArgument("Bad envelope padding".to_string()))
            }
            EnvelopeKey::Gcm(key) => gcm::open(key, ciphertext),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secret() -> Vec<u8> {
        (0u8..48).map(|b| b.wrapping_mul(37)).collect()
    }

    #[test]
    fn cbc_is_deterministic() {
        let envelope = Envelope::new(&secret(), EnvelopeScheme::Aes256Cbc).unwrap();
        let a = envelope.redact(b"session-id").unwrap();
        let b = envelope.redact(b"session-id").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len() % 16, 0);
    }

    #[test]
    fn gcm_is_randomized() {
        let envelope = Envelope::new(&secret(), EnvelopeScheme::Aes256Gcm).unwrap();
        let a = envelope.redact(b"session-id").unwrap();
        let b = envelope.redact(b"session-id").unwrap();

        assert_ne!(a, b);
        assert_eq!(envelope.unwrap_redacted(&a).unwrap(), b"session-id");
    }

    #[test]
    fn cbc_requires_iv_bytes() {
        let err = Envelope::new(&[3u8; 40], EnvelopeScheme::Aes256Cbc).err().unwrap();
        assert_eq!(err.code(), "ERR_CRYPTO_SHORT_KEY");

        // GCM only needs the master key.
        assert!(Envelope::new(&[3u8; 40], EnvelopeScheme::Aes256Gcm).is_ok());
    }

    #[test]
    fn wrong_key_does_not_unwrap_cleanly() {
        let a = Envelope::new(&secret(), EnvelopeScheme::Aes256Cbc).unwrap();
        let b = Envelope::new(&[5u8; 48], EnvelopeScheme::Aes256Cbc).unwrap();
        let ct = a.redact(b"a reasonably long plaintext for cbc").unwrap();

        match b.unwrap_redacted(&ct) {
            Ok(pt) => assert_ne!(pt, b"a reasonably long plaintext for cbc"),
            Err(e) => assert_eq!(e.code(), "ERR_INVALID_ARGUMENT"),
        }
    }

    proptest! {
        #[test]
        fn unwrap_inverts_redact(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            for scheme in [EnvelopeScheme::Aes256Cbc, EnvelopeScheme::Aes256Gcm] {
                let envelope = Envelope::new(&secret(), scheme).unwrap();
                let ct = envelope.redact(&data).unwrap();
                prop_assert_eq!(envelope.unwrap_redacted(&ct).unwrap(), data.clone());
            }
        }
    }
}

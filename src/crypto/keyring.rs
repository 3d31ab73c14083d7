use crate::crypto::aes::SecureKey;
use crate::crypto::envelope::{Envelope, EnvelopeScheme};
use crate::crypto::key_material::{self, Algorithm};
use crate::crypto::mac::Signer;
use crate::crypto::web_token::WebTokens;
use crate::error::Result;

/// Every key the process works with, derived once at start-up.
#[derive(Clone)]
pub struct Keyring {
    /// Wraps session ids, stored payloads, card chunks and email addresses.
    pub envelope: Envelope,
    /// Signs session composites and card chunks, hashes lookup keys.
    pub signer: Signer,
    /// Encrypts request and response bodies on the wire.
    pub transport: SecureKey,
    /// Signs and verifies JSON body tokens with the raw `TOKEN_KEY`.
    pub tokens: WebTokens,
}

impl Keyring {
    /// Builds the keyring from raw key material.
    ///
    /// # Arguments
    ///
    /// * `enc_key` - Envelope key material (`K_ENC_KEY`).
    /// * `sign_key` - MAC key (`K_SIGN_KEY`).
    /// * `token_key` - Transport key material (`TOKEN_KEY`).
    /// * `scheme` - The envelope cipher construction.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Keyring`.
    pub fn new(
        enc_key: &[u8],
        sign_key: &[u8],
        token_key: &[u8],
        scheme: EnvelopeScheme,
    ) -> Result<Self> {
        let envelope = Envelope::new(enc_key, scheme)?;
        let signer = Signer::new(sign_key)?;

        let transport = key_material::consume(Algorithm::Aes256Gcm, token_key)?;
        let transport = SecureKey::from_slice(&transport.master)?;

        Ok(Self {
            envelope,
            signer,
            transport,
            tokens: WebTokens::new(token_key),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A keyring with fixed, distinct keys for unit and integration tests.
    pub(crate) fn test_keyring() -> Keyring {
        let enc: Vec<u8> = (0u8..48).collect();
        let sign = b"test-sign-key-material".to_vec();
        let token: Vec<u8> = (100u8..132).collect();
        Keyring::new(&enc, &sign, &token, EnvelopeScheme::Aes256Cbc).unwrap()
    }

    #[test]
    fn short_token_key_is_rejected() {
        let enc: Vec<u8> = (0u8..48).collect();
        let err = Keyring::new(&enc, b"k", &[1u8; 8], EnvelopeScheme::Aes256Cbc)
            .err()
            .unwrap();
        assert_eq!(err.code(), "ERR_CRYPTO_SHORT_KEY");
    }

    #[test]
    fn builds_with_both_schemes() {
        let enc: Vec<u8> = (0u8..48).collect();
        for scheme in [EnvelopeScheme::Aes256Cbc, EnvelopeScheme::Aes256Gcm] {
            let keys = Keyring::new(&enc, b"k", &[2u8; 32], scheme).unwrap();
            assert_eq!(keys.envelope.scheme(), scheme);
        }
    }
}

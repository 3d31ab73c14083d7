use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::crypto::mac::tags_equal;
use crate::error::{AppError, Result};

/// PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
/// Length of the derived digest in bytes.
pub const DIGEST_LEN: usize = 64;
/// Length of a freshly generated salt in bytes.
pub const DEFAULT_SALT_LEN: usize = 64;
/// Shortest accepted password, counted after trimming.
pub const MIN_PASSWORD_LEN: usize = 6;

/// A password that is either still plaintext or already a PBKDF2 digest.
///
/// The state only ever moves from plaintext to hashed.
pub struct Password {
    value: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    hashed: bool,
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("hashed", &self.hashed)
            .finish_non_exhaustive()
    }
}

/// Returns `true` when `value` is long enough to be accepted as a password.
pub fn validate(value: &str) -> bool {
    value.trim().chars().count() >= MIN_PASSWORD_LEN
}

/// Generates `len` random bytes from the OS RNG.
pub fn random_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn derive(password: &[u8], salt: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; DIGEST_LEN]);
    pbkdf2_hmac::<Sha512>(password, salt, PBKDF2_ITERATIONS, &mut out);
    out
}

async fn derive_blocking(password: Zeroizing<Vec<u8>>, salt: Vec<u8>) -> Result<Zeroizing<Vec<u8>>> {
    tokio::task::spawn_blocking(move || derive(&password, &salt))
        .await
        .map_err(|e| AppError::Internal(format!("Password derivation task failed: {}", e)))
}

impl Password {
    /// Wraps a password value.
    ///
    /// # Arguments
    ///
    /// * `value` - The plaintext, or the stored digest when `hashed` is set.
    /// * `hashed` - Whether `value` is already a digest.
    /// * `salt` - The salt to derive with; a fresh one is generated when absent.
    ///
    /// # Returns
    ///
    /// The `Password`, or a validation error when a plaintext is too short.
    pub fn create(value: impl AsRef<[u8]>, hashed: bool, salt: Option<Vec<u8>>) -> Result<Self> {
        let value = value.as_ref();

        if !hashed {
            let text = std::str::from_utf8(value)
                .map_err(|_| AppError::Validation("The provided password is not valid".to_string()))?;

            if !validate(text) {
                return Err(AppError::Validation(
                    "The provided password is not valid".to_string(),
                ));
            }
        }

        let salt = match salt {
            Some(s) if !s.is_empty() => s,
            _ => random_salt(DEFAULT_SALT_LEN),
        };

        Ok(Self {
            value: Zeroizing::new(value.to_vec()),
            salt,
            hashed,
        })
    }

    pub fn is_hashed(&self) -> bool {
        self.hashed
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Returns the digest, deriving and caching it on first use.
    pub async fn hashed_value(&mut self) -> Result<Vec<u8>> {
        if !self.hashed {
            let digest = derive_blocking(self.value.clone(), self.salt.clone()).await?;
            self.value = digest;
            self.hashed = true;
        }

        Ok(self.value.to_vec())
    }

    /// Checks `candidate` against this password in constant time.
    pub async fn compare(&self, candidate: impl AsRef<[u8]>) -> Result<bool> {
        let candidate = candidate.as_ref();

        if !self.hashed {
            return Ok(tags_equal(&self.value, candidate));
        }

        let digest = derive_blocking(Zeroizing::new(candidate.to_vec()), self.salt.clone()).await?;
        Ok(tags_equal(&digest, &self.value))
    }
}

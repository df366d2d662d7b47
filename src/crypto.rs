//! Password-based sealing for payload entries.
//!
//! Scheme (format version 1):
//! - Argon2id turns `(password, salt)` into a 256-bit key; the cost
//!   parameters travel in the manifest descriptor so future archives can
//!   strengthen them without breaking old readers.
//! - AES-256-GCM seals each payload entry independently under the same key
//!   with a distinct nonce; the 16-byte tag is appended to the ciphertext
//!   (the `aes-gcm` crate's native framing), so a sealed entry is always
//!   `plaintext_len + TAG_LEN` bytes.
//!
//! Randomness is an injected capability ([`RandomSource`]) rather than
//! implicit global state, so tests can supply deterministic bytes; the
//! default [`OsRandom`] draws from the OS CSPRNG and is safe to share across
//! threads.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use crate::error::{AuthHint, Error, Result};

/// Derived key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;
/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// KDF salt length in bytes.
pub const SALT_LEN: usize = 16;
/// GCM authentication tag length in bytes, appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// A provider of cryptographically secure random bytes.
///
/// `pack` draws salts and nonces through this trait. Production code uses
/// [`OsRandom`]; tests may inject a deterministic source to make sealed
/// archives reproducible.
pub trait RandomSource {
    /// Fill `buf` entirely with random bytes.
    fn fill(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// The default [`RandomSource`]: the operating system's CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| Error::Crypto(format!("os random source failed: {e}")))
    }
}

/// Argon2id cost parameters, recorded verbatim in the manifest descriptor.
///
/// The defaults follow the argon2 crate's current recommendations; opening
/// an archive always uses the parameters stored in its own manifest, so
/// changing these defaults never invalidates existing archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of passes over memory.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// Derive the symmetric key for `password` under `salt`.
///
/// Deliberately CPU- and memory-expensive; callers on a latency-sensitive
/// path should run this off it.
pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| Error::Crypto(format!("key derivation parameters rejected: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::Crypto(format!("key derivation failed: {e}")))?;
    Ok(key)
}

/// Seal `plaintext` under `key`/`nonce`, returning `ciphertext || tag`.
pub fn seal(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("cipher setup failed: {e}")))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| Error::Crypto("sealing failed".to_string()))
}

/// Inverse of [`seal`].
///
/// A tag mismatch, whether from a wrong key or from flipped bits, is
/// reported as [`Error::AuthenticationFailure`] for `entry` with an
/// [`AuthHint::Unknown`] hint; callers holding a stored-bytes checksum may
/// replace the hint with a narrower one.
pub fn open_sealed(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    sealed: &[u8],
    entry: &str,
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| Error::Crypto(format!("cipher setup failed: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| Error::AuthenticationFailure {
            entry: entry.to_string(),
            hint: AuthHint::Unknown,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cheap parameters keep KDF tests fast; production defaults are
    /// exercised implicitly by the descriptor round-trip tests.
    fn cheap() -> KdfParams {
        KdfParams {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn derive_key_is_deterministic_per_password_and_salt() -> anyhow::Result<()> {
        let salt = [7u8; SALT_LEN];
        let a = derive_key("hunter2", &salt, &cheap())?;
        let b = derive_key("hunter2", &salt, &cheap())?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn derive_key_varies_with_salt_and_password() -> anyhow::Result<()> {
        let base = derive_key("hunter2", &[7u8; SALT_LEN], &cheap())?;
        let other_salt = derive_key("hunter2", &[8u8; SALT_LEN], &cheap())?;
        let other_password = derive_key("hunter3", &[7u8; SALT_LEN], &cheap())?;
        assert_ne!(base, other_salt);
        assert_ne!(base, other_password);
        Ok(())
    }

    #[test]
    fn sealed_length_is_plaintext_plus_tag() -> anyhow::Result<()> {
        let key = [1u8; KEY_LEN];
        let nonce = [2u8; NONCE_LEN];
        let sealed = seal(&key, &nonce, b"twelve bytes")?;
        assert_eq!(sealed.len(), 12 + TAG_LEN);
        Ok(())
    }

    #[test]
    fn seal_then_open_round_trips() -> anyhow::Result<()> {
        let key = [9u8; KEY_LEN];
        let nonce = [3u8; NONCE_LEN];
        let sealed = seal(&key, &nonce, b"opaque audio bytes")?;
        let opened = open_sealed(&key, &nonce, &sealed, "audio/audio.bin")?;
        assert_eq!(opened, b"opaque audio bytes");
        Ok(())
    }

    #[test]
    fn open_with_wrong_key_fails_authentication() -> anyhow::Result<()> {
        let nonce = [3u8; NONCE_LEN];
        let sealed = seal(&[9u8; KEY_LEN], &nonce, b"payload")?;
        let err = open_sealed(&[10u8; KEY_LEN], &nonce, &sealed, "audio/audio.bin").unwrap_err();
        assert!(matches!(
            err,
            Error::AuthenticationFailure {
                hint: AuthHint::Unknown,
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn open_with_wrong_nonce_fails_authentication() -> anyhow::Result<()> {
        let key = [9u8; KEY_LEN];
        let sealed = seal(&key, &[3u8; NONCE_LEN], b"payload")?;
        let err = open_sealed(&key, &[4u8; NONCE_LEN], &sealed, "audio/audio.bin").unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure { .. }));
        Ok(())
    }

    #[test]
    fn any_single_flipped_ciphertext_byte_fails_authentication() -> anyhow::Result<()> {
        let key = [5u8; KEY_LEN];
        let nonce = [6u8; NONCE_LEN];
        let sealed = seal(&key, &nonce, b"tamper with me")?;

        for i in 0..sealed.len() {
            let mut bent = sealed.clone();
            bent[i] ^= 0x01;
            let err = open_sealed(&key, &nonce, &bent, "e").unwrap_err();
            assert!(matches!(err, Error::AuthenticationFailure { .. }));
        }
        Ok(())
    }

    #[test]
    fn os_random_fills_are_not_repeated() -> anyhow::Result<()> {
        let mut rng = OsRandom;
        let mut a = [0u8; SALT_LEN];
        let mut b = [0u8; SALT_LEN];
        rng.fill(&mut a)?;
        rng.fill(&mut b)?;
        assert_ne!(a, b);
        Ok(())
    }
}

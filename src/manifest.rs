//! The bundle manifest: what the container holds and how to unlock it.
//!
//! The manifest is JSON, always the first entry in the container, and always
//! clear text, since a loader must be able to tell whether a password is
//! needed without having one. It is a growable, versioned record:
//! - unknown fields are ignored, so newer producers can attach extras
//!   without breaking this reader;
//! - an unknown `format_version` is rejected explicitly
//!   ([`Error::UnsupportedVersion`]) before any shape validation, so a
//!   well-formed future manifest never masquerades as a parse error.

use serde::{Deserialize, Serialize};

use crate::crypto::KdfParams;
use crate::error::{Error, Result};

/// The container entry holding the manifest. Fixed across all versions.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// The one format version this build reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// AEAD identifier written into version-1 descriptors.
pub const ALGORITHM_AES_256_GCM: &str = "aes-256-gcm";

/// KDF identifier written into version-1 descriptors.
pub const KDF_ARGON2ID: &str = "argon2id";

/// Archive layout, format version, and encryption parameters for one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version; see [`FORMAT_VERSION`].
    pub format_version: u32,

    /// Container path of the audio blob. Required.
    pub audio_entry: String,

    /// Container path of the compressed transcript, absent when the bundle
    /// has no transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_entry: Option<String>,

    /// Container path of the metadata record, absent when none was provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_entry: Option<String>,

    /// Present iff the payload entries are sealed. The manifest itself never is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionDescriptor>,

    /// BLAKE3 checksums over stored entry bytes, when the producer recorded
    /// them. See [`EntryChecksums`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksums: Option<EntryChecksums>,
}

/// How the payload entries were sealed and how to re-derive the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionDescriptor {
    /// AEAD name, e.g. `"aes-256-gcm"`. Anything this build does not
    /// implement is rejected with an upgrade hint, never guessed at.
    pub algorithm: String,

    /// KDF name, e.g. `"argon2id"`.
    pub kdf: String,

    /// Cost parameters the key was derived under.
    pub kdf_params: KdfParams,

    /// KDF salt, freshly drawn per archive.
    #[serde(with = "base64_bytes")]
    pub salt: Vec<u8>,

    /// Per-entry AEAD nonces. Entries share the derived key, never a nonce.
    pub nonces: EntryNonces,
}

/// One nonce per sealed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryNonces {
    #[serde(with = "base64_bytes")]
    pub audio: Vec<u8>,

    /// Absent when the bundle has no transcript entry.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes_opt"
    )]
    pub transcript: Option<Vec<u8>>,
}

/// BLAKE3 hex digests of stored entry bytes (post-compression,
/// post-encryption).
///
/// These let a loader say something useful when tag verification fails:
/// stored bytes that no longer match their checksum point at corruption
/// rather than a wrong password. Producers that omit them lose only that
/// hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryChecksums {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl Manifest {
    /// Whether opening this bundle's payload requires a password.
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }
}

/// Serialize a manifest to its stored JSON form.
pub fn serialize(manifest: &Manifest) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| Error::Internal(format!("failed to serialize manifest: {e}")))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse a stored manifest.
///
/// The version is probed before anything else so the error for a future
/// archive is [`Error::UnsupportedVersion`] with the offending number, not a
/// shape mismatch.
pub fn parse(bytes: &[u8]) -> Result<Manifest> {
    #[derive(Deserialize)]
    struct VersionProbe {
        format_version: u32,
    }

    let probe: VersionProbe = serde_json::from_slice(bytes)
        .map_err(|e| Error::MalformedManifest(e.to_string()))?;
    if probe.format_version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(probe.format_version));
    }

    let manifest: Manifest = serde_json::from_slice(bytes)
        .map_err(|e| Error::MalformedManifest(e.to_string()))?;
    if manifest.audio_entry.is_empty() {
        return Err(Error::MalformedManifest(
            "audio_entry must not be empty".to_string(),
        ));
    }
    Ok(manifest)
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod base64_bytes_opt {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| STANDARD.decode(t.as_bytes()))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

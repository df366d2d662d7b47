//! Bundle loading: validate, unseal, decompress, reconstruct.
//!
//! The intent is:
//! - Structural problems are fatal: a broken container, manifest, or
//!   compression stream means there is no bundle to return.
//! - Content problems inside an otherwise-good archive are not. A bad
//!   transcript line or unreadable metadata gets skipped with a [`Warning`],
//!   keeping the playable parts reachable. Packing is strict so such
//!   archives shouldn't exist, but loading meets them halfway.
//! - `AuthenticationFailure` never says in its type whether the password was
//!   wrong or the file damaged; when stored-entry checksums are present they
//!   pick the human hint, nothing more.
//!
//! [`inspect`] is the cheap probe over the same wire format: manifest and
//! entry list only, no password, no payload work.

use std::fmt;

use tracing::{debug, warn};

use crate::Metadata;
use crate::compression;
use crate::container::Container;
use crate::crypto::{self, NONCE_LEN};
use crate::error::{AuthHint, Error, Result};
use crate::manifest::{
    self, ALGORITHM_AES_256_GCM, EncryptionDescriptor, KDF_ARGON2ID, MANIFEST_ENTRY, Manifest,
};
use crate::segment::TranscriptSegment;
use crate::segment_codec;

/// A non-fatal finding from [`open`]. The bundle is usable; something in it
/// was not.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A transcript line could not be decoded and was dropped.
    SkippedSegment { line: usize, reason: String },
    /// `segments[index]` starts before its predecessor. Reported once, for
    /// the first offending index.
    OutOfOrderSegments { index: usize },
    /// The metadata entry exists but is not a JSON object; an empty mapping
    /// was returned instead.
    MetadataUnreadable { reason: String },
    /// Stored bytes of an unencrypted entry do not match their recorded
    /// checksum.
    ChecksumMismatch { entry: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SkippedSegment { line, reason } => {
                write!(f, "transcript line {line} skipped: {reason}")
            }
            Warning::OutOfOrderSegments { index } => {
                write!(f, "segment {index} starts before its predecessor")
            }
            Warning::MetadataUnreadable { reason } => {
                write!(f, "metadata entry unreadable, returning empty mapping: {reason}")
            }
            Warning::ChecksumMismatch { entry } => {
                write!(f, "stored bytes of `{entry}` do not match their checksum")
            }
        }
    }
}

/// Everything a bundle holds, reconstructed.
#[derive(Debug)]
pub struct LoadedBundle {
    /// The original encoded audio, byte-for-byte. Never decoded here.
    pub audio_bytes: Vec<u8>,
    /// Transcript segments in archive order.
    pub segments: Vec<TranscriptSegment>,
    /// Free-form metadata; empty when the bundle carries none.
    pub metadata: Metadata,
    /// Non-fatal findings, in the order they were hit.
    pub warnings: Vec<Warning>,
}

impl LoadedBundle {
    /// The first segment whose time span contains `seconds`, endpoints
    /// inclusive. What a playback cursor asks while the file plays.
    pub fn segment_at(&self, seconds: f64) -> Option<&TranscriptSegment> {
        self.segments.iter().find(|s| s.contains(seconds))
    }
}

/// What [`inspect`] can tell without a password.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleInfo {
    pub format_version: u32,
    pub encrypted: bool,
    pub has_transcript: bool,
    pub has_metadata: bool,
    /// Container entry names in archive order, referenced or not.
    pub entries: Vec<String>,
}

/// Open an archive and reconstruct its bundle.
pub fn open(archive: &[u8], password: Option<&str>) -> Result<LoadedBundle> {
    let mut container = Container::open(archive)?;
    let manifest = read_manifest(&mut container)?;

    // Referenced entries are read before anything cryptographic, so a
    // truncated archive reports what is missing rather than asking for a
    // password first.
    let stored_audio = container.read_entry(&manifest.audio_entry)?;
    let stored_transcript = manifest
        .transcript_entry
        .as_deref()
        .map(|name| container.read_entry(name))
        .transpose()?;
    let stored_metadata = manifest
        .metadata_entry
        .as_deref()
        .map(|name| container.read_entry(name))
        .transpose()?;

    let mut warnings = Vec::new();

    let (audio_bytes, transcript_stream) = match &manifest.encryption {
        Some(descriptor) => {
            let password = password.ok_or(Error::PasswordRequired)?;
            unseal_payloads(
                &manifest,
                descriptor,
                password,
                stored_audio,
                stored_transcript,
            )?
        }
        None => {
            verify_clear_checksums(&manifest, &stored_audio, stored_transcript.as_deref(), &mut warnings);
            (stored_audio, stored_transcript)
        }
    };

    let segments = match transcript_stream {
        Some(stream) => {
            let jsonl = compression::decompress(&stream)?;
            decode_lenient(&jsonl, &mut warnings)
        }
        None => Vec::new(),
    };

    let metadata = match stored_metadata {
        Some(bytes) => match serde_json::from_slice::<Metadata>(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warnings.push(Warning::MetadataUnreadable {
                    reason: e.to_string(),
                });
                Metadata::new()
            }
        },
        None => Metadata::new(),
    };

    debug!(
        segments = segments.len(),
        warnings = warnings.len(),
        encrypted = manifest.is_encrypted(),
        "opened bundle"
    );
    Ok(LoadedBundle {
        audio_bytes,
        segments,
        metadata,
        warnings,
    })
}

/// Read the manifest and entry list only. No password, no decompression, no
/// decryption; safe to run on untrusted input before committing to a load.
pub fn inspect(archive: &[u8]) -> Result<BundleInfo> {
    let mut container = Container::open(archive)?;
    let manifest = read_manifest(&mut container)?;
    Ok(BundleInfo {
        format_version: manifest.format_version,
        encrypted: manifest.is_encrypted(),
        has_transcript: manifest.transcript_entry.is_some(),
        has_metadata: manifest.metadata_entry.is_some(),
        entries: container.entry_names(),
    })
}

fn read_manifest(container: &mut Container<'_>) -> Result<Manifest> {
    // The manifest defines bundle-ness; a ZIP without one is just a ZIP.
    if !container.has_entry(MANIFEST_ENTRY) {
        return Err(Error::MalformedContainer(
            "archive has no manifest entry".to_string(),
        ));
    }
    manifest::parse(&container.read_entry(MANIFEST_ENTRY)?)
}

/// Derive the key and open both sealed payloads.
///
/// Checksums are consulted only after a tag failure, to choose the hint; a
/// verified tag is already the stronger integrity statement.
fn unseal_payloads(
    manifest: &Manifest,
    descriptor: &EncryptionDescriptor,
    password: &str,
    stored_audio: Vec<u8>,
    stored_transcript: Option<Vec<u8>>,
) -> Result<(Vec<u8>, Option<Vec<u8>>)> {
    if descriptor.algorithm != ALGORITHM_AES_256_GCM {
        return Err(Error::UnsupportedEncryption(descriptor.algorithm.clone()));
    }
    if descriptor.kdf != KDF_ARGON2ID {
        return Err(Error::UnsupportedEncryption(descriptor.kdf.clone()));
    }
    if descriptor.salt.len() < 8 {
        return Err(Error::MalformedManifest(format!(
            "salt must be at least 8 bytes, got {}",
            descriptor.salt.len()
        )));
    }

    let key = crypto::derive_key(password, &descriptor.salt, &descriptor.kdf_params)?;
    let checksums = manifest.checksums.as_ref();

    let audio_nonce = nonce_for(&descriptor.nonces.audio, &manifest.audio_entry)?;
    let audio = crypto::open_sealed(&key, audio_nonce, &stored_audio, &manifest.audio_entry)
        .map_err(|e| {
            refine_hint(e, checksums.and_then(|c| c.audio.as_deref()), &stored_audio)
        })?;

    let transcript = match (stored_transcript, &manifest.transcript_entry) {
        (Some(stored), Some(entry)) => {
            let nonce_bytes = descriptor.nonces.transcript.as_deref().ok_or_else(|| {
                Error::MalformedManifest(format!(
                    "encryption descriptor has no nonce for `{entry}`"
                ))
            })?;
            let nonce = nonce_for(nonce_bytes, entry)?;
            let plain = crypto::open_sealed(&key, nonce, &stored, entry).map_err(|e| {
                refine_hint(e, checksums.and_then(|c| c.transcript.as_deref()), &stored)
            })?;
            Some(plain)
        }
        _ => None,
    };

    Ok((audio, transcript))
}

fn nonce_for<'a>(bytes: &'a [u8], entry: &str) -> Result<&'a [u8; NONCE_LEN]> {
    bytes.try_into().map_err(|_| {
        Error::MalformedManifest(format!(
            "nonce for `{entry}` must be {NONCE_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}

/// Turn a bare tag failure into one with a likely cause, when a checksum
/// over the stored bytes can supply it. Damaged bytes fail their checksum
/// too; intact bytes under a failing tag point at the password.
fn refine_hint(err: Error, expected_hex: Option<&str>, stored: &[u8]) -> Error {
    match err {
        Error::AuthenticationFailure { entry, .. } => {
            let hint = match expected_hex {
                None => AuthHint::Unknown,
                Some(expected) => {
                    if blake3::hash(stored).to_hex().as_str() == expected {
                        AuthHint::LikelyWrongPassword
                    } else {
                        AuthHint::LikelyCorruption
                    }
                }
            };
            Error::AuthenticationFailure { entry, hint }
        }
        other => other,
    }
}

/// Checksum pass for unencrypted payloads. Mismatches warn and loading
/// continues; the gzip and codec layers still catch unusable data.
fn verify_clear_checksums(
    manifest: &Manifest,
    stored_audio: &[u8],
    stored_transcript: Option<&[u8]>,
    warnings: &mut Vec<Warning>,
) {
    let Some(checksums) = &manifest.checksums else {
        return;
    };
    let mut check = |expected: Option<&str>, stored: Option<&[u8]>, entry: Option<&str>| {
        if let (Some(expected), Some(stored), Some(entry)) = (expected, stored, entry) {
            if blake3::hash(stored).to_hex().as_str() != expected {
                warn!(entry, "stored bytes do not match their checksum");
                warnings.push(Warning::ChecksumMismatch {
                    entry: entry.to_string(),
                });
            }
        }
    };
    check(
        checksums.audio.as_deref(),
        Some(stored_audio),
        Some(manifest.audio_entry.as_str()),
    );
    check(
        checksums.transcript.as_deref(),
        stored_transcript,
        manifest.transcript_entry.as_deref(),
    );
}

/// Line-by-line decode that drops what it cannot read. The strict
/// counterpart lives in [`segment_codec::decode`] and guards packing.
fn decode_lenient(jsonl: &[u8], warnings: &mut Vec<Warning>) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    for (idx, raw_line) in jsonl.split(|&b| b == b'\n').enumerate() {
        let line_number = idx + 1;
        let raw_line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
        if raw_line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // Lines are validated one at a time, so a stretch of raw bytes only
        // takes down its own line, never the whole transcript.
        let decoded = std::str::from_utf8(raw_line)
            .map_err(|_| Error::InvalidSegment {
                line: line_number,
                reason: "line is not valid UTF-8".to_string(),
            })
            .and_then(|line| segment_codec::decode_line(line, line_number));
        match decoded {
            Ok(segment) => segments.push(segment),
            Err(err) => {
                let reason = match err {
                    Error::InvalidSegment { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(line = line_number, %reason, "skipping unreadable transcript line");
                warnings.push(Warning::SkippedSegment {
                    line: line_number,
                    reason,
                });
            }
        }
    }

    if let Some(index) = (1..segments.len())
        .find(|&i| segments[i].start_time < segments[i - 1].start_time)
    {
        warnings.push(Warning::OutOfOrderSegments { index });
    }
    segments
}

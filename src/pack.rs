//! Bundle assembly: three logical payloads in, one archive out.
//!
//! The intent is:
//! - Validate everything before writing anything: a malformed transcript
//!   line aborts the pack; we never emit a partial archive.
//! - Store the transcript canonically (re-encoded, then gzipped), audio
//!   byte-for-byte, metadata verbatim.
//! - Seal payload entries independently under one derived key when a
//!   password is given; the manifest stays clear text.
//! - Record a checksum of each stored entry so a future open can tell a
//!   damaged file from a wrong password.
//!
//! Randomness is injected through [`RandomSource`], so `Packer` is generic
//! the same way callers can swap it out in tests; `pack` is the convenience
//! form wired to the OS source.

use tracing::debug;

use crate::Metadata;
use crate::compression;
use crate::container::ContainerBuilder;
use crate::crypto::{self, KdfParams, NONCE_LEN, OsRandom, RandomSource, SALT_LEN};
use crate::error::{Error, Result};
use crate::manifest::{
    self, ALGORITHM_AES_256_GCM, EncryptionDescriptor, EntryChecksums, EntryNonces,
    FORMAT_VERSION, KDF_ARGON2ID, MANIFEST_ENTRY, Manifest,
};
use crate::segment_codec;

/// Entry name this packer stores audio under. Loaders follow the manifest,
/// never these constants.
pub const AUDIO_ENTRY: &str = "audio/audio.bin";
/// Entry name for the compressed transcript.
pub const TRANSCRIPT_ENTRY: &str = "data/transcript.jsonl.gz";
/// Entry name for the metadata record.
pub const METADATA_ENTRY: &str = "data/metadata.json";

/// Bundle producer.
///
/// Owns the randomness source and KDF cost settings; everything else is
/// per-call input. Construct once, pack as many bundles as you like.
pub struct Packer<R: RandomSource = OsRandom> {
    random: R,
    kdf_params: KdfParams,
}

impl Packer<OsRandom> {
    /// A packer drawing salts and nonces from the OS CSPRNG.
    pub fn new() -> Self {
        Self::with_random_source(OsRandom)
    }
}

impl Default for Packer<OsRandom> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: RandomSource> Packer<R> {
    /// A packer with a caller-supplied randomness source.
    pub fn with_random_source(random: R) -> Self {
        Self {
            random,
            kdf_params: KdfParams::default(),
        }
    }

    /// Override the key-derivation cost. The parameters are recorded in the
    /// manifest, so archives written with any setting stay openable.
    pub fn kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf_params = params;
        self
    }

    /// Build one archive.
    ///
    /// `transcript` is JSONL text; blank means "no transcript" and leaves no
    /// entry behind. `metadata` is stored verbatim when present, even when
    /// empty. A password seals the payload entries; without one the output
    /// is fully deterministic.
    ///
    /// Takes `&mut self` because drawing randomness advances the source.
    pub fn pack(
        &mut self,
        audio: &[u8],
        transcript: &str,
        metadata: Option<&Metadata>,
        password: Option<&str>,
    ) -> Result<Vec<u8>> {
        // Strict on the way in: decode the whole transcript before touching
        // the container, then store our own canonical encoding of it.
        let transcript_stream = if transcript.trim().is_empty() {
            None
        } else {
            let segments = segment_codec::decode(transcript.as_bytes())?;
            let canonical = segment_codec::encode(&segments)?;
            Some(compression::compress(&canonical)?)
        };

        let metadata_bytes = metadata
            .map(|map| {
                serde_json::to_vec_pretty(map)
                    .map_err(|e| Error::Internal(format!("failed to serialize metadata: {e}")))
            })
            .transpose()?;

        let mut stored_audio = audio.to_vec();
        let mut stored_transcript = transcript_stream;
        let mut encryption = None;
        if let Some(password) = password {
            let mut salt = [0u8; SALT_LEN];
            self.random.fill(&mut salt)?;
            let key = crypto::derive_key(password, &salt, &self.kdf_params)?;

            // Entries share the key but never a nonce.
            let mut audio_nonce = [0u8; NONCE_LEN];
            self.random.fill(&mut audio_nonce)?;
            stored_audio = crypto::seal(&key, &audio_nonce, &stored_audio)?;

            let mut transcript_nonce = None;
            if let Some(plain) = stored_transcript.take() {
                let mut nonce = [0u8; NONCE_LEN];
                self.random.fill(&mut nonce)?;
                stored_transcript = Some(crypto::seal(&key, &nonce, &plain)?);
                transcript_nonce = Some(nonce.to_vec());
            }

            encryption = Some(EncryptionDescriptor {
                algorithm: ALGORITHM_AES_256_GCM.to_string(),
                kdf: KDF_ARGON2ID.to_string(),
                kdf_params: self.kdf_params.clone(),
                salt: salt.to_vec(),
                nonces: EntryNonces {
                    audio: audio_nonce.to_vec(),
                    transcript: transcript_nonce,
                },
            });
        }

        // Checksums cover the bytes as stored, after compression and
        // sealing, so they can be checked without a password.
        let checksums = EntryChecksums {
            audio: Some(blake3::hash(&stored_audio).to_hex().to_string()),
            transcript: stored_transcript
                .as_deref()
                .map(|bytes| blake3::hash(bytes).to_hex().to_string()),
        };

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            audio_entry: AUDIO_ENTRY.to_string(),
            transcript_entry: stored_transcript
                .is_some()
                .then(|| TRANSCRIPT_ENTRY.to_string()),
            metadata_entry: metadata_bytes.is_some().then(|| METADATA_ENTRY.to_string()),
            encryption,
            checksums: Some(checksums),
        };

        let mut builder = ContainerBuilder::new();
        builder.add_entry(MANIFEST_ENTRY, &manifest::serialize(&manifest)?)?;
        builder.add_entry(AUDIO_ENTRY, &stored_audio)?;
        if let Some(bytes) = &stored_transcript {
            builder.add_entry(TRANSCRIPT_ENTRY, bytes)?;
        }
        if let Some(bytes) = &metadata_bytes {
            builder.add_entry(METADATA_ENTRY, bytes)?;
        }
        let archive = builder.finish()?;

        debug!(
            bytes = archive.len(),
            encrypted = manifest.is_encrypted(),
            has_transcript = manifest.transcript_entry.is_some(),
            has_metadata = manifest.metadata_entry.is_some(),
            "packed bundle"
        );
        Ok(archive)
    }
}

/// Pack one bundle with OS randomness and default KDF cost.
pub fn pack(
    audio: &[u8],
    transcript: &str,
    metadata: Option<&Metadata>,
    password: Option<&str>,
) -> Result<Vec<u8>> {
    Packer::new().pack(audio, transcript, metadata, password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::crypto::TAG_LEN;

    const AUDIO: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt not really audio";

    fn transcript() -> String {
        concat!(
            r#"{"start_time":0.0,"end_time":1.5,"text":"hello there"}"#,
            "\n",
            r#"{"start_time":1.5,"end_time":2.25,"text":"general","speaker_id":"s1","confidence":0.9}"#,
            "\n",
        )
        .to_string()
    }

    fn cheap_params() -> KdfParams {
        KdfParams {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }

    /// Fills buffers with a running counter; same script, same archive.
    struct CountingRandom(u8);

    impl RandomSource for CountingRandom {
        fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
            for byte in buf.iter_mut() {
                *byte = self.0;
                self.0 = self.0.wrapping_add(1);
            }
            Ok(())
        }
    }

    fn parse_manifest(archive: &[u8]) -> anyhow::Result<Manifest> {
        let mut container = Container::open(archive)?;
        Ok(manifest::parse(&container.read_entry(MANIFEST_ENTRY)?)?)
    }

    #[test]
    fn unencrypted_pack_is_deterministic() -> anyhow::Result<()> {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), "standup".into());

        let a = pack(AUDIO, &transcript(), Some(&metadata), None)?;
        let b = pack(AUDIO, &transcript(), Some(&metadata), None)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn manifest_is_first_and_references_real_entries() -> anyhow::Result<()> {
        let metadata = Metadata::new();
        let archive = pack(AUDIO, &transcript(), Some(&metadata), None)?;

        let container = Container::open(&archive)?;
        assert_eq!(
            container.entry_names(),
            [MANIFEST_ENTRY, AUDIO_ENTRY, TRANSCRIPT_ENTRY, METADATA_ENTRY]
        );

        let manifest = parse_manifest(&archive)?;
        assert_eq!(manifest.audio_entry, AUDIO_ENTRY);
        assert_eq!(manifest.transcript_entry.as_deref(), Some(TRANSCRIPT_ENTRY));
        assert_eq!(manifest.metadata_entry.as_deref(), Some(METADATA_ENTRY));
        assert!(!manifest.is_encrypted());
        Ok(())
    }

    #[test]
    fn blank_transcript_and_absent_metadata_leave_no_entries() -> anyhow::Result<()> {
        let archive = pack(AUDIO, "\n   \n", None, None)?;

        let container = Container::open(&archive)?;
        assert_eq!(container.entry_names(), [MANIFEST_ENTRY, AUDIO_ENTRY]);

        let manifest = parse_manifest(&archive)?;
        assert_eq!(manifest.transcript_entry, None);
        assert_eq!(manifest.metadata_entry, None);
        let checksums = manifest.checksums.unwrap();
        assert!(checksums.audio.is_some());
        assert_eq!(checksums.transcript, None);
        Ok(())
    }

    #[test]
    fn empty_metadata_map_still_gets_an_entry() -> anyhow::Result<()> {
        // An explicitly empty mapping is information; only `None` means
        // "no metadata".
        let archive = pack(AUDIO, "", Some(&Metadata::new()), None)?;
        let manifest = parse_manifest(&archive)?;
        assert_eq!(manifest.metadata_entry.as_deref(), Some(METADATA_ENTRY));
        Ok(())
    }

    #[test]
    fn malformed_transcript_line_aborts_the_pack() {
        let text = concat!(
            r#"{"start_time":0.0,"end_time":1.0,"text":"fine"}"#,
            "\n",
            "{ this is not json\n",
        );
        let err = pack(AUDIO, text, None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidSegment { line: 2, .. }));
    }

    #[test]
    fn checksums_cover_the_stored_bytes() -> anyhow::Result<()> {
        let archive = pack(AUDIO, &transcript(), None, None)?;
        let manifest = parse_manifest(&archive)?;
        let checksums = manifest.checksums.unwrap();

        let mut container = Container::open(&archive)?;
        let stored_audio = container.read_entry(AUDIO_ENTRY)?;
        let stored_transcript = container.read_entry(TRANSCRIPT_ENTRY)?;
        assert_eq!(
            checksums.audio.as_deref(),
            Some(blake3::hash(&stored_audio).to_hex().as_str())
        );
        assert_eq!(
            checksums.transcript.as_deref(),
            Some(blake3::hash(&stored_transcript).to_hex().as_str())
        );
        Ok(())
    }

    #[test]
    fn password_seals_the_stored_audio() -> anyhow::Result<()> {
        let archive = Packer::new()
            .kdf_params(cheap_params())
            .pack(AUDIO, "", None, Some("hunter2"))?;

        let manifest = parse_manifest(&archive)?;
        let descriptor = manifest.encryption.expect("descriptor");
        assert_eq!(descriptor.algorithm, ALGORITHM_AES_256_GCM);
        assert_eq!(descriptor.kdf, KDF_ARGON2ID);
        assert_eq!(descriptor.salt.len(), SALT_LEN);
        assert_eq!(descriptor.nonces.audio.len(), NONCE_LEN);
        assert_eq!(descriptor.nonces.transcript, None);

        let mut container = Container::open(&archive)?;
        let stored_audio = container.read_entry(AUDIO_ENTRY)?;
        assert_eq!(stored_audio.len(), AUDIO.len() + TAG_LEN);
        assert!(!stored_audio.windows(8).any(|w| w == &AUDIO[..8]));
        Ok(())
    }

    #[test]
    fn sealed_packs_of_identical_input_differ() -> anyhow::Result<()> {
        let mut packer = Packer::new().kdf_params(cheap_params());
        let a = packer.pack(AUDIO, &transcript(), None, Some("hunter2"))?;
        let b = packer.pack(AUDIO, &transcript(), None, Some("hunter2"))?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn injected_randomness_reproduces_sealed_archives() -> anyhow::Result<()> {
        let pack_once = || -> Result<Vec<u8>> {
            Packer::with_random_source(CountingRandom(7))
                .kdf_params(cheap_params())
                .pack(AUDIO, &transcript(), None, Some("hunter2"))
        };
        assert_eq!(pack_once()?, pack_once()?);
        Ok(())
    }
}

//! Flat ZIP container around the bundle's entries.
//!
//! Everything above this module speaks in named entries and byte blobs; this
//! is the only place that knows the carrier is ZIP. Entries are written
//! `Stored`, since the transcript is already gzipped and encrypted payloads
//! do not compress. Foreign archives with compressed entries are still read
//! fine.

use std::io::{Cursor, Read, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// Writes entries in order and yields the finished archive bytes.
pub struct ContainerBuilder {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Append one entry. Order is preserved; the caller writes the manifest
    /// first so scanners can find it without walking the whole directory.
    pub fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o644)
            // Entries at or past 4 GiB need zip64.
            .large_file(bytes.len() as u64 >= u64::from(u32::MAX));
        self.zip
            .start_file(name, options)
            .map_err(|e| Error::Internal(format!("failed to start entry `{name}`: {e}")))?;
        self.zip
            .write_all(bytes)
            .map_err(|e| Error::Internal(format!("failed to write entry `{name}`: {e}")))?;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>> {
        let cursor = self
            .zip
            .finish()
            .map_err(|e| Error::Internal(format!("failed to finish container: {e}")))?;
        Ok(cursor.into_inner())
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read view over an existing archive. Borrows the caller's bytes; the
/// central directory is parsed up front so a non-container fails here, not
/// halfway through a load.
#[derive(Debug)]
pub struct Container<'a> {
    zip: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> Container<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::MalformedContainer(e.to_string()))?;
        Ok(Self { zip })
    }

    /// Entry names in archive order.
    pub fn entry_names(&self) -> Vec<String> {
        (0..self.zip.len())
            .filter_map(|i| self.zip.name_for_index(i))
            .map(str::to_string)
            .collect()
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Read one entry fully into memory.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self.zip.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => Error::MissingEntry(name.to_string()),
            other => Error::MalformedContainer(other.to_string()),
        })?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::MalformedContainer(format!("failed to read entry `{name}`: {e}")))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: &[(&str, &[u8])]) -> anyhow::Result<Vec<u8>> {
        let mut builder = ContainerBuilder::new();
        for (name, bytes) in entries {
            builder.add_entry(name, bytes)?;
        }
        Ok(builder.finish()?)
    }

    #[test]
    fn written_entries_read_back_verbatim() -> anyhow::Result<()> {
        let archive = build(&[
            ("manifest.json", b"{}".as_slice()),
            ("audio/audio.bin", &[0u8, 1, 2, 255, 254]),
        ])?;

        let mut container = Container::open(&archive)?;
        assert_eq!(container.read_entry("manifest.json")?, b"{}");
        assert_eq!(container.read_entry("audio/audio.bin")?, [0, 1, 2, 255, 254]);
        Ok(())
    }

    #[test]
    fn entry_names_keep_write_order() -> anyhow::Result<()> {
        let archive = build(&[
            ("manifest.json", b"{}".as_slice()),
            ("audio/audio.bin", b"a".as_slice()),
            ("data/metadata.json", b"{}".as_slice()),
        ])?;

        let container = Container::open(&archive)?;
        assert_eq!(
            container.entry_names(),
            ["manifest.json", "audio/audio.bin", "data/metadata.json"]
        );
        assert!(container.has_entry("audio/audio.bin"));
        assert!(!container.has_entry("audio/AUDIO.BIN"));
        Ok(())
    }

    #[test]
    fn entries_are_stored_not_deflated() -> anyhow::Result<()> {
        // Highly compressible payload; Stored keeps it byte-for-byte.
        let payload = vec![b'x'; 4096];
        let archive = build(&[("audio/audio.bin", payload.as_slice())])?;
        assert!(archive.windows(payload.len()).any(|w| w == payload));
        Ok(())
    }

    #[test]
    fn reads_deflated_entries_from_other_producers() -> anyhow::Result<()> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file("data/metadata.json", options)?;
        zip.write_all(br#"{"source":"elsewhere"}"#)?;
        let archive = zip.finish()?.into_inner();

        let mut container = Container::open(&archive)?;
        assert_eq!(
            container.read_entry("data/metadata.json")?,
            br#"{"source":"elsewhere"}"#
        );
        Ok(())
    }

    #[test]
    fn missing_entry_is_reported_by_name() -> anyhow::Result<()> {
        let archive = build(&[("manifest.json", b"{}".as_slice())])?;
        let mut container = Container::open(&archive)?;
        let err = container.read_entry("audio/audio.bin").unwrap_err();
        assert!(matches!(err, Error::MissingEntry(name) if name == "audio/audio.bin"));
        Ok(())
    }

    #[test]
    fn garbage_bytes_are_not_a_container() {
        let err = Container::open(b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, Error::MalformedContainer(_)));

        let err = Container::open(b"").unwrap_err();
        assert!(matches!(err, Error::MalformedContainer(_)));
    }
}

//! `satchel` — a portable container for audio recordings and their transcripts.
//!
//! This crate provides:
//! - A single-file archive bundling encoded audio, a time-aligned JSONL
//!   transcript, and free-form metadata
//! - Optional password sealing (Argon2id + AES-256-GCM) with tamper detection
//! - Strict packing and lenient loading, so one bad transcript line never
//!   strands an otherwise-good recording
//!
//! The library never decodes audio; it carries the encoded bytes unchanged.
//! Most consumers need only [`pack`], [`open`], and [`inspect`].

// High-level API (most consumers should start here).
pub mod load;
pub mod pack;

// The bundle's data model.
pub mod manifest;
pub mod segment;

// Stateless transforms the packer and loader compose.
pub mod compression;
pub mod crypto;
pub mod segment_codec;

// The outer envelope.
pub mod container;

// Crate-wide error taxonomy.
pub mod error;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use error::{AuthHint, Error, Result};
pub use load::{BundleInfo, LoadedBundle, Warning, inspect, open};
pub use pack::{Packer, pack};
pub use segment::TranscriptSegment;

/// Free-form bundle metadata: an open JSON object with no required keys.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

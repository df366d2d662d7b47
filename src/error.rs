use thiserror::Error;

/// Satchel's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The most likely cause of an [`Error::AuthenticationFailure`].
///
/// Tag verification alone cannot distinguish a wrong password from bit-level
/// corruption, and we deliberately do not let the error *type* distinguish
/// them either. When the manifest carried a checksum for the stored entry
/// bytes, the loader can narrow the cause and records it here; the hint only
/// shapes the Display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthHint {
    /// No checksum was available to consult; the cause is unknowable here.
    Unknown,
    /// The stored bytes also fail their checksum: the archive itself is damaged.
    LikelyCorruption,
    /// The stored bytes match their checksum: the password is the suspect.
    LikelyWrongPassword,
}

impl AuthHint {
    fn suffix(self) -> &'static str {
        match self {
            AuthHint::Unknown => " (wrong password or corrupted data)",
            AuthHint::LikelyCorruption => {
                " (stored bytes fail their checksum; the archive is likely corrupted)"
            }
            AuthHint::LikelyWrongPassword => {
                " (stored bytes are intact; the password is likely wrong)"
            }
        }
    }
}

/// Satchel's crate-wide error type.
///
/// Every fatal condition `pack` or `open` can hit is a distinct variant, so
/// callers can match on the condition (prompt for a password, suggest an
/// upgrade, report corruption) instead of sniffing message strings.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries
/// aren't forced to adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not readable as an archive container at all, or lacks the
    /// manifest entry that makes a container a bundle.
    #[error("not a valid bundle container: {0}")]
    MalformedContainer(String),

    /// The manifest names a format version this build does not know.
    /// Carries the version so callers can give an upgrade hint.
    #[error("unsupported bundle format version {0}")]
    UnsupportedVersion(u32),

    /// The manifest is structurally broken: required fields are missing or an
    /// encryption descriptor cannot be decoded.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// The manifest references an entry the container does not hold.
    #[error("container is missing entry `{0}`")]
    MissingEntry(String),

    /// The archive is encrypted and no password was supplied.
    ///
    /// Distinct from [`Error::AuthenticationFailure`] so a caller can prompt
    /// for a password instead of reporting the archive as damaged.
    #[error("archive is password protected; a password is required to open it")]
    PasswordRequired,

    /// The encryption descriptor names an algorithm or KDF this build does
    /// not implement. Carries the offending name.
    #[error("unsupported encryption scheme `{0}`")]
    UnsupportedEncryption(String),

    /// Tag verification failed while unsealing `entry`: wrong password or
    /// tampering, never distinguished by type.
    #[error("authentication failed for entry `{entry}`{}", .hint.suffix())]
    AuthenticationFailure { entry: String, hint: AuthHint },

    /// Decompressing the transcript stream failed.
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),

    /// A transcript line is not a well-formed segment record.
    ///
    /// Fatal while packing (we refuse to produce a broken archive); the
    /// loader downgrades it to a [`Warning`](crate::load::Warning) instead.
    #[error("invalid transcript segment on line {line}: {reason}")]
    InvalidSegment { line: usize, reason: String },

    /// Key derivation or cipher setup failed. Never a tag mismatch.
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// An internal failure outside the wire-format taxonomy, such as an I/O
    /// error while writing an in-memory buffer. Not reachable from any
    /// well-formed input; kept so nothing in the crate needs to panic.
    #[error("{0}")]
    Internal(String),
}

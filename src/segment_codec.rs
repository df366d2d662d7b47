//! Line-oriented transcript codec.
//!
//! The transcript wire form is JSON Lines: one segment object per line,
//! UTF-8, newline-separated, in sequence order. Optional fields are omitted
//! (never `null`-stubbed) so the stored form stays canonical.
//!
//! Strictness policy:
//! - `decode` is strict: the first line that is not a well-formed segment
//!   record fails the whole call with the 1-based line number. Nothing is
//!   silently dropped.
//! - Callers that want skip-and-warn behavior (the loader does) drive
//!   [`decode_line`] themselves and decide what to do with each failure.

use crate::error::{Error, Result};
use crate::segment::TranscriptSegment;

/// Serialize segments to JSON Lines, in input order.
///
/// A segment that could not round-trip (non-finite or negative times, end
/// before start, confidence outside `[0, 1]`) is refused here rather than
/// written; the reported line number is the output line it would have
/// occupied.
pub fn encode(segments: &[TranscriptSegment]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (idx, segment) in segments.iter().enumerate() {
        let line = idx + 1;
        if let Some(reason) = constraint_violation(segment) {
            return Err(Error::InvalidSegment { line, reason });
        }
        let json = serde_json::to_vec(segment).map_err(|e| Error::InvalidSegment {
            line,
            reason: format!("failed to serialize segment: {e}"),
        })?;
        out.extend_from_slice(&json);
        out.push(b'\n');
    }
    Ok(out)
}

/// Parse a JSON Lines transcript strictly.
///
/// Empty input decodes to an empty sequence. Blank lines are skipped but
/// still count toward line numbering, so errors always point at the physical
/// line in the stream.
pub fn decode(bytes: &[u8]) -> Result<Vec<TranscriptSegment>> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        // Point at the physical line holding the first bad byte.
        let line = bytes[..e.valid_up_to()]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1;
        Error::InvalidSegment {
            line,
            reason: "transcript is not valid UTF-8".to_string(),
        }
    })?;

    let mut segments = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        segments.push(decode_line(line, idx + 1)?);
    }
    Ok(segments)
}

/// Parse one transcript line into a segment.
///
/// `line_number` is 1-based and is only used for error attribution; pass the
/// physical position of `line` within the surrounding stream.
pub fn decode_line(line: &str, line_number: usize) -> Result<TranscriptSegment> {
    let segment: TranscriptSegment =
        serde_json::from_str(line).map_err(|e| Error::InvalidSegment {
            line: line_number,
            reason: e.to_string(),
        })?;

    if let Some(reason) = constraint_violation(&segment) {
        return Err(Error::InvalidSegment {
            line: line_number,
            reason,
        });
    }

    Ok(segment)
}

/// Check the data-model invariants a structurally-parsed segment must hold.
fn constraint_violation(segment: &TranscriptSegment) -> Option<String> {
    if !segment.start_time.is_finite() || segment.start_time < 0.0 {
        return Some(format!(
            "start_time must be a non-negative number, got {}",
            segment.start_time
        ));
    }
    if !segment.end_time.is_finite() || segment.end_time < segment.start_time {
        return Some(format!(
            "end_time must not precede start_time ({} < {})",
            segment.end_time, segment.start_time
        ));
    }
    if let Some(confidence) = segment.confidence {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Some(format!("confidence must be within [0, 1], got {confidence}"));
        }
    }
    None
}

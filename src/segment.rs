use serde::{Deserialize, Serialize};

/// A single time-aligned transcript unit.
///
/// The wire form is one JSON object per line (see
/// [`segment_codec`](crate::segment_codec)). Unknown fields on the wire are
/// ignored so producers may attach extras (word-level timing, for example)
/// without breaking older readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start of the spoken interval, in seconds from the beginning of the audio.
    pub start_time: f64,

    /// End of the spoken interval, in seconds. Never before `start_time`.
    pub end_time: f64,

    /// The spoken text. May be empty.
    pub text: String,

    /// Opaque speaker identifier, when diarization provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,

    /// Recognizer confidence in `[0.0, 1.0]`, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TranscriptSegment {
    /// Whether `instant` (seconds) falls inside this segment's interval.
    ///
    /// Both endpoints are inclusive: a cursor parked exactly on a boundary
    /// still highlights the segment.
    pub fn contains(&self, instant: f64) -> bool {
        self.start_time <= instant && instant <= self.end_time
    }
}

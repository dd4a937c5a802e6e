//! Transcript gating.
//!
//! The speech-to-text collaborator signals "nothing was said" in several
//! ways: an empty string, a bracketed sentinel token, or a fragment too
//! short to mean anything. All of these must be rejected before any network
//! call is made.

/// Sentinel values whisper-style engines emit for silent audio.
/// Compared case-insensitively against the trimmed transcript.
const BLANK_AUDIO_SENTINELS: &[&str] = &[
    "[BLANK_AUDIO]",
    "(BLANK_AUDIO)",
    "[SILENCE]",
    "(SILENCE)",
    "[BLANK]",
    "(BLANK)",
];

/// Punctuation the gate ignores when deciding whether anything was said.
const IGNORED_PUNCTUATION: &[char] = &['.', ',', '!', '?'];

/// Whether a transcript carries enough content to start the pipeline.
pub fn is_usable(transcript: &str) -> bool {
    let t = transcript.trim();
    if t.is_empty() {
        return false;
    }

    if BLANK_AUDIO_SENTINELS
        .iter()
        .any(|sentinel| t.eq_ignore_ascii_case(sentinel))
    {
        return false;
    }

    if t.chars().count() < 3 {
        return false;
    }

    // Entirely punctuation/whitespace means the engine heard noise, not speech.
    t.chars()
        .any(|c| !c.is_whitespace() && !IGNORED_PUNCTUATION.contains(&c))
}

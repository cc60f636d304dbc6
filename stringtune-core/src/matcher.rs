//! # String Matcher Module
//!
//! Decides which string of the active tuning a detected frequency is an
//! attempt at. Selection is nearest-neighbour in Hz; acceptance is a
//! window in cents around the selected string.

use crate::note::cents_between;
use crate::tuning::Tuning;

/// Largest deviation from a string, in cents, still treated as an
/// attempt at that string (one semitone).
pub const MATCH_WINDOW_CENTS: f32 = 100.0;

/// The string a frequency was matched to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringMatch {
    pub string_index: usize,
    /// Signed deviation from the string's target frequency.
    pub cents_from_string: f32,
}

/// Finds the string closest to `frequency` in `tuning`.
///
/// Equal Hz distances (unison courses) resolve to the lower index.
/// Returns `None` when the closest string is more than
/// [`MATCH_WINDOW_CENTS`] away or the tuning has no strings.
pub fn match_string(frequency: f32, tuning: &Tuning) -> Option<StringMatch> {
    match_string_within(frequency, tuning, MATCH_WINDOW_CENTS)
}

/// [`match_string`] with a caller-chosen acceptance window.
///
/// # Arguments
/// * `frequency` - Detected frequency in Hz
/// * `tuning` - Tuning whose strings are candidates
/// * `window_cents` - Largest accepted deviation, inclusive
pub fn match_string_within(
    frequency: f32,
    tuning: &Tuning,
    window_cents: f32,
) -> Option<StringMatch> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }

    let (string_index, closest) = tuning.notes.iter().enumerate().min_by(|(_, a), (_, b)| {
        (frequency - a.frequency)
            .abs()
            .total_cmp(&(frequency - b.frequency).abs())
    })?;

    let cents_from_string = cents_between(frequency, closest.frequency);
    if cents_from_string.abs() > window_cents {
        return None;
    }

    Some(StringMatch {
        string_index,
        cents_from_string,
    })
}

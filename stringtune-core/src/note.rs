//! # Note Resolver Module
//!
//! Maps frequencies onto 12-tone equal temperament (A4 = 440 Hz) and
//! measures deviations in cents.
//!
//! - 100 cents = 1 semitone
//! - 1200 cents = 1 octave
//! - Positive values indicate sharpness, negative values indicate flatness

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TunerError;

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// The twelve pitch classes, chromatic from C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Chromatic index with C = 0 and A = 9.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Inverse of [`index`](Self::index); wraps modulo 12.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    /// Sharp spelling, e.g. `"F#"`.
    pub fn name(self) -> &'static str {
        match self {
            PitchClass::C => "C",
            PitchClass::CSharp => "C#",
            PitchClass::D => "D",
            PitchClass::DSharp => "D#",
            PitchClass::E => "E",
            PitchClass::F => "F",
            PitchClass::FSharp => "F#",
            PitchClass::G => "G",
            PitchClass::GSharp => "G#",
            PitchClass::A => "A",
            PitchClass::ASharp => "A#",
            PitchClass::B => "B",
        }
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = TunerError;

    /// Accepts sharp (`#`, `♯`) and flat (`b`, `♭`) spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        let natural = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('C') => 0,
            Some('D') => 2,
            Some('E') => 4,
            Some('F') => 5,
            Some('G') => 7,
            Some('A') => 9,
            Some('B') => 11,
            _ => return Err(TunerError::InvalidNote(s.to_string())),
        };
        let offset: isize = match chars.as_str() {
            "" => 0,
            "#" | "♯" => 1,
            "b" | "♭" => -1,
            _ => return Err(TunerError::InvalidNote(s.to_string())),
        };
        Ok(Self::from_index((natural + offset).rem_euclid(12) as usize))
    }
}

impl TryFrom<String> for PitchClass {
    type Error = TunerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PitchClass> for String {
    fn from(value: PitchClass) -> Self {
        value.name().to_string()
    }
}

/// Nearest equal-tempered note to a frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteResult {
    pub note: PitchClass,
    pub octave: i32,
    /// Deviation from the note, always within `[-50, 49]`.
    pub cents: i32,
}

impl fmt::Display for NoteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} {:+}¢", self.note, self.octave, self.cents)
    }
}

/// Resolves a frequency to its nearest note, octave and cents offset.
///
/// Returns `None` for non-positive or non-finite input.
///
/// The offset from A4 is first rounded to whole cents and then split into
/// semitones and a remainder. This picks the same note as rounding the
/// semitone count directly, except within half a cent of a quarter tone,
/// and keeps the remainder inside `[-50, 49]`.
pub fn resolve(frequency: f32) -> Option<NoteResult> {
    if !frequency.is_finite() || frequency <= 0.0 {
        return None;
    }

    let total_cents = (1200.0 * (frequency as f64 / A4_FREQUENCY).log2() + 0.5).floor() as i64;
    let semitones_from_a4 = (total_cents + 50).div_euclid(100);
    let cents = total_cents - semitones_from_a4 * 100;

    // A is chromatic index 9.
    let chromatic = 9 + semitones_from_a4;
    Some(NoteResult {
        note: PitchClass::from_index(chromatic.rem_euclid(12) as usize),
        octave: (4 + chromatic.div_euclid(12)) as i32,
        cents: cents as i32,
    })
}

/// Equal-tempered frequency of `note` in `octave`.
pub fn frequency_of(note: PitchClass, octave: i32) -> f32 {
    let semitones_from_a4 = (octave - 4) * 12 + note.index() as i32 - 9;
    (A4_FREQUENCY * 2f64.powf(semitones_from_a4 as f64 / 12.0)) as f32
}

/// Calculates the deviation from a target frequency in cents.
///
/// # Arguments
/// * `freq` - Measured frequency in Hz
/// * `target_freq` - Reference frequency in Hz
///
/// # Returns
/// * Cent deviation (positive = sharp, negative = flat)
pub fn cents_between(freq: f32, target_freq: f32) -> f32 {
    (1200.0 * (freq as f64 / target_freq as f64).log2()) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_a4() {
        let result = resolve(440.0).unwrap();
        assert_eq!(result.note, PitchClass::A);
        assert_eq!(result.octave, 4);
        assert_eq!(result.cents, 0);
    }

    #[test]
    fn test_resolve_octave_boundaries() {
        let c4 = resolve(261.63).unwrap();
        assert_eq!((c4.note, c4.octave, c4.cents), (PitchClass::C, 4, 0));

        let b3 = resolve(246.94).unwrap();
        assert_eq!((b3.note, b3.octave), (PitchClass::B, 3));

        let b1 = resolve(61.74).unwrap();
        assert_eq!((b1.note, b1.octave), (PitchClass::B, 1));
    }

    #[test]
    fn test_resolve_signed_cents() {
        // 10 cents sharp and flat of A2.
        let sharp = resolve(110.0 * 2f32.powf(10.0 / 1200.0)).unwrap();
        assert_eq!((sharp.note, sharp.octave, sharp.cents), (PitchClass::A, 2, 10));

        let flat = resolve(110.0 * 2f32.powf(-10.0 / 1200.0)).unwrap();
        assert_eq!((flat.note, flat.octave, flat.cents), (PitchClass::A, 2, -10));
    }

    #[test]
    fn test_resolve_rejects_invalid() {
        assert!(resolve(0.0).is_none());
        assert!(resolve(-110.0).is_none());
        assert!(resolve(f32::NAN).is_none());
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for &freq in &[55.0, 82.41, 123.4, 440.0, 1234.5] {
            assert_eq!(resolve(freq), resolve(freq));
        }
    }

    #[test]
    fn test_cents_stay_in_range_over_audible_sweep() {
        for hz in 20..=5000 {
            let result = resolve(hz as f32).unwrap();
            assert!(
                (-50..=49).contains(&result.cents),
                "{hz} Hz resolved to {} cents",
                result.cents
            );
        }
    }

    #[test]
    fn test_frequency_of_round_trip() {
        for octave in 1..=6 {
            for note in PitchClass::ALL {
                let freq = frequency_of(note, octave);
                let result = resolve(freq).unwrap();
                assert_eq!((result.note, result.octave, result.cents), (note, octave, 0));
            }
        }
    }

    #[test]
    fn test_parse_spellings() {
        assert_eq!("E".parse::<PitchClass>().unwrap(), PitchClass::E);
        assert_eq!("F#".parse::<PitchClass>().unwrap(), PitchClass::FSharp);
        assert_eq!("Eb".parse::<PitchClass>().unwrap(), PitchClass::DSharp);
        assert_eq!("Cb".parse::<PitchClass>().unwrap(), PitchClass::B);
        assert_eq!("B#".parse::<PitchClass>().unwrap(), PitchClass::C);
        assert!("H".parse::<PitchClass>().is_err());
        assert!("E##".parse::<PitchClass>().is_err());
    }

    #[test]
    fn test_cents_between() {
        assert!((cents_between(220.0, 110.0) - 1200.0).abs() < 1e-3);
        assert!(cents_between(108.0, 110.0) < 0.0);
    }
}

//! # Musical Tuning Module
//!
//! Instrument tunings as plain data: an ordered list of target strings,
//! each with an explicit frequency so that altered tunings (drop, open,
//! octave courses) need no formula.
//!
//! ## Features
//! - Preset tunings for guitar, 12-string, ukulele, mandolin and banjo
//! - Custom tunings with validation
//! - Per-instrument listing and tuning selection
//! - JSON import and export of custom tunings

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TunerError};
use crate::note::PitchClass;

/// Tuning selected when nothing else is configured.
pub const DEFAULT_TUNING_ID: &str = "standard-e";

/// Instrument family a tuning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    #[serde(rename = "guitar")]
    Guitar,
    #[serde(rename = "guitar-12")]
    Guitar12,
    #[serde(rename = "ukulele")]
    Ukulele,
    #[serde(rename = "mandolin")]
    Mandolin,
    #[serde(rename = "banjo")]
    Banjo,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Instrument::Guitar => "guitar",
            Instrument::Guitar12 => "guitar-12",
            Instrument::Ukulele => "ukulele",
            Instrument::Mandolin => "mandolin",
            Instrument::Banjo => "banjo",
        };
        f.write_str(name)
    }
}

/// One target string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningNote {
    pub note: PitchClass,
    pub octave: i32,
    /// Target frequency in Hz (A4 = 440 Hz).
    pub frequency: f32,
}

impl TuningNote {
    pub fn new(note: PitchClass, octave: i32, frequency: f32) -> Self {
        Self {
            note,
            octave,
            frequency,
        }
    }

    /// Display label such as `"E2"`.
    pub fn label(&self) -> String {
        format!("{}{}", self.note, self.octave)
    }
}

/// A named instrument tuning. Index into `notes` is the string number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    pub id: String,
    pub name: String,
    pub instrument: Instrument,
    pub notes: Vec<TuningNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Tuning {
    /// Number of strings (or courses counted per string).
    pub fn string_count(&self) -> usize {
        self.notes.len()
    }

    /// Target of string `index`, counted from the first listed string.
    pub fn string(&self, index: usize) -> Option<&TuningNote> {
        self.notes.get(index)
    }

    /// Checks the invariants a tuning must hold before it can be matched
    /// against: a non-empty id and at least one string, all with positive
    /// finite frequencies.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| TunerError::InvalidTuning {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.notes.is_empty() {
            return Err(invalid("tuning has no strings"));
        }
        if let Some(bad) = self
            .notes
            .iter()
            .find(|n| !n.frequency.is_finite() || n.frequency <= 0.0)
        {
            return Err(invalid(&format!(
                "string {} has invalid frequency {}",
                bad.label(),
                bad.frequency
            )));
        }
        Ok(())
    }
}

fn preset(
    id: &str,
    name: &str,
    instrument: Instrument,
    description: &str,
    notes: &[(PitchClass, i32, f32)],
) -> Tuning {
    Tuning {
        id: id.to_string(),
        name: name.to_string(),
        instrument,
        notes: notes
            .iter()
            .map(|&(note, octave, frequency)| TuningNote::new(note, octave, frequency))
            .collect(),
        description: Some(description.to_string()),
    }
}

/// Built-in tunings, computed once on first access.
pub static PRESET_TUNINGS: Lazy<Vec<Tuning>> = Lazy::new(|| {
    use Instrument::*;
    use PitchClass::*;

    vec![
        // 6-string guitar
        preset("standard-e", "Standard E", Guitar, "Standard tuning (E A D G B E)", &[
            (E, 2, 82.41), (A, 2, 110.00), (D, 3, 146.83), (G, 3, 196.00), (B, 3, 246.94), (E, 4, 329.63),
        ]),
        preset("drop-d", "Drop D", Guitar, "Low string dropped a tone (D A D G B E)", &[
            (D, 2, 73.42), (A, 2, 110.00), (D, 3, 146.83), (G, 3, 196.00), (B, 3, 246.94), (E, 4, 329.63),
        ]),
        preset("half-step-down", "Half-Step Down", Guitar, "Half step down (Eb Ab Db Gb Bb Eb)", &[
            (DSharp, 2, 77.78), (GSharp, 2, 103.83), (CSharp, 3, 138.59), (FSharp, 3, 185.00), (ASharp, 3, 233.08), (DSharp, 4, 311.13),
        ]),
        preset("dadgad", "DADGAD", Guitar, "Alternate tuning (D A D G A D)", &[
            (D, 2, 73.42), (A, 2, 110.00), (D, 3, 146.83), (G, 3, 196.00), (A, 3, 220.00), (D, 4, 293.66),
        ]),
        preset("open-d", "Open D", Guitar, "Open D major (D A D F# A D)", &[
            (D, 2, 73.42), (A, 2, 110.00), (D, 3, 146.83), (FSharp, 3, 185.00), (A, 3, 220.00), (D, 4, 293.66),
        ]),
        preset("open-c", "Open C", Guitar, "Open C major (C G C G C E)", &[
            (C, 2, 65.41), (G, 2, 98.00), (C, 3, 130.81), (G, 3, 196.00), (C, 4, 261.63), (E, 4, 329.63),
        ]),
        preset("open-e", "Open E", Guitar, "Open E major (E B E G# B E)", &[
            (E, 2, 82.41), (B, 2, 123.47), (E, 3, 164.81), (GSharp, 3, 207.65), (B, 3, 246.94), (E, 4, 329.63),
        ]),
        preset("drop-c", "Drop C", Guitar, "Drop C (C G C F A D)", &[
            (C, 2, 65.41), (G, 2, 98.00), (C, 3, 130.81), (F, 3, 174.61), (A, 3, 220.00), (D, 4, 293.66),
        ]),
        preset("double-drop-d", "Double Drop D", Guitar, "Both E strings dropped (D A D G B D)", &[
            (D, 2, 73.42), (A, 2, 110.00), (D, 3, 146.83), (G, 3, 196.00), (B, 3, 246.94), (D, 4, 293.66),
        ]),
        preset("whole-step-down", "Whole Step Down", Guitar, "Whole step down (D G C F A D)", &[
            (D, 2, 73.42), (G, 2, 98.00), (C, 3, 130.81), (F, 3, 174.61), (A, 3, 220.00), (D, 4, 293.66),
        ]),
        preset("drop-b", "Drop B", Guitar, "Very low drop tuning (B F# B E G# C#)", &[
            (B, 1, 61.74), (FSharp, 2, 92.50), (B, 2, 123.47), (E, 3, 164.81), (GSharp, 3, 207.65), (CSharp, 4, 277.18),
        ]),
        preset("celtic", "Celtic (DADGAD)", Guitar, "Celtic tuning (D A D G A D)", &[
            (D, 2, 73.42), (A, 2, 110.00), (D, 3, 146.83), (G, 3, 196.00), (A, 3, 220.00), (D, 4, 293.66),
        ]),
        preset("nashville", "Nashville Tuning", Guitar, "Standard notes an octave up (E A D G B E)", &[
            (E, 3, 164.81), (A, 3, 220.00), (D, 4, 293.66), (G, 4, 392.00), (B, 4, 493.88), (E, 5, 659.25),
        ]),
        // 12-string guitar: octave courses on the bass, unisons on top
        preset("standard-12-string", "Standard 12-String", Guitar12, "Standard 12-string tuning", &[
            (E, 2, 82.41), (E, 3, 164.81), (A, 2, 110.00), (A, 3, 220.00), (D, 3, 146.83), (D, 4, 293.66),
            (G, 3, 196.00), (G, 3, 196.00), (B, 3, 246.94), (B, 3, 246.94), (E, 4, 329.63), (E, 4, 329.63),
        ]),
        // Ukulele
        preset("ukulele-standard", "Ukulele Standard", Ukulele, "Re-entrant standard tuning (G C E A)", &[
            (G, 4, 392.00), (C, 4, 261.63), (E, 4, 329.63), (A, 4, 440.00),
        ]),
        preset("ukulele-baritone", "Baritone Ukulele", Ukulele, "Baritone ukulele (D G B E)", &[
            (D, 3, 146.83), (G, 3, 196.00), (B, 3, 246.94), (E, 4, 329.63),
        ]),
        // Mandolin: four unison courses
        preset("mandolin-standard", "Mandolin Standard", Mandolin, "Standard mandolin tuning (G D A E)", &[
            (G, 3, 196.00), (G, 3, 196.00), (D, 4, 293.66), (D, 4, 293.66),
            (A, 4, 440.00), (A, 4, 440.00), (E, 5, 659.25), (E, 5, 659.25),
        ]),
        // 5-string banjo, short fifth string first
        preset("banjo-open-g", "Banjo Open G", Banjo, "Open G for 5-string banjo (G D G B D)", &[
            (G, 4, 392.00), (D, 3, 146.83), (G, 3, 196.00), (B, 3, 246.94), (D, 4, 293.66),
        ]),
        preset("banjo-c-tuning", "Banjo C Tuning", Banjo, "C tuning for 5-string banjo (G C G B D)", &[
            (G, 4, 392.00), (C, 3, 130.81), (G, 3, 196.00), (B, 3, 246.94), (D, 4, 293.66),
        ]),
    ]
});

/// Finds a preset by id.
pub fn preset_by_id(id: &str) -> Option<&'static Tuning> {
    PRESET_TUNINGS.iter().find(|t| t.id == id)
}

/// Presets plus user-defined tunings, with one of them selected.
#[derive(Debug, Clone)]
pub struct TuningTable {
    custom: Vec<Tuning>,
    selected_id: String,
}

impl Default for TuningTable {
    fn default() -> Self {
        Self {
            custom: Vec::new(),
            selected_id: DEFAULT_TUNING_ID.to_string(),
        }
    }
}

impl TuningTable {
    /// Presets only, with the default tuning selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// All tunings, presets first.
    pub fn all(&self) -> impl Iterator<Item = &Tuning> {
        PRESET_TUNINGS.iter().chain(self.custom.iter())
    }

    /// User-defined tunings in insertion order.
    pub fn custom(&self) -> &[Tuning] {
        &self.custom
    }

    /// Looks up a preset or custom tuning by id.
    pub fn get(&self, id: &str) -> Option<&Tuning> {
        self.all().find(|t| t.id == id)
    }

    /// Tunings of one instrument family, presets first.
    pub fn tunings_for(&self, instrument: Instrument) -> impl Iterator<Item = &Tuning> {
        self.all().filter(move |t| t.instrument == instrument)
    }

    /// Id of the selected tuning.
    pub fn selected_id(&self) -> &str {
        &self.selected_id
    }

    /// The selected tuning. Falls back to the default preset if the
    /// selected id no longer exists.
    pub fn selected(&self) -> &Tuning {
        self.get(&self.selected_id).unwrap_or(&PRESET_TUNINGS[0])
    }

    /// Selects a tuning by id.
    ///
    /// # Returns
    /// * `Ok(tuning)` - The newly selected tuning
    /// * `Err(TunerError::UnknownTuning)` - No tuning has this id; the
    ///   selection is unchanged
    pub fn select(&mut self, id: &str) -> Result<&Tuning> {
        if self.get(id).is_none() {
            return Err(TunerError::UnknownTuning(id.to_string()));
        }
        self.selected_id = id.to_string();
        info!("[TUNING] Selected tuning '{id}'");
        Ok(self.selected())
    }

    /// Selects the first tuning available for `instrument`.
    pub fn select_instrument(&mut self, instrument: Instrument) -> Option<&Tuning> {
        let id = self.tunings_for(instrument).next()?.id.clone();
        self.selected_id = id;
        info!("[TUNING] Switched to {instrument}, selected '{}'", self.selected_id);
        Some(self.selected())
    }

    /// Adds a custom tuning after validating it. Ids must be unique across
    /// presets and custom tunings.
    pub fn add_custom(&mut self, tuning: Tuning) -> Result<()> {
        tuning.validate()?;
        if self.get(&tuning.id).is_some() {
            return Err(TunerError::InvalidTuning {
                id: tuning.id,
                reason: "a tuning with this id already exists".into(),
            });
        }
        info!("[TUNING] Added custom tuning '{}'", tuning.id);
        self.custom.push(tuning);
        Ok(())
    }

    /// Removes a custom tuning. Removing the selected tuning reverts the
    /// selection to the default preset. Presets cannot be removed.
    pub fn remove_custom(&mut self, id: &str) -> Option<Tuning> {
        let pos = self.custom.iter().position(|t| t.id == id)?;
        let removed = self.custom.remove(pos);
        if self.selected_id == id {
            self.selected_id = DEFAULT_TUNING_ID.to_string();
        }
        info!("[TUNING] Removed custom tuning '{id}'");
        Some(removed)
    }

    /// Imports custom tunings from a JSON array. Nothing is added if any
    /// entry is invalid or clashes with an existing id.
    pub fn import_json(&mut self, json: &str) -> Result<usize> {
        let tunings: Vec<Tuning> = serde_json::from_str(json)?;

        {
            let mut seen = HashSet::new();
            for tuning in &tunings {
                tuning.validate()?;
                if self.get(&tuning.id).is_some() || !seen.insert(tuning.id.as_str()) {
                    return Err(TunerError::InvalidTuning {
                        id: tuning.id.clone(),
                        reason: "a tuning with this id already exists".into(),
                    });
                }
            }
        }

        let count = tunings.len();
        self.custom.extend(tunings);
        info!("[TUNING] Imported {count} custom tunings");
        Ok(count)
    }

    /// Reads a JSON array of tunings from `path` and imports it.
    pub fn load_custom(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let json = std::fs::read_to_string(path)?;
        self.import_json(&json)
    }

    /// Serializes the custom tunings as a pretty-printed JSON array.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.custom)?)
    }
}

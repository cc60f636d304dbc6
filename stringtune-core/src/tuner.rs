//! # Tuner Module
//!
//! The stateful core object. One call to [`Tuner::tick`] pulls the newest
//! frame from the audio source and runs the whole pipeline:
//!
//! ```text
//! frame -> pitch estimate -> range filter -> note resolver
//!                                         -> string matcher -> accuracy history
//! ```
//!
//! The accuracy history and its stability gate are the only state carried
//! from one tick to the next. A tuner is meant to be driven from a single
//! thread; hosts that share it must hold one lock around a whole tick.

use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::audio::CpalSource;
use crate::error::Result;
use crate::frame::{AudioFrame, DEFAULT_WINDOW_SIZE};
use crate::history::{AccuracyHistory, DEFAULT_STABILITY_TICKS};
use crate::matcher::match_string;
use crate::note::{PitchClass, resolve};
use crate::pitch::{AutocorrelationMethod, MAX_PLAUSIBLE_HZ, MIN_PLAUSIBLE_HZ, PitchEstimator};
use crate::source::AudioSource;
use crate::tuning::{DEFAULT_TUNING_ID, Tuning, TuningTable};

/// Accepted range for the pre-amplification gain.
pub const SENSITIVITY_RANGE: (f32, f32) = (0.1, 5.0);

/// Accepted range for the RMS noise floor.
pub const NOISE_THRESHOLD_RANGE: (f32, f32) = (0.001, 0.1);

const MIN_WINDOW_SIZE: usize = 256;

/// Largest analysis window. Keeps the direct O(n²) autocorrelation
/// within a tick's budget.
pub const MAX_WINDOW_SIZE: usize = 16_384;

/// Tuner settings. Missing JSON keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Input device name, `None` for the default input.
    pub device_id: Option<String>,
    /// Gain applied to captured samples.
    pub sensitivity: f32,
    /// RMS level below which a frame counts as silence.
    pub noise_threshold: f32,
    /// Analysis window in samples, a power of two.
    pub window_size: usize,
    pub min_frequency: f32,
    pub max_frequency: f32,
    /// Consecutive ticks on the same string before accuracy is recorded.
    pub stability_ticks: usize,
    pub autocorrelation: AutocorrelationMethod,
    pub tuning_id: String,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            sensitivity: 1.0,
            noise_threshold: 0.01,
            window_size: DEFAULT_WINDOW_SIZE,
            min_frequency: MIN_PLAUSIBLE_HZ,
            max_frequency: MAX_PLAUSIBLE_HZ,
            stability_ticks: DEFAULT_STABILITY_TICKS,
            autocorrelation: AutocorrelationMethod::default(),
            tuning_id: DEFAULT_TUNING_ID.to_string(),
        }
    }
}

impl TunerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Clamps every field into its usable range.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        self.sensitivity = clamp_or(self.sensitivity, SENSITIVITY_RANGE, defaults.sensitivity);
        self.noise_threshold =
            clamp_or(self.noise_threshold, NOISE_THRESHOLD_RANGE, defaults.noise_threshold);
        self.window_size = self
            .window_size
            .clamp(MIN_WINDOW_SIZE, MAX_WINDOW_SIZE)
            .next_power_of_two();
        self.stability_ticks = self.stability_ticks.max(1);

        let range_valid = self.min_frequency.is_finite()
            && self.max_frequency.is_finite()
            && self.min_frequency > 0.0
            && self.min_frequency < self.max_frequency;
        if !range_valid {
            warn!(
                "[TUNER] Ignoring frequency range {}..{} Hz",
                self.min_frequency, self.max_frequency
            );
            self.min_frequency = defaults.min_frequency;
            self.max_frequency = defaults.max_frequency;
        }
        self
    }
}

fn clamp_or(value: f32, (min, max): (f32, f32), fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// What one tick reports.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickResult {
    /// Detected frequency rounded to 0.01 Hz, 0.0 when nothing was heard.
    pub frequency: f32,
    pub note: Option<PitchClass>,
    pub octave: i32,
    /// Deviation from the nearest chromatic note.
    pub cents: i32,
    /// Whether the tuner is running.
    pub is_active: bool,
    pub detected_string_index: Option<usize>,
    /// Signed deviation from the detected string's target.
    pub cents_from_string: Option<f32>,
    pub confidence: f32,
}

impl TickResult {
    /// True when a note was resolved on this tick.
    pub fn has_pitch(&self) -> bool {
        self.note.is_some()
    }

    /// Note name, or an empty string when no pitch was detected.
    pub fn note_name(&self) -> &'static str {
        self.note.map(PitchClass::name).unwrap_or("")
    }
}

/// Pitch detection and tuning resolution over an [`AudioSource`].
#[derive(Debug)]
pub struct Tuner<S: AudioSource> {
    source: S,
    config: TunerConfig,
    tunings: TuningTable,
    estimator: PitchEstimator,
    history: AccuracyHistory,
    running: bool,
}

impl<S: AudioSource> Tuner<S> {
    pub fn new(source: S, config: TunerConfig) -> Self {
        Self::with_tunings(source, config, TuningTable::new())
    }

    /// Builds a tuner over an existing table, e.g. one with custom tunings
    /// already imported. The configured tuning id is selected if present.
    pub fn with_tunings(source: S, config: TunerConfig, mut tunings: TuningTable) -> Self {
        let mut config = config.sanitized();
        if let Err(e) = tunings.select(&config.tuning_id) {
            warn!("[TUNER] {e}, using '{}'", tunings.selected_id());
            config.tuning_id = tunings.selected_id().to_string();
        }

        Self {
            source,
            estimator: PitchEstimator::new(config.autocorrelation),
            history: AccuracyHistory::new(config.stability_ticks),
            tunings,
            config,
            running: false,
        }
    }

    /// Acquires the audio source. Calling it while running is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        self.source.set_sensitivity(self.config.sensitivity);
        self.source.start()?;
        self.running = true;
        info!("[TUNER] Started with tuning '{}'", self.config.tuning_id);
        Ok(())
    }

    /// Releases the audio source and drops per-tick state. Recorded
    /// accuracy samples are kept.
    pub fn stop(&mut self) {
        self.source.stop();
        self.history.reset_gate();
        if self.running {
            info!("[TUNER] Stopped");
        }
        self.running = false;
    }

    /// Whether the tuner is between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Analyses the newest frame from the source.
    ///
    /// Returns an empty result while stopped or until the source has a
    /// full window.
    pub fn tick(&mut self) -> TickResult {
        if !self.running {
            return TickResult::default();
        }
        match self.source.next_frame() {
            Some(frame) => self.process_frame(&frame),
            None => TickResult {
                is_active: true,
                ..TickResult::default()
            },
        }
    }

    /// Runs the pipeline over one frame. Only reached from a running
    /// [`tick`](Self::tick).
    ///
    /// Frames with no pitch in the configured range leave the stability
    /// gate untouched.
    fn process_frame(&mut self, frame: &AudioFrame) -> TickResult {
        let estimate = self.estimator.estimate(frame, self.config.noise_threshold);

        let resolved = estimate
            .within(self.config.min_frequency, self.config.max_frequency)
            .and_then(|frequency| resolve(frequency).map(|note| (frequency, note)));
        let Some((frequency, note)) = resolved else {
            return TickResult {
                is_active: self.running,
                confidence: estimate.confidence,
                ..TickResult::default()
            };
        };

        let tuning = self.tunings.selected();
        let string_match = match_string(frequency, tuning);
        match string_match {
            Some(m) => {
                let target = tuning.string(m.string_index).map(|s| s.label());
                if self
                    .history
                    .record_with_target(m.string_index, target, note.cents)
                {
                    debug!("[TUNER] recorded string {} at {} cents", m.string_index, note.cents);
                }
            }
            None => self.history.record_unmatched(),
        }

        debug!(
            "[TUNER] {frequency:.2} Hz -> {note}, string {:?}",
            string_match.map(|m| m.string_index)
        );

        TickResult {
            frequency: (frequency * 100.0).round() / 100.0,
            note: Some(note.note),
            octave: note.octave,
            cents: note.cents,
            is_active: self.running,
            detected_string_index: string_match.map(|m| m.string_index),
            cents_from_string: string_match.map(|m| m.cents_from_string),
            confidence: estimate.confidence,
        }
    }

    /// Mean recent error for a string of the active tuning, `None` when
    /// the string has no samples yet.
    pub fn accuracy_for(&self, string_index: usize) -> Option<f32> {
        self.history.accuracy_for(string_index)
    }

    /// One entry per string of the active tuning.
    pub fn accuracies(&self) -> Vec<Option<f32>> {
        self.history.accuracies(self.tuning().string_count())
    }

    /// Recorded accuracy samples, newest first.
    pub fn history(&self) -> &AccuracyHistory {
        &self.history
    }

    /// The active tuning.
    pub fn tuning(&self) -> &Tuning {
        self.tunings.selected()
    }

    /// Presets and custom tunings available for selection.
    pub fn tunings(&self) -> &TuningTable {
        &self.tunings
    }

    /// Switches tuning. String indices change meaning, so the accuracy
    /// history is cleared.
    pub fn select_tuning(&mut self, id: &str) -> Result<()> {
        self.tunings.select(id)?;
        self.config.tuning_id = id.to_string();
        self.history.clear();
        Ok(())
    }

    /// Adds a validated custom tuning without selecting it.
    pub fn add_custom_tuning(&mut self, tuning: Tuning) -> Result<()> {
        self.tunings.add_custom(tuning)
    }

    /// Removes a custom tuning, clearing the history if it was selected.
    pub fn remove_custom_tuning(&mut self, id: &str) -> Option<Tuning> {
        let removed = self.tunings.remove_custom(id)?;
        if self.config.tuning_id == id {
            self.config.tuning_id = self.tunings.selected_id().to_string();
            self.history.clear();
        }
        Some(removed)
    }

    /// Current settings, including live changes made through the setters.
    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// Takes effect on the next tick.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.config.sensitivity =
            clamp_or(sensitivity, SENSITIVITY_RANGE, self.config.sensitivity);
        self.source.set_sensitivity(self.config.sensitivity);
    }

    /// Takes effect on the next tick.
    pub fn set_noise_threshold(&mut self, threshold: f32) {
        self.config.noise_threshold =
            clamp_or(threshold, NOISE_THRESHOLD_RANGE, self.config.noise_threshold);
    }

    /// Changes the stability window; the current run is kept.
    pub fn set_stability_ticks(&mut self, ticks: usize) {
        self.config.stability_ticks = ticks.max(1);
        self.history.set_stability_ticks(ticks);
    }

    /// Switches the estimator between direct and FFT autocorrelation.
    pub fn set_autocorrelation(&mut self, method: AutocorrelationMethod) {
        self.config.autocorrelation = method;
        self.estimator.set_method(method);
    }

    /// Switches input device, restarting the source if it was running.
    ///
    /// The restart drops the stability run; recorded samples are kept.
    pub fn set_device(&mut self, device_id: Option<String>) -> Result<()> {
        let was_running = self.running;
        if was_running {
            self.stop();
        }
        info!("[TUNER] Input device set to {}", device_id.as_deref().unwrap_or("<default>"));
        self.source.set_device_id(device_id.clone());
        self.config.device_id = device_id;
        if was_running {
            self.start()?;
        }
        Ok(())
    }

    /// The audio source the tuner pulls frames from.
    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: AudioSource> Drop for Tuner<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Tuner<CpalSource> {
    /// A tuner over the configured input device.
    pub fn from_config(config: TunerConfig) -> Self {
        let config = config.sanitized();
        let source = CpalSource::new(config.device_id.clone(), config.window_size);
        Self::new(source, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ReplaySource;
    use std::f32::consts::PI;

    const SAMPLE_RATE: u32 = 44_100;

    fn sine(freq: f32) -> AudioFrame {
        let samples = (0..DEFAULT_WINDOW_SIZE)
            .map(|i| 0.6 * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
            .collect();
        AudioFrame::new(samples, SAMPLE_RATE).unwrap()
    }

    fn silence() -> AudioFrame {
        AudioFrame::new(vec![0.0; DEFAULT_WINDOW_SIZE], SAMPLE_RATE).unwrap()
    }

    fn offline() -> Tuner<ReplaySource> {
        Tuner::new(ReplaySource::new([]), TunerConfig::default())
    }

    fn running(frames: impl IntoIterator<Item = AudioFrame>) -> Tuner<ReplaySource> {
        let mut tuner = Tuner::new(ReplaySource::new(frames), TunerConfig::default());
        tuner.start().unwrap();
        tuner
    }

    #[test]
    fn test_config_defaults_and_clamping() {
        let config = TunerConfig::from_json(
            r#"{ "sensitivity": 9.0, "noise_threshold": 0.0, "window_size": 3000 }"#,
        )
        .unwrap();
        assert_eq!(config.sensitivity, 5.0);
        assert_eq!(config.noise_threshold, 0.001);
        assert_eq!(config.window_size, 4096);
        assert_eq!(config.tuning_id, "standard-e");
        assert_eq!(config.autocorrelation, AutocorrelationMethod::Direct);

        let config = TunerConfig {
            min_frequency: 500.0,
            max_frequency: 100.0,
            ..TunerConfig::default()
        }
        .sanitized();
        assert_eq!(config.min_frequency, MIN_PLAUSIBLE_HZ);
        assert_eq!(config.max_frequency, MAX_PLAUSIBLE_HZ);
    }

    #[test]
    fn test_oversized_window_is_clamped() {
        let config = TunerConfig::from_json(r#"{ "window_size": 1048576 }"#).unwrap();
        assert_eq!(config.window_size, MAX_WINDOW_SIZE);

        let config = TunerConfig::from_json(r#"{ "window_size": 18446744073709551615 }"#).unwrap();
        assert_eq!(config.window_size, MAX_WINDOW_SIZE);

        let config = TunerConfig::from_json(r#"{ "window_size": 0 }"#).unwrap();
        assert_eq!(config.window_size, MIN_WINDOW_SIZE);
    }

    #[test]
    fn test_config_parses_method() {
        let config = TunerConfig::from_json(r#"{ "autocorrelation": "fft" }"#).unwrap();
        assert_eq!(config.autocorrelation, AutocorrelationMethod::Fft);
        assert!(TunerConfig::from_json(r#"{ "autocorrelation": "yin" }"#).is_err());
    }

    #[test]
    fn test_tick_detects_string() {
        let mut tuner = running([sine(110.0)]);
        let result = tuner.tick();

        assert!(result.has_pitch());
        assert_eq!(result.note_name(), "A");
        assert_eq!(result.octave, 2);
        assert!(result.cents.abs() <= 10);
        assert_eq!(result.detected_string_index, Some(1));
        assert!((result.frequency - 110.0).abs() < 0.55);
    }

    #[test]
    fn test_silence_reports_nothing() {
        let mut tuner = running([silence()]);
        let result = tuner.tick();
        assert!(result.is_active);
        assert_eq!(result.frequency, 0.0);
        assert_eq!(result.note, None);
        assert_eq!(result.detected_string_index, None);
    }

    #[test]
    fn test_unknown_configured_tuning_falls_back() {
        let config = TunerConfig {
            tuning_id: "missing".into(),
            ..TunerConfig::default()
        };
        let tuner = Tuner::new(ReplaySource::new([]), config);
        assert_eq!(tuner.tuning().id, DEFAULT_TUNING_ID);
        assert_eq!(tuner.config().tuning_id, DEFAULT_TUNING_ID);
    }

    #[test]
    fn test_live_setters_clamp() {
        let mut tuner = offline();
        tuner.set_sensitivity(0.0);
        assert_eq!(tuner.config().sensitivity, 0.1);
        tuner.set_noise_threshold(f32::NAN);
        assert_eq!(tuner.config().noise_threshold, 0.01);
        tuner.set_noise_threshold(0.5);
        assert_eq!(tuner.config().noise_threshold, 0.1);
    }

    #[test]
    fn test_select_tuning_clears_history() {
        let mut tuner = running((0..3).map(|_| sine(110.0)));
        for _ in 0..3 {
            tuner.tick();
        }
        assert!(tuner.accuracy_for(1).is_some());

        tuner.select_tuning("drop-d").unwrap();
        assert!(tuner.history().is_empty());
        assert!(tuner.select_tuning("unknown").is_err());
        assert_eq!(tuner.tuning().id, "drop-d");
    }

    #[test]
    fn test_stopped_tuner_leaves_history_alone() {
        let mut tuner = Tuner::new(
            ReplaySource::new((0..3).map(|_| sine(110.0))),
            TunerConfig::default(),
        );
        for _ in 0..3 {
            let result = tuner.tick();
            assert!(!result.is_active);
            assert!(!result.has_pitch());
        }
        assert!(tuner.history().is_empty());
        // Frames are not consumed while stopped.
        assert_eq!(tuner.source().remaining(), 3);
    }
}

//! # Accuracy History Module
//!
//! Rolling record of how close the player got to each string. Samples are
//! only taken when the detection is stable (the same string on several
//! consecutive ticks) and a whole note was heard, so a single flickering
//! tick never lands in the history.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use serde::{Deserialize, Serialize};

/// Global number of samples retained, newest first.
pub const HISTORY_CAPACITY: usize = 100;

/// Number of most recent samples averaged per string.
pub const ACCURACY_WINDOW: usize = 5;

/// Consecutive identical detections required before recording.
pub const DEFAULT_STABILITY_TICKS: usize = 2;

/// Samples at or beyond this note-level error are not recorded.
pub const MAX_RECORDED_CENTS: i32 = 50;

/// One recorded tuning attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracySample {
    pub string_index: usize,
    /// Target label of the string at recording time, e.g. `"A2"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_note: Option<String>,
    /// Absolute error in cents.
    pub cents_error: u32,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

/// Display bucket for an average error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyGrade {
    /// Within 5 cents.
    Accurate,
    /// Within 15 cents.
    Close,
    Off,
}

impl AccuracyGrade {
    /// Buckets an average error; the sign is ignored.
    pub fn from_cents(cents: f32) -> Self {
        let cents = cents.abs();
        if cents <= 5.0 {
            AccuracyGrade::Accurate
        } else if cents <= 15.0 {
            AccuracyGrade::Close
        } else {
            AccuracyGrade::Off
        }
    }
}

/// Hysteresis on the detected string index.
///
/// Passes once the same string has been observed on `required_ticks`
/// consecutive ticks.
#[derive(Debug, Clone)]
pub struct StabilityGate {
    required_ticks: usize,
    last: Option<usize>,
    run: usize,
}

impl StabilityGate {
    /// A gate that opens after `required_ticks` identical detections
    /// (at least one).
    pub fn new(required_ticks: usize) -> Self {
        Self {
            required_ticks: required_ticks.max(1),
            last: None,
            run: 0,
        }
    }

    /// Feeds this tick's detection and reports whether it is stable.
    pub fn observe(&mut self, detected: Option<usize>) -> bool {
        match detected {
            Some(index) if self.last == Some(index) => self.run += 1,
            Some(_) => self.run = 1,
            None => self.run = 0,
        }
        self.last = detected;
        detected.is_some() && self.run >= self.required_ticks
    }

    /// String index seen on the previous observed tick.
    pub fn last(&self) -> Option<usize> {
        self.last
    }

    /// Run length needed before `observe` reports stable.
    pub fn required_ticks(&self) -> usize {
        self.required_ticks
    }

    /// Changes the required run length; values below one are raised to one.
    pub fn set_required_ticks(&mut self, ticks: usize) {
        self.required_ticks = ticks.max(1);
    }

    /// Forgets the current run.
    pub fn reset(&mut self) {
        self.last = None;
        self.run = 0;
    }
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_TICKS)
    }
}

/// Bounded per-string accuracy log.
#[derive(Debug, Clone, Default)]
pub struct AccuracyHistory {
    samples: VecDeque<AccuracySample>,
    gate: StabilityGate,
}

impl AccuracyHistory {
    /// Empty history whose gate needs `stability_ticks` identical
    /// detections before recording.
    pub fn new(stability_ticks: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY),
            gate: StabilityGate::new(stability_ticks),
        }
    }

    /// Records a tick on which `string_index` was detected with a
    /// note-level error of `cents_error`.
    ///
    /// The sample is kept only if the detection passes the stability gate
    /// and the error is below [`MAX_RECORDED_CENTS`]. Returns whether a
    /// sample was appended.
    pub fn record(&mut self, string_index: usize, cents_error: i32) -> bool {
        self.record_with_target(string_index, None, cents_error)
    }

    /// [`record`](Self::record) with the target label stored alongside.
    ///
    /// # Arguments
    /// * `string_index` - Index of the matched string in the active tuning
    /// * `target_note` - Label of that string, e.g. `"A2"`
    /// * `cents_error` - Signed note-level deviation in cents
    ///
    /// # Returns
    /// * `true` - A sample was appended
    /// * `false` - The detection is not stable yet or the error is too large
    pub fn record_with_target(
        &mut self,
        string_index: usize,
        target_note: Option<String>,
        cents_error: i32,
    ) -> bool {
        if !self.gate.observe(Some(string_index)) {
            debug!("[HISTORY] string {string_index} not stable yet");
            return false;
        }
        if cents_error.abs() >= MAX_RECORDED_CENTS {
            debug!("[HISTORY] skipped string {string_index}: {cents_error} cents");
            return false;
        }

        self.push(AccuracySample {
            string_index,
            target_note,
            cents_error: cents_error.unsigned_abs(),
            timestamp_ms: now_ms(),
        });
        true
    }

    /// Notes a tick with a pitch that matched no string. Breaks the
    /// stability run.
    pub fn record_unmatched(&mut self) {
        self.gate.observe(None);
    }

    /// Appends a sample without gating, evicting the oldest beyond
    /// [`HISTORY_CAPACITY`].
    pub fn push(&mut self, sample: AccuracySample) {
        self.samples.push_front(sample);
        self.samples.truncate(HISTORY_CAPACITY);
    }

    /// Mean absolute error over the newest [`ACCURACY_WINDOW`] samples for
    /// `string_index`, or `None` if the string has never been recorded.
    pub fn accuracy_for(&self, string_index: usize) -> Option<f32> {
        let (sum, count) = self
            .samples
            .iter()
            .filter(|s| s.string_index == string_index)
            .take(ACCURACY_WINDOW)
            .fold((0u32, 0u32), |(sum, count), s| (sum + s.cents_error, count + 1));

        (count > 0).then(|| sum as f32 / count as f32)
    }

    /// [`accuracy_for`](Self::accuracy_for) for strings `0..string_count`.
    pub fn accuracies(&self, string_count: usize) -> Vec<Option<f32>> {
        (0..string_count).map(|i| self.accuracy_for(i)).collect()
    }

    /// Samples, newest first.
    pub fn samples(&self) -> impl Iterator<Item = &AccuracySample> {
        self.samples.iter()
    }

    /// Number of retained samples across all strings.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The stability gate guarding [`record`](Self::record).
    pub fn gate(&self) -> &StabilityGate {
        &self.gate
    }

    /// Changes how many identical detections the gate requires.
    pub fn set_stability_ticks(&mut self, ticks: usize) {
        self.gate.set_required_ticks(ticks);
    }

    /// Forgets the stability run without touching recorded samples.
    pub fn reset_gate(&mut self) {
        self.gate.reset();
    }

    /// Drops every sample and the stability run.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.gate.reset();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

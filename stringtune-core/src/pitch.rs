//! # Pitch Detection Module
//!
//! Estimates the fundamental frequency of a plucked string from one
//! analysis window using time-domain autocorrelation.
//!
//! ## Algorithm
//! 1. RMS noise gate against the caller's `noise_threshold`
//! 2. Edge trim of low-amplitude samples (fixed [`TRIM_THRESHOLD`])
//! 3. Autocorrelation `c[i] = Σ x[j]·x[j+i]` over the trimmed window
//! 4. Skip the zero-lag lobe up to the first local minimum
//! 5. Take the strongest lag after that minimum as the period
//! 6. Parabolic interpolation for sub-sample accuracy
//!
//! The estimator does not enforce an instrument range; callers filter with
//! [`is_plausible`] or their own bounds before resolving notes.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::fft::FftAutocorrelator;
use crate::frame::{AudioFrame, rms};

/// Amplitude below which leading and trailing samples are trimmed.
///
/// Independent of the configurable RMS noise threshold.
pub const TRIM_THRESHOLD: f32 = 0.2;

/// Lowest frequency accepted as a plausible string fundamental.
pub const MIN_PLAUSIBLE_HZ: f32 = 50.0;

/// Highest frequency accepted as a plausible string fundamental.
pub const MAX_PLAUSIBLE_HZ: f32 = 2000.0;

/// How the autocorrelation sequence is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutocorrelationMethod {
    /// Direct O(n²) lag sum.
    #[default]
    Direct,
    /// Wiener–Khinchin via RustFFT, O(n log n).
    Fft,
}

/// Result of one estimator run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz, `None` for silence or unusable geometry.
    pub frequency: Option<f32>,
    /// 0.0 at the noise gate, approaching 1.0 as the signal gets louder.
    pub confidence: f32,
    /// RMS level of the analysed window.
    pub rms: f32,
}

impl PitchEstimate {
    fn none(rms: f32) -> Self {
        Self {
            frequency: None,
            confidence: 0.0,
            rms,
        }
    }

    /// The frequency, if one was found inside `[min_hz, max_hz]`.
    pub fn within(&self, min_hz: f32, max_hz: f32) -> Option<f32> {
        self.frequency.filter(|&f| f > min_hz && f < max_hz)
    }
}

/// Whether `frequency` lies in the default plausible string range.
pub fn is_plausible(frequency: f32) -> bool {
    frequency > MIN_PLAUSIBLE_HZ && frequency < MAX_PLAUSIBLE_HZ
}

/// Stateful wrapper that keeps FFT plans alive between ticks.
#[derive(Debug, Default)]
pub struct PitchEstimator {
    method: AutocorrelationMethod,
    fft: FftAutocorrelator,
}

impl PitchEstimator {
    pub fn new(method: AutocorrelationMethod) -> Self {
        Self {
            method,
            fft: FftAutocorrelator::new(),
        }
    }

    pub fn method(&self) -> AutocorrelationMethod {
        self.method
    }

    pub fn set_method(&mut self, method: AutocorrelationMethod) {
        self.method = method;
    }

    /// Runs the full estimator over one frame.
    pub fn estimate(&mut self, frame: &AudioFrame, noise_threshold: f32) -> PitchEstimate {
        let signal = frame.samples();

        // --- Noise Gate: RMS below the floor means "no pitch" ---
        let level = rms(signal);
        if level < noise_threshold {
            return PitchEstimate::none(level);
        }

        let (start, end) = trim_bounds(signal);
        let trimmed = &signal[start..end];

        let correlation = match self.method {
            AutocorrelationMethod::Direct => autocorrelate(trimmed),
            AutocorrelationMethod::Fft => self.fft.autocorrelate(trimmed),
        };

        let Some(period) = refined_period(&correlation) else {
            trace!("[PITCH] degenerate autocorrelation, rms={level:.4}");
            return PitchEstimate::none(level);
        };

        let frequency = frame.sample_rate() as f64 / period;
        if !frequency.is_finite() || frequency <= 0.0 {
            return PitchEstimate::none(level);
        }

        let confidence = if noise_threshold > 0.0 && level > 0.0 {
            (1.0 - noise_threshold / level).clamp(0.0, 1.0)
        } else {
            1.0
        };

        trace!("[PITCH] period={period:.3} samples, f={frequency:.2} Hz, rms={level:.4}");

        PitchEstimate {
            frequency: Some(frequency as f32),
            confidence,
            rms: level,
        }
    }
}

/// Estimates the fundamental of `frame` with the direct method.
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - Silence, or no interior lag for interpolation
pub fn estimate(frame: &AudioFrame, noise_threshold: f32) -> Option<f32> {
    PitchEstimator::new(AutocorrelationMethod::Direct)
        .estimate(frame, noise_threshold)
        .frequency
}

/// Finds the `[start, end)` range left after trimming quiet edges.
///
/// Only the first half of the window is searched for the start and the
/// second half for the end; when no sample crosses [`TRIM_THRESHOLD`] the
/// corresponding edge is left untouched.
fn trim_bounds(signal: &[f32]) -> (usize, usize) {
    let n = signal.len();
    let half = n / 2;

    let start = (0..half)
        .find(|&i| signal[i].abs() >= TRIM_THRESHOLD)
        .unwrap_or(0);
    let end = (1..half)
        .find(|&i| signal[n - i].abs() >= TRIM_THRESHOLD)
        .map(|i| n - i + 1)
        .unwrap_or(n);

    (start, end)
}

/// Direct unnormalized autocorrelation over every lag.
fn autocorrelate(signal: &[f32]) -> Vec<f64> {
    let n = signal.len();
    (0..n)
        .map(|lag| {
            signal[..n - lag]
                .iter()
                .zip(&signal[lag..])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum()
        })
        .collect()
}

/// Picks the period lag from an autocorrelation sequence and refines it
/// with a parabola through its neighbours.
///
/// Returns `None` when the peak sits at lag 0 or on the last lag, where no
/// interior point exists to interpolate over.
fn refined_period(c: &[f64]) -> Option<f64> {
    let len = c.len();
    if len < 3 {
        return None;
    }

    // Walk down the zero-lag lobe to the first local minimum.
    let mut dip = 0;
    while dip + 1 < len && c[dip] > c[dip + 1] {
        dip += 1;
    }

    let mut max_pos = dip;
    let mut max_val = f64::NEG_INFINITY;
    for (lag, &value) in c.iter().enumerate().skip(dip) {
        if value > max_val {
            max_val = value;
            max_pos = lag;
        }
    }

    if max_pos == 0 || max_pos + 1 >= len {
        return None;
    }

    let x1 = c[max_pos - 1];
    let x2 = c[max_pos];
    let x3 = c[max_pos + 1];

    let a = (x1 - 2.0 * x2 + x3) / 2.0;
    let b = (x3 - x1) / 2.0;

    // A strict first maximum keeps `a` non-zero; non-finite input still
    // lands here as NaN and is rejected below.
    let period = max_pos as f64 - b / (2.0 * a);

    (period.is_finite() && period > 0.0).then_some(period)
}

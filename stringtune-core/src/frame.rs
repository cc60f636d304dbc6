//! # Frame Buffer Module
//!
//! Holds the time-domain window handed to the pitch estimator each tick.
//! Capture callbacks deliver audio in arbitrary chunk sizes; the
//! [`FrameBuffer`] keeps only the newest `window_size` samples so that
//! every analysis tick sees the most recent audio.

use std::collections::VecDeque;

use crate::error::{Result, TunerError};

/// Default analysis window in samples.
///
/// At 44.1 kHz this is ~93 ms of audio, enough for several periods of the
/// lowest guitar strings (B1 ≈ 61.7 Hz).
pub const DEFAULT_WINDOW_SIZE: usize = 4096;

/// An immutable window of normalized samples tagged with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Creates a frame, rejecting windows that are not a power of two long
    /// or that carry a zero sample rate.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(TunerError::InvalidFrame("sample rate must be non-zero".into()));
        }
        if !samples.len().is_power_of_two() {
            return Err(TunerError::InvalidFrame(format!(
                "window length {} is not a power of two",
                samples.len()
            )));
        }
        Ok(Self { samples, sample_rate })
    }

    /// Samples in capture order, nominally in `[-1.0, 1.0]`.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Capture rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Window length in samples, always a power of two.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square level of the whole window.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Root-mean-square of a block of samples. Zero for an empty block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Sliding window over the newest captured samples.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    window: VecDeque<f32>,
    window_size: usize,
    sample_rate: u32,
}

impl FrameBuffer {
    /// Creates an empty window.
    ///
    /// # Arguments
    /// * `window_size` - Number of newest samples kept; should be a power of two
    /// * `sample_rate` - Rate of the incoming audio in Hz
    pub fn new(window_size: usize, sample_rate: u32) -> Self {
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            sample_rate,
        }
    }

    /// Appends a chunk of captured samples, evicting the oldest ones once
    /// the window is full.
    pub fn push(&mut self, chunk: &[f32]) {
        if chunk.len() >= self.window_size {
            self.window.clear();
            self.window.extend(&chunk[chunk.len() - self.window_size..]);
            return;
        }

        let overflow = (self.window.len() + chunk.len()).saturating_sub(self.window_size);
        self.window.drain(..overflow);
        self.window.extend(chunk);
    }

    /// True once a whole window of audio has been captured.
    pub fn is_full(&self) -> bool {
        self.window.len() == self.window_size
    }

    /// Capacity of the window in samples.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Rate of the buffered audio in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Copies the current window into a fresh frame with `gain` applied.
    ///
    /// Returns `None` until the window has filled up.
    pub fn snapshot(&self, gain: f32) -> Option<AudioFrame> {
        if !self.is_full() {
            return None;
        }
        let samples = self.window.iter().map(|&s| s * gain).collect();
        AudioFrame::new(samples, self.sample_rate).ok()
    }

    /// Drops all buffered samples, e.g. after a device change.
    pub fn clear(&mut self) {
        self.window.clear();
    }
}

//! # Audio Source Module
//!
//! The tuner pulls one frame per tick from an [`AudioSource`]. Live input
//! is provided by [`crate::audio::CpalSource`]; [`ReplaySource`] serves
//! pre-recorded or synthetic frames for offline analysis and tests.

use std::collections::VecDeque;

use crate::error::Result;
use crate::frame::AudioFrame;

/// Supplier of analysis frames.
pub trait AudioSource {
    /// Acquires the underlying device or stream.
    fn start(&mut self) -> Result<()>;

    /// The newest complete frame, or `None` if no full window is available
    /// yet or the source is stopped.
    fn next_frame(&mut self) -> Option<AudioFrame>;

    /// Releases the device. Must be safe to call when already stopped.
    fn stop(&mut self);

    /// Pre-amplification gain applied to captured samples.
    fn set_sensitivity(&mut self, gain: f32);

    /// Chooses the input device used by the next `start`. `None` means
    /// the default input. Sources without devices ignore it.
    fn set_device_id(&mut self, _device_id: Option<String>) {}

    /// Whether the source is between `start` and `stop`.
    fn is_running(&self) -> bool;
}

/// Plays back a queue of frames, one per tick.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    frames: VecDeque<AudioFrame>,
    gain: f32,
    running: bool,
}

impl ReplaySource {
    /// Creates a stopped source that will yield `frames` in order.
    pub fn new(frames: impl IntoIterator<Item = AudioFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            gain: 1.0,
            running: false,
        }
    }

    /// Queues another frame behind the ones already loaded.
    pub fn push(&mut self, frame: AudioFrame) {
        self.frames.push_back(frame);
    }

    /// Number of frames not yet handed out.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl AudioSource for ReplaySource {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Option<AudioFrame> {
        if !self.running {
            return None;
        }
        let frame = self.frames.pop_front()?;
        if self.gain == 1.0 {
            return Some(frame);
        }
        let samples = frame.samples().iter().map(|&s| s * self.gain).collect();
        AudioFrame::new(samples, frame.sample_rate()).ok()
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn set_sensitivity(&mut self, gain: f32) {
        self.gain = gain;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

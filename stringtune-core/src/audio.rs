//! # Audio Capture Module
//!
//! Live input through CPAL (Cross-Platform Audio Library). The capture
//! callback down-mixes to mono and hands chunks to the analysis side over a
//! bounded crossbeam channel; the analysis side folds them into a
//! [`FrameBuffer`] and hands out the newest window on each tick.
//!
//! ## Features
//! - Default or named input device
//! - Closest supported 32-bit float configuration to 44.1 kHz
//! - Sensitivity gain applied when a frame is taken
//! - Stream released synchronously on `stop`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SupportedStreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::Receiver;
use log::{info, warn};

use crate::error::{Result, TunerError};
use crate::frame::{AudioFrame, FrameBuffer};
use crate::source::AudioSource;

/// Preferred capture rate in Hz.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Chunks buffered between the capture callback and the analysis tick.
const CHUNK_QUEUE: usize = 64;

fn audio_error(err: impl std::fmt::Display) -> TunerError {
    TunerError::Audio(err.to_string())
}

/// Names of the input devices on the default host.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices().map_err(audio_error)?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Audio source backed by a CPAL input stream.
pub struct CpalSource {
    device_id: Option<String>,
    window_size: usize,
    gain: f32,
    stream: Option<cpal::Stream>,
    receiver: Option<Receiver<Vec<f32>>>,
    buffer: Option<FrameBuffer>,
    dropped: Arc<AtomicUsize>,
}

impl CpalSource {
    /// `device_id` is a device name as reported by
    /// [`list_input_devices`]; `None` selects the default input.
    pub fn new(device_id: Option<String>, window_size: usize) -> Self {
        Self {
            device_id,
            window_size,
            gain: 1.0,
            stream: None,
            receiver: None,
            buffer: None,
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Name of the configured device, `None` for the default input.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Sample rate of the running stream.
    pub fn sample_rate(&self) -> Option<u32> {
        self.buffer.as_ref().map(FrameBuffer::sample_rate)
    }

    fn select_device(&self, host: &cpal::Host) -> Result<cpal::Device> {
        match &self.device_id {
            Some(name) => host
                .input_devices()
                .map_err(audio_error)?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| TunerError::Audio(format!("Input device '{name}' not found"))),
            None => host
                .default_input_device()
                .ok_or_else(|| TunerError::Audio("No input device available".into())),
        }
    }
}

impl AudioSource for CpalSource {
    /// Opens the device and starts streaming.
    ///
    /// # Audio Configuration
    /// - Sample Rate: 44.1 kHz when supported, else the closest rate
    /// - Format: 32-bit float
    /// - Channels: fewest available, down-mixed to mono
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = self.select_device(&host)?;
        info!(
            "[AUDIO] Using audio input device: {}",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );

        let configs = device
            .supported_input_configs()
            .map_err(audio_error)?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, TARGET_SAMPLE_RATE)
            .ok_or_else(|| TunerError::Audio("No suitable f32 input format found".into()))?;

        let sample_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels.max(1) as usize;
        info!("[AUDIO] Selected sample rate: {sample_rate} Hz, {channels} channel(s)");

        let (sender, receiver) = crossbeam_channel::bounded::<Vec<f32>>(CHUNK_QUEUE);
        let err_fn = |err| warn!("[AUDIO] An error occurred on the audio stream: {err}");
        let dropped = Arc::clone(&self.dropped);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<f32> = data
                        .chunks(channels)
                        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                        .collect();

                    // Drop the chunk if analysis has fallen behind.
                    if sender.try_send(mono).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                err_fn,
                None,
            )
            .map_err(audio_error)?;

        stream.play().map_err(audio_error)?;

        self.stream = Some(stream);
        self.receiver = Some(receiver);
        self.buffer = Some(FrameBuffer::new(self.window_size, sample_rate));
        Ok(())
    }

    fn next_frame(&mut self) -> Option<AudioFrame> {
        let (receiver, buffer) = (self.receiver.as_ref()?, self.buffer.as_mut()?);
        for chunk in receiver.try_iter() {
            buffer.push(&chunk);
        }
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            warn!("[AUDIO] Dropped {dropped} input chunk(s), analysis is falling behind");
        }
        buffer.snapshot(self.gain)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("[AUDIO] Error pausing stream: {e}");
            }
            drop(stream);
            info!("[AUDIO] Input stream released");
        }
        self.receiver = None;
        self.buffer = None;
    }

    fn set_sensitivity(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Takes effect on the next `start`; a running stream keeps its device.
    fn set_device_id(&mut self, device_id: Option<String>) {
        self.device_id = device_id;
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CpalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalSource")
            .field("device_id", &self.device_id)
            .field("window_size", &self.window_size)
            .field("gain", &self.gain)
            .field("running", &self.stream.is_some())
            .finish()
    }
}

/// Picks the 32-bit float configuration with the fewest channels whose
/// rate range lies closest to `target_rate`, clamping the rate into range.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfig> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| (c.channels(), rate_distance(c, target_rate)))
        .map(|c| {
            let rate = target_rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0);
            c.with_sample_rate(cpal::SampleRate(rate))
        })
}

fn rate_distance(config: &SupportedStreamConfigRange, target_rate: u32) -> u32 {
    let (min, max) = (config.min_sample_rate().0, config.max_sample_rate().0);
    if target_rate < min {
        min - target_rate
    } else {
        target_rate.saturating_sub(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleFormat, SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_prefers_mono_float_at_target_rate() {
        let configs = vec![
            range(2, 8_000, 96_000, SampleFormat::F32),
            range(1, 8_000, 96_000, SampleFormat::I16),
            range(1, 8_000, 96_000, SampleFormat::F32),
        ];
        let chosen = find_supported_config(configs, 44_100).unwrap();
        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_rate().0, 44_100);
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn test_clamps_rate_into_supported_range() {
        let configs = vec![range(1, 48_000, 48_000, SampleFormat::F32)];
        let chosen = find_supported_config(configs, 44_100).unwrap();
        assert_eq!(chosen.sample_rate().0, 48_000);
    }

    #[test]
    fn test_no_float_config() {
        let configs = vec![range(1, 8_000, 96_000, SampleFormat::I16)];
        assert!(find_supported_config(configs, 44_100).is_none());
    }

    #[test]
    fn test_stopped_source_yields_nothing() {
        let mut source = CpalSource::new(None, 4096);
        assert!(!source.is_running());
        assert!(source.next_frame().is_none());
        source.stop();
        assert_eq!(source.sample_rate(), None);

        source.set_device_id(Some("USB Audio".into()));
        assert_eq!(source.device_id(), Some("USB Audio"));
    }
}

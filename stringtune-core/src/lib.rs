// stringtune-core/src/lib.rs

//! The core logic for the string instrument tuner.
//! This crate is responsible for audio capture, pitch detection,
//! note and string resolution, and per-string accuracy tracking.
//! It is completely headless and contains no GUI code.
//!
//! ```rust,ignore
//! use stringtune_core::{Tuner, TunerConfig};
//!
//! let mut tuner = Tuner::from_config(TunerConfig::default());
//! tuner.start()?;
//! loop {
//!     let result = tuner.tick();
//!     if let Some(string) = result.detected_string_index {
//!         println!("{}{} string {string}: {:+} cents", result.note_name(), result.octave, result.cents);
//!     }
//! }
//! ```

pub mod audio;
pub mod error;
pub mod fft;
pub mod frame;
pub mod history;
pub mod matcher;
pub mod note;
pub mod pitch;
pub mod source;
pub mod tuner;
pub mod tuning;

pub use error::{Result, TunerError};
pub use frame::AudioFrame;
pub use history::{AccuracyGrade, AccuracyHistory};
pub use matcher::{StringMatch, match_string};
pub use note::{NoteResult, PitchClass, resolve};
pub use pitch::{AutocorrelationMethod, PitchEstimate, PitchEstimator};
pub use source::{AudioSource, ReplaySource};
pub use tuner::{TickResult, Tuner, TunerConfig};
pub use tuning::{Instrument, Tuning, TuningNote, TuningTable};

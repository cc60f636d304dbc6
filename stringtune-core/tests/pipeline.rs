//! End-to-end tick loop over replayed frames.

use std::f32::consts::PI;

use approx::assert_abs_diff_eq;
use stringtune_core::frame::DEFAULT_WINDOW_SIZE;
use stringtune_core::{
    AudioFrame, AudioSource, AutocorrelationMethod, PitchClass, ReplaySource, Tuner, TunerConfig,
};

const SAMPLE_RATE: u32 = 44_100;

fn sine(freq: f32, amplitude: f32) -> AudioFrame {
    let samples = (0..DEFAULT_WINDOW_SIZE)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect();
    AudioFrame::new(samples, SAMPLE_RATE).unwrap()
}

fn silence() -> AudioFrame {
    AudioFrame::new(vec![0.0; DEFAULT_WINDOW_SIZE], SAMPLE_RATE).unwrap()
}

fn started(frames: Vec<AudioFrame>, config: TunerConfig) -> Tuner<ReplaySource> {
    let mut tuner = Tuner::new(ReplaySource::new(frames), config);
    tuner.start().unwrap();
    tuner
}

#[test]
fn stable_string_builds_accuracy_history() {
    let frames = (0..6).map(|_| sine(110.0, 0.6)).collect();
    let mut tuner = started(frames, TunerConfig::default());

    let first = tuner.tick();
    assert!(first.is_active);
    assert_eq!(first.note, Some(PitchClass::A));
    assert_eq!(first.octave, 2);
    assert_eq!(first.detected_string_index, Some(1));
    // One tick is not enough to trust the detection.
    assert_eq!(tuner.accuracy_for(1), None);

    for _ in 0..5 {
        tuner.tick();
    }
    assert_eq!(tuner.history().len(), 5);

    let accuracy = tuner.accuracy_for(1).unwrap();
    assert!(accuracy < 10.0, "accuracy {accuracy}");
    assert_eq!(tuner.accuracies().len(), 6);
    assert_eq!(tuner.accuracies()[0], None);
}

#[test]
fn flickering_detection_is_not_recorded() {
    let frames = (0..6)
        .map(|i| if i % 2 == 0 { sine(110.0, 0.6) } else { sine(146.83, 0.6) })
        .collect();
    let mut tuner = started(frames, TunerConfig::default());

    let strings: Vec<_> = (0..6).map(|_| tuner.tick().detected_string_index).collect();
    assert_eq!(strings, vec![Some(1), Some(2), Some(1), Some(2), Some(1), Some(2)]);
    assert!(tuner.history().is_empty());
}

#[test]
fn silent_tick_reports_nothing_and_keeps_the_run() {
    let frames = vec![sine(82.41, 0.6), silence(), sine(82.41, 0.6)];
    let mut tuner = started(frames, TunerConfig::default());

    tuner.tick();
    let quiet = tuner.tick();
    assert!(quiet.is_active);
    assert_eq!(quiet.frequency, 0.0);
    assert_eq!(quiet.note_name(), "");
    assert_eq!(quiet.detected_string_index, None);

    let again = tuner.tick();
    assert_eq!(again.detected_string_index, Some(0));
    assert_eq!(tuner.history().len(), 1);
}

#[test]
fn unmatched_pitch_still_resolves_note() {
    // A3 sits a whole tone from both G3 and B3.
    let mut tuner = started(vec![sine(220.0, 0.6)], TunerConfig::default());

    let result = tuner.tick();
    assert_eq!(result.note, Some(PitchClass::A));
    assert_eq!(result.octave, 3);
    assert_eq!(result.detected_string_index, None);
    assert_eq!(result.cents_from_string, None);
}

#[test]
fn sensitivity_lifts_quiet_input_over_the_gate() {
    let frames = vec![sine(196.0, 0.004), sine(196.0, 0.004)];
    let mut tuner = started(frames, TunerConfig::default());

    assert!(!tuner.tick().has_pitch());

    tuner.set_sensitivity(5.0);
    let result = tuner.tick();
    assert_eq!(result.detected_string_index, Some(3));
    assert!(result.confidence > 0.0);
}

#[test]
fn noise_threshold_change_applies_next_tick() {
    let frames = vec![sine(246.94, 0.05), sine(246.94, 0.05)];
    let mut tuner = started(frames, TunerConfig::default());

    assert_eq!(tuner.tick().detected_string_index, Some(4));
    tuner.set_noise_threshold(0.1);
    assert!(!tuner.tick().has_pitch());
}

#[test]
fn fft_autocorrelation_matches_direct() {
    let config = TunerConfig {
        autocorrelation: AutocorrelationMethod::Fft,
        ..TunerConfig::default()
    };
    let mut fft = started(vec![sine(329.63, 0.6)], config);
    let mut direct = started(vec![sine(329.63, 0.6)], TunerConfig::default());

    let a = fft.tick();
    let b = direct.tick();
    assert_abs_diff_eq!(a.frequency, b.frequency, epsilon = 0.02);
    assert_eq!(a.detected_string_index, Some(5));
}

#[test]
fn stop_releases_source_and_goes_inactive() {
    let frames = (0..3).map(|_| sine(110.0, 0.6)).collect();
    let mut tuner = started(frames, TunerConfig::default());
    tuner.tick();
    tuner.tick();
    assert_eq!(tuner.history().len(), 1);

    tuner.stop();
    assert!(!tuner.is_running());
    assert!(!tuner.source().is_running());

    let result = tuner.tick();
    assert!(!result.is_active);
    assert!(!result.has_pitch());
    // Samples survive a restart; the stability run does not.
    assert_eq!(tuner.history().len(), 1);
    assert_eq!(tuner.history().gate().last(), None);
}

#[test]
fn custom_tuning_drives_matching() {
    let config = TunerConfig {
        tuning_id: "open-g".into(),
        ..TunerConfig::default()
    };
    let mut table = stringtune_core::TuningTable::new();
    table
        .import_json(
            r#"[{ "id": "open-g", "name": "Open G", "instrument": "guitar",
                 "notes": [
                   { "note": "D", "octave": 2, "frequency": 73.42 },
                   { "note": "G", "octave": 2, "frequency": 98.00 },
                   { "note": "D", "octave": 3, "frequency": 146.83 },
                   { "note": "G", "octave": 3, "frequency": 196.00 },
                   { "note": "B", "octave": 3, "frequency": 246.94 },
                   { "note": "D", "octave": 4, "frequency": 293.66 }
                 ] }]"#,
        )
        .unwrap();

    let mut tuner = Tuner::with_tunings(ReplaySource::new([sine(293.66, 0.6)]), config, table);
    tuner.start().unwrap();
    assert_eq!(tuner.tuning().id, "open-g");
    assert_eq!(tuner.tick().detected_string_index, Some(5));

    assert!(tuner.remove_custom_tuning("open-g").is_some());
    assert_eq!(tuner.tuning().id, "standard-e");
}

#[test]
fn device_change_restarts_running_tuner() {
    let frames = (0..4).map(|_| sine(110.0, 0.6)).collect();
    let mut tuner = started(frames, TunerConfig::default());
    tuner.tick();
    tuner.tick();
    assert_eq!(tuner.history().len(), 1);
    assert_eq!(tuner.history().gate().last(), Some(1));

    tuner.set_device(Some("USB Audio".into())).unwrap();

    assert!(tuner.is_running());
    assert!(tuner.source().is_running());
    assert_eq!(tuner.config().device_id.as_deref(), Some("USB Audio"));
    assert_eq!(tuner.history().gate().last(), None);
    assert_eq!(tuner.history().len(), 1);

    // The run starts over after the restart.
    tuner.tick();
    assert_eq!(tuner.history().len(), 1);
    tuner.tick();
    assert_eq!(tuner.history().len(), 2);
}

#[test]
fn device_change_while_stopped_stays_stopped() {
    let mut tuner = Tuner::new(ReplaySource::new([]), TunerConfig::default());
    tuner.set_device(None).unwrap();
    assert!(!tuner.is_running());
    assert!(!tuner.source().is_running());
    assert_eq!(tuner.config().device_id, None);
}

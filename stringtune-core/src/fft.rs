//! # Fast Fourier Transform (FFT) Module
//!
//! FFT-backed autocorrelation for the pitch estimator. By the
//! Wiener–Khinchin theorem the autocorrelation of a signal is the inverse
//! transform of its power spectrum, which turns the O(n²) lag sum into
//! O(n log n) work.
//!
//! The signal is zero-padded to at least twice its length so the circular
//! correlation computed by the FFT equals the linear sum
//! `c[i] = Σ x[j]·x[j+i]` used by the direct method.

use rustfft::{FftPlanner, num_complex::Complex};

/// Computes autocorrelation sequences through RustFFT.
///
/// The planner caches FFT plans between calls, so a single instance should
/// be kept for the lifetime of the estimator.
pub struct FftAutocorrelator {
    planner: FftPlanner<f64>,
    buffer: Vec<Complex<f64>>,
}

impl FftAutocorrelator {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            buffer: Vec::new(),
        }
    }

    /// Returns `c[0..signal.len()]`, the unnormalized autocorrelation at
    /// every lag of `signal`.
    pub fn autocorrelate(&mut self, signal: &[f32]) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }

        let fft_len = (2 * n).next_power_of_two();
        let forward = self.planner.plan_fft_forward(fft_len);
        let inverse = self.planner.plan_fft_inverse(fft_len);

        self.buffer.clear();
        self.buffer
            .extend(signal.iter().map(|&s| Complex { re: s as f64, im: 0.0 }));
        self.buffer.resize(fft_len, Complex { re: 0.0, im: 0.0 });

        forward.process(&mut self.buffer);
        for bin in self.buffer.iter_mut() {
            // Power spectrum: X·conj(X)
            *bin = Complex { re: bin.norm_sqr(), im: 0.0 };
        }
        inverse.process(&mut self.buffer);

        // RustFFT leaves the inverse unnormalized.
        let scale = 1.0 / fft_len as f64;
        self.buffer
            .iter()
            .take(n)
            .map(|c| c.re * scale)
            .collect()
    }
}

impl Default for FftAutocorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FftAutocorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftAutocorrelator")
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(signal: &[f32]) -> Vec<f64> {
        (0..signal.len())
            .map(|lag| {
                signal[..signal.len() - lag]
                    .iter()
                    .zip(&signal[lag..])
                    .map(|(&a, &b)| a as f64 * b as f64)
                    .sum()
            })
            .collect()
    }

    #[test]
    fn test_matches_direct_sum() {
        let signal: Vec<f32> = (0..300)
            .map(|i| (i as f32 * 0.13).sin() + 0.3 * (i as f32 * 0.41).cos())
            .collect();

        let expected = direct(&signal);
        let actual = FftAutocorrelator::new().autocorrelate(&signal);

        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-6, "fft {a} vs direct {e}");
        }
    }

    #[test]
    fn test_empty_signal() {
        assert!(FftAutocorrelator::new().autocorrelate(&[]).is_empty());
    }
}

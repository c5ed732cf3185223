//! Analysis tap: the last few thousand master samples, for meters and
//! spectrum displays. Reading never touches the audio path.

use std::f32::consts::PI;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

pub const FFT_SIZE: usize = 2048;

/// Floor reported for empty bins, in dB.
const MIN_DB: f32 = -120.0;

#[derive(Debug, Clone)]
pub struct AnalyserTap {
    ring: Vec<f32>,
    write: usize,
}

impl Default for AnalyserTap {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyserTap {
    pub fn new() -> Self {
        AnalyserTap {
            ring: vec![0.0; FFT_SIZE],
            write: 0,
        }
    }

    /// Feed a stereo block; the tap stores the mono downmix.
    pub(crate) fn push_block(&mut self, left: &[f32], right: &[f32]) {
        for (l, r) in left.iter().zip(right) {
            self.ring[self.write] = 0.5 * (l + r);
            self.write = (self.write + 1) % FFT_SIZE;
        }
    }

    pub fn fft_size(&self) -> usize {
        FFT_SIZE
    }

    /// Number of bins returned by [`frequency_data_db`](Self::frequency_data_db).
    pub fn frequency_bin_count(&self) -> usize {
        FFT_SIZE / 2
    }

    /// The most recent `FFT_SIZE` samples, oldest first.
    pub fn time_domain_data(&self) -> Vec<f32> {
        let (newer, older) = self.ring.split_at(self.write);
        older.iter().chain(newer).copied().collect()
    }

    /// Blackman-windowed magnitude spectrum in dBFS, `FFT_SIZE / 2` bins.
    pub fn frequency_data_db(&self) -> Vec<f32> {
        let n = FFT_SIZE as f32;
        let mut bins: Vec<Complex<f32>> = self
            .time_domain_data()
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let x = i as f32 / n;
                let w = 0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos();
                Complex::new(s * w, 0.0)
            })
            .collect();

        FftPlanner::new()
            .plan_fft_forward(FFT_SIZE)
            .process(&mut bins);

        bins[..FFT_SIZE / 2]
            .iter()
            .map(|c| {
                let magnitude = c.norm() / n;
                if magnitude > 0.0 {
                    (20.0 * magnitude.log10()).max(MIN_DB)
                } else {
                    MIN_DB
                }
            })
            .collect()
    }

    /// Root mean square of the window.
    pub fn rms(&self) -> f32 {
        let sum: f32 = self.ring.iter().map(|s| s * s).sum();
        (sum / FFT_SIZE as f32).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(freq: f32, sample_rate: f32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn time_domain_is_oldest_first() {
        let mut tap = AnalyserTap::new();
        let ramp: Vec<f32> = (0..FFT_SIZE + 10).map(|i| i as f32).collect();
        tap.push_block(&ramp, &ramp);

        let data = tap.time_domain_data();
        assert_eq!(data.len(), FFT_SIZE);
        assert_eq!(data[0], 10.0);
        assert_eq!(data[FFT_SIZE - 1], (FFT_SIZE + 9) as f32);
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let sample_rate = 48000.0;
        // Exactly on bin 64
        let freq = 64.0 * sample_rate / FFT_SIZE as f32;
        let s = sine(freq, sample_rate, FFT_SIZE);
        let mut tap = AnalyserTap::new();
        tap.push_block(&s, &s);

        let spectrum = tap.frequency_data_db();
        assert_eq!(spectrum.len(), tap.frequency_bin_count());
        assert_eq!(tap.frequency_bin_count() * 2, tap.fft_size());
        let peak = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 64);
        assert!(spectrum[400] < spectrum[64] - 60.0);
    }

    #[test]
    fn rms_of_full_scale_sine() {
        let s = sine(1000.0, 48000.0, FFT_SIZE);
        let mut tap = AnalyserTap::new();
        tap.push_block(&s, &s);
        assert_abs_diff_eq!(tap.rms(), std::f32::consts::FRAC_1_SQRT_2, epsilon = 0.01);
    }

    #[test]
    fn silence_reports_the_floor() {
        let tap = AnalyserTap::new();
        assert!(tap.frequency_data_db().iter().all(|&db| db == MIN_DB));
        assert_eq!(tap.rms(), 0.0);
    }
}

//! Helpers for drawing a clip: a peak-per-bar waveform and the playhead.

use crate::dsp::sampler::AudioBuffer;

/// Absolute peak of channel 0 for each of `bars` equal slices of the clip.
///
/// Slices past the end of a short clip are zero.
pub fn waveform_peaks(buffer: &AudioBuffer, bars: usize) -> Vec<f32> {
    let Some(samples) = buffer.channel_data(0) else {
        return vec![0.0; bars];
    };
    if bars == 0 {
        return Vec::new();
    }

    let per_bar = samples.len().div_ceil(bars).max(1);
    (0..bars)
        .map(|bar| {
            let start = (bar * per_bar).min(samples.len());
            let end = (start + per_bar).min(samples.len());
            samples[start..end]
                .iter()
                .fold(0.0f32, |peak, s| peak.max(s.abs()))
        })
        .collect()
}

/// Playhead position as a fraction of the clip, in [0, 1].
pub fn playhead_progress(current_time: f64, duration: f64) -> f64 {
    if duration.is_nan() || duration <= 0.0 || !current_time.is_finite() {
        return 0.0;
    }
    (current_time / duration).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peaks_per_bar() {
        let samples = vec![0.1, -0.5, 0.2, 0.3, -0.9, 0.0, 0.4, 0.4];
        let buffer = AudioBuffer::new(vec![samples], 8000);
        assert_eq!(waveform_peaks(&buffer, 4), vec![0.5, 0.3, 0.9, 0.4]);
        assert_eq!(waveform_peaks(&buffer, 1), vec![0.9]);
        assert!(waveform_peaks(&buffer, 0).is_empty());
    }

    #[test]
    fn more_bars_than_samples_pads_with_silence() {
        let buffer = AudioBuffer::new(vec![vec![0.5, -0.25]], 8000);
        assert_eq!(waveform_peaks(&buffer, 4), vec![0.5, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(playhead_progress(1.0, 4.0), 0.25);
        assert_eq!(playhead_progress(5.0, 4.0), 1.0);
        assert_eq!(playhead_progress(-1.0, 4.0), 0.0);
        assert_eq!(playhead_progress(1.0, 0.0), 0.0);
        assert_eq!(playhead_progress(f64::NAN, 4.0), 0.0);
    }
}

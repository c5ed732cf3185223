//! Compressor: dynamics processing for clip leveling and bus glue.
//!
//! Implements a feed-forward compressor with threshold, ratio, knee,
//! attack, and release parameters matching the WebAudio DynamicsCompressorNode.

use crate::config::CompressorConfig;

/// A stereo-linked dynamics compressor.
#[derive(Debug, Clone)]
pub struct Compressor {
    /// Threshold in dB (typical: -50 to 0).
    threshold: f64,
    /// Compression ratio (e.g., 4.0 = 4:1 compression).
    ratio: f64,
    /// Knee width in dB (0 = hard knee, higher = softer transition).
    knee: f64,
    /// Makeup gain in dB.
    makeup_gain: f64,

    attack_coef: f64,
    release_coef: f64,

    // Internal state
    envelope: f64, // Current envelope level (linear)
}

impl Compressor {
    pub fn new(sample_rate: f64, config: &CompressorConfig) -> Self {
        let attack = config.attack.clamp(0.0001, 1.0);
        let release = config.release.clamp(0.001, 5.0);
        Self {
            threshold: config.threshold.clamp(-100.0, 0.0),
            ratio: config.ratio.clamp(1.0, 20.0),
            knee: config.knee.clamp(0.0, 40.0),
            makeup_gain: config.makeup_gain,
            attack_coef: (-1.0 / (attack * sample_rate)).exp(),
            release_coef: (-1.0 / (release * sample_rate)).exp(),
            envelope: 0.0,
        }
    }

    /// Convert linear amplitude to dB.
    #[inline]
    fn linear_to_db(linear: f64) -> f64 {
        if linear <= 0.0 {
            -120.0
        } else {
            20.0 * linear.log10()
        }
    }

    /// Convert dB to linear amplitude.
    #[inline]
    fn db_to_linear(db: f64) -> f64 {
        10.0_f64.powf(db / 20.0)
    }

    /// Compute gain reduction for a given input level (in dB).
    #[inline]
    fn compute_gain(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;

        if self.knee <= 0.0 {
            if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            }
        } else {
            let half_knee = self.knee / 2.0;
            let knee_start = self.threshold - half_knee;
            let knee_end = self.threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (self.threshold - input_db) * slope
            } else {
                // Quadratic interpolation through the knee
                let x = input_db - knee_start;
                -slope * x * x / (2.0 * self.knee)
            }
        }
    }

    /// Process a stereo sample pair.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        // Peak of L/R drives both channels
        let input_level = left.abs().max(right.abs()) as f64;

        let coef = if input_level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * input_level;

        let gain_reduction_db = self.compute_gain(Self::linear_to_db(self.envelope));
        let gain = Self::db_to_linear(gain_reduction_db + self.makeup_gain) as f32;

        (left * gain, right * gain)
    }

    /// Process a block of stereo audio in-place.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    /// Reset the compressor state.
    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    /// Current gain reduction in dB (for metering).
    pub fn gain_reduction(&self) -> f64 {
        -self.compute_gain(Self::linear_to_db(self.envelope))
    }
}

//! Biquad filter: matches WebAudio BiquadFilterNode coefficients for the
//! filter types the clip chain uses.

use std::f64::consts::PI;

/// Filter type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    Highpass,
    /// Shelf below `frequency`, gain from `gain_db`.
    LowShelf,
    /// Shelf above `frequency`, gain from `gain_db`.
    HighShelf,
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson),
/// shelves with slope S = 1 as WebAudio does.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: FilterType,
    pub frequency: f64,
    pub q: f64,
    pub gain_db: f64, // shelves only

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: FilterType, frequency: f64, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency,
            q: 0.707, // Butterworth
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        let frequency = self.frequency.clamp(1.0, nyquist * 0.999);
        let w0 = 2.0 * PI * frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::Highpass => {
                let alpha = sin_w0 / (2.0 * self.q);
                let b0 = (1.0 + cos_w0) / 2.0;
                let b1 = -(1.0 + cos_w0);
                let b2 = b0;
                let a0 = 1.0 + alpha;
                let a1 = -2.0 * cos_w0;
                let a2 = 1.0 - alpha;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::LowShelf => {
                let a = 10.0_f64.powf(self.gain_db / 40.0);
                let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + k);
                let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
                let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - k);
                let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + k;
                let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
                let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - k;
                (b0, b1, b2, a0, a1, a2)
            }
            FilterType::HighShelf => {
                let a = 10.0_f64.powf(self.gain_db / 40.0);
                let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + k);
                let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
                let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - k);
                let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + k;
                let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
                let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - k;
                (b0, b1, b2, a0, a1, a2)
            }
        };

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Set shelf gain and mark coefficients dirty. Filter state is kept so the
    /// change is click-free.
    pub fn set_gain_db(&mut self, gain_db: f64) {
        if self.gain_db != gain_db {
            self.gain_db = gain_db;
            self.dirty = true;
        }
    }
}

/// The same biquad applied independently to left and right.
#[derive(Debug, Clone)]
pub struct StereoBiquad {
    left: BiquadFilter,
    right: BiquadFilter,
}

impl StereoBiquad {
    pub fn new(filter_type: FilterType, frequency: f64, sample_rate: f64) -> Self {
        let filter = BiquadFilter::new(filter_type, frequency, sample_rate);
        StereoBiquad {
            left: filter.clone(),
            right: filter,
        }
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        self.left.set_gain_db(gain_db);
        self.right.set_gain_db(gain_db);
    }

    pub fn gain_db(&self) -> f64 {
        self.left.gain_db
    }

    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for s in left.iter_mut() {
            *s = self.left.process(*s as f64) as f32;
        }
        for s in right.iter_mut() {
            *s = self.right.process(*s as f64) as f32;
        }
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

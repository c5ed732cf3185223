//! Reverb effect: convolution with a synthesized room.
//!
//! The impulse response is exponentially decaying stereo noise generated once
//! from a seed. Convolution is uniformly partitioned overlap-save: the IR is
//! cut into blocks of `B` frames, each transformed once with a `2B` FFT, and
//! every incoming block is multiplied against a delay line of past input
//! spectra. Latency is one block.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::config::ReverbConfig;

/// Decay exponent giving -60 dB at the end of the response.
const DECAY_60DB: f64 = 6.9;

/// Generate `[left, right]` impulse responses of decaying noise, each scaled
/// to unit energy so the wet level does not depend on length or sample rate.
pub fn synth_impulse_response(sample_rate: f64, duration: f64, seed: u64) -> [Vec<f32>; 2] {
    let duration = duration.max(1.0 / sample_rate);
    let len = ((sample_rate * duration).round() as usize).max(1);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut channel = || -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate;
                let envelope = (-DECAY_60DB * t / duration).exp();
                rng.gen_range(-1.0f32..1.0) * envelope as f32
            })
            .collect()
    };
    let mut left = channel();
    let mut right = channel();
    normalize_energy(&mut left);
    normalize_energy(&mut right);
    [left, right]
}

fn normalize_energy(ir: &mut [f32]) {
    let energy: f64 = ir.iter().map(|&h| (h as f64) * (h as f64)).sum();
    if energy > 0.0 {
        let scale = (1.0 / energy.sqrt()) as f32;
        ir.iter_mut().for_each(|h| *h *= scale);
    }
}

/// Single-channel uniformly partitioned convolver.
struct PartitionedConvolver {
    block: usize,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    /// IR partition spectra, `2 * block` bins each.
    partitions: Vec<Vec<Complex<f32>>>,
    /// Ring of past input spectra; `head` is the newest.
    history: Vec<Vec<Complex<f32>>>,
    head: usize,
    /// Last two input blocks, time domain.
    window: Vec<f32>,
    input: Vec<f32>,
    output: Vec<f32>,
    pos: usize,
    spectrum: Vec<Complex<f32>>,
    accum: Vec<Complex<f32>>,
}

impl PartitionedConvolver {
    fn new(impulse: &[f32], block: usize, planner: &mut FftPlanner<f32>) -> Self {
        let size = block * 2;
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);

        let partitions: Vec<Vec<Complex<f32>>> = impulse
            .chunks(block)
            .map(|chunk| {
                let mut bins = vec![Complex::new(0.0, 0.0); size];
                for (bin, &tap) in bins.iter_mut().zip(chunk) {
                    bin.re = tap;
                }
                fft.process(&mut bins);
                bins
            })
            .collect();
        let count = partitions.len().max(1);

        PartitionedConvolver {
            block,
            fft,
            ifft,
            partitions,
            history: vec![vec![Complex::new(0.0, 0.0); size]; count],
            head: 0,
            window: vec![0.0; size],
            input: vec![0.0; block],
            output: vec![0.0; block],
            pos: 0,
            spectrum: vec![Complex::new(0.0, 0.0); size],
            accum: vec![Complex::new(0.0, 0.0); size],
        }
    }

    #[inline]
    fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.output[self.pos];
        self.input[self.pos] = x;
        self.pos += 1;
        if self.pos == self.block {
            self.pos = 0;
            self.process_block();
        }
        y
    }

    fn process_block(&mut self) {
        let block = self.block;
        self.window.copy_within(block.., 0);
        self.window[block..].copy_from_slice(&self.input);

        for (bin, &s) in self.spectrum.iter_mut().zip(&self.window) {
            *bin = Complex::new(s, 0.0);
        }
        self.fft.process(&mut self.spectrum);

        let count = self.history.len();
        self.head = (self.head + count - 1) % count;
        self.history[self.head].copy_from_slice(&self.spectrum);

        self.accum.fill(Complex::new(0.0, 0.0));
        for (p, partition) in self.partitions.iter().enumerate() {
            let past = &self.history[(self.head + p) % count];
            for ((acc, x), h) in self.accum.iter_mut().zip(past).zip(partition) {
                *acc += x * h;
            }
        }
        self.ifft.process(&mut self.accum);

        // Second half is the valid linear convolution
        let scale = 1.0 / (2 * block) as f32;
        for (out, bin) in self.output.iter_mut().zip(&self.accum[block..]) {
            *out = bin.re * scale;
        }
    }

    fn reset(&mut self) {
        for spectrum in &mut self.history {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.window.fill(0.0);
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.pos = 0;
    }
}

/// Stereo convolution reverb, 100% wet.
pub struct ConvolutionReverb {
    left: PartitionedConvolver,
    right: PartitionedConvolver,
}

impl std::fmt::Debug for ConvolutionReverb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvolutionReverb")
            .field("block", &self.left.block)
            .field("partitions", &self.left.partitions.len())
            .finish()
    }
}

impl ConvolutionReverb {
    pub fn new(sample_rate: f64, config: &ReverbConfig) -> Self {
        let [ir_left, ir_right] =
            synth_impulse_response(sample_rate, config.duration, config.seed);
        Self::with_impulse_response(&ir_left, &ir_right, config.partition_size)
    }

    pub fn with_impulse_response(left: &[f32], right: &[f32], block: usize) -> Self {
        let block = block.max(1);
        let mut planner = FftPlanner::new();
        ConvolutionReverb {
            left: PartitionedConvolver::new(left, block, &mut planner),
            right: PartitionedConvolver::new(right, block, &mut planner),
        }
    }

    /// Latency in frames.
    pub fn latency(&self) -> usize {
        self.left.block
    }

    /// Process a stereo sample pair, returning the wet signal.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            self.left.process_sample(left),
            self.right.process_sample(right),
        )
    }

    /// Convolve a block in place.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    pub fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_reproduces_the_response_after_one_block() {
        let ir_l: Vec<f32> = (0..40).map(|i| 1.0 / (i as f32 + 1.0)).collect();
        let ir_r: Vec<f32> = (0..40).map(|i| -(i as f32) / 40.0).collect();
        let mut reverb = ConvolutionReverb::with_impulse_response(&ir_l, &ir_r, 16);

        let mut out = Vec::new();
        for i in 0..100 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            out.push(reverb.process(x, x));
        }

        for (i, (l, r)) in out.iter().enumerate() {
            let (want_l, want_r) = if (16..56).contains(&i) {
                (ir_l[i - 16], ir_r[i - 16])
            } else {
                (0.0, 0.0)
            };
            assert!((l - want_l).abs() < 1e-4, "left[{i}] = {l}, want {want_l}");
            assert!((r - want_r).abs() < 1e-4, "right[{i}] = {r}, want {want_r}");
        }
    }

    #[test]
    fn convolution_is_linear_in_time() {
        let ir: Vec<f32> = (0..70).map(|i| ((i * 13) % 7) as f32 / 7.0 - 0.5).collect();
        let mut reverb = ConvolutionReverb::with_impulse_response(&ir, &ir, 32);
        let input: Vec<f32> = (0..200).map(|i| ((i * 31) % 11) as f32 / 11.0 - 0.5).collect();

        let wet: Vec<f32> = input.iter().map(|&x| reverb.process(x, x).0).collect();
        for n in 32..200 {
            let m = n - 32;
            let expected: f32 = (0..=m)
                .filter(|&k| m - k < ir.len())
                .map(|k| input[k] * ir[m - k])
                .sum();
            assert!(
                (wet[n] - expected).abs() < 1e-3,
                "sample {n}: {} vs {expected}",
                wet[n]
            );
        }
    }

    #[test]
    fn silence_in_silence_out() {
        let mut reverb = ConvolutionReverb::new(48000.0, &ReverbConfig::default());
        for _ in 0..2048 {
            let (l, r) = reverb.process(0.0, 0.0);
            assert_eq!(l, 0.0);
            assert_eq!(r, 0.0);
        }
    }

    #[test]
    fn synthesized_response_decays_and_is_seeded() {
        let [left, right] = synth_impulse_response(48000.0, 0.5, 7);
        assert_eq!(left.len(), 24000);
        assert_ne!(left, right, "channels should be decorrelated");

        let energy = |s: &[f32]| s.iter().map(|x| x * x).sum::<f32>();
        let head = energy(&left[..2400]);
        let tail = energy(&left[21600..]);
        assert!(tail < head * 0.01, "tail {tail} should be far below head {head}");

        let [again, _] = synth_impulse_response(48000.0, 0.5, 7);
        assert_eq!(left, again);
    }

    #[test]
    fn wet_level_is_independent_of_sample_rate() {
        for sample_rate in [44100.0, 48000.0, 96000.0] {
            let [left, right] = synth_impulse_response(sample_rate, 0.5, 11);
            for ir in [&left, &right] {
                let energy: f64 = ir.iter().map(|&h| (h as f64) * (h as f64)).sum();
                assert!((energy - 1.0).abs() < 1e-4, "{sample_rate} Hz energy {energy}");
            }

            let config = ReverbConfig {
                seed: 11,
                ..ReverbConfig::default()
            };
            let mut reverb = ConvolutionReverb::new(sample_rate, &config);
            let mut rng = StdRng::seed_from_u64(3);
            let frames = sample_rate as usize * 2;
            let mut dry = 0.0f64;
            let mut wet = 0.0f64;
            for i in 0..frames {
                let x = rng.gen_range(-0.5f32..0.5);
                let (l, _) = reverb.process(x, x);
                if i >= frames / 2 {
                    dry += (x as f64) * (x as f64);
                    wet += (l as f64) * (l as f64);
                }
            }
            let gain = (wet / dry).sqrt();
            assert!((0.75..1.25).contains(&gain), "{sample_rate} Hz noise gain {gain}");
        }
    }

    #[test]
    fn reset_clears_the_tail() {
        let mut reverb = ConvolutionReverb::new(48000.0, &ReverbConfig::default());
        for _ in 0..1000 {
            reverb.process(0.5, 0.5);
        }
        reverb.reset();
        for _ in 0..1000 {
            assert_eq!(reverb.process(0.0, 0.0), (0.0, 0.0));
        }
    }
}

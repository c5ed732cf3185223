//! Mix bus: sums every clip, glues it, adds the shared reverb, and applies
//! the master gain.
//!
//! ```text
//! mix input ──► glue compressor ──────────────┐
//!                                            ├──► master gain ──► output / taps
//! reverb in ──► convolution ──► return gain ──┘
//! ```

use crate::config::EngineConfig;

use super::analyser::AnalyserTap;
use super::compressor::Compressor;
use super::reverb::ConvolutionReverb;

/// A planar stereo scratch buffer.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    /// Zero the buffer and size it to `frames`.
    pub fn clear(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Accumulate `gain * (left, right)`.
    pub fn mix_in(&mut self, left: &[f32], right: &[f32], gain: f32) {
        for (acc, s) in self.left.iter_mut().zip(left) {
            *acc += s * gain;
        }
        for (acc, s) in self.right.iter_mut().zip(right) {
            *acc += s * gain;
        }
    }
}

/// The engine's shared output stage. Built once per engine.
#[derive(Debug)]
pub struct MixBus {
    mix: StereoBuffer,
    send: StereoBuffer,
    glue: Compressor,
    reverb: ConvolutionReverb,
    reverb_return: f32,
    /// Gain applied at the end of the last block.
    master_gain: f32,
    master_target: f32,
    analyser: AnalyserTap,
}

impl MixBus {
    pub fn new(sample_rate: f64, config: &EngineConfig) -> Self {
        log::debug!(
            "building mix bus at {sample_rate} Hz ({}s reverb)",
            config.reverb.duration
        );
        let master = config.master_volume.clamp(0.0, 2.0) as f32;
        MixBus {
            mix: StereoBuffer::default(),
            send: StereoBuffer::default(),
            glue: Compressor::new(sample_rate, &config.glue_compressor),
            reverb: ConvolutionReverb::new(sample_rate, &config.reverb),
            reverb_return: config.reverb.return_gain as f32,
            master_gain: master,
            master_target: master,
            analyser: AnalyserTap::new(),
        }
    }

    /// Zero both summing inputs for a block of `frames`.
    pub fn begin_block(&mut self, frames: usize) {
        self.mix.clear(frames);
        self.send.clear(frames);
    }

    /// The mix input and the reverb input, in that order.
    pub fn inputs(&mut self) -> (&mut StereoBuffer, &mut StereoBuffer) {
        (&mut self.mix, &mut self.send)
    }

    /// Run the bus over the summed inputs and write the master output.
    /// Output is limited to [-1, 1]; the analysis tap sees the same signal.
    pub fn finish_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len()).min(self.mix.frames());
        self.glue
            .process_block(&mut self.mix.left[..frames], &mut self.mix.right[..frames]);
        self.reverb
            .process_block(&mut self.send.left[..frames], &mut self.send.right[..frames]);

        let start = self.master_gain;
        let step = if frames > 0 {
            (self.master_target - start) / frames as f32
        } else {
            0.0
        };
        for i in 0..frames {
            let gain = start + step * (i + 1) as f32;
            let l = self.mix.left[i] + self.send.left[i] * self.reverb_return;
            let r = self.mix.right[i] + self.send.right[i] * self.reverb_return;
            left[i] = (l * gain).clamp(-1.0, 1.0);
            right[i] = (r * gain).clamp(-1.0, 1.0);
        }
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);
        if frames > 0 {
            self.master_gain = self.master_target;
        }

        self.analyser.push_block(&left[..frames], &right[..frames]);
    }

    /// Set the master gain, clamped to [0, 2]. Takes effect over the next block.
    pub fn set_master_volume(&mut self, volume: f64) {
        self.master_target = volume.clamp(0.0, 2.0) as f32;
    }

    pub fn master_volume(&self) -> f64 {
        self.master_target as f64
    }

    pub fn analyser(&self) -> &AnalyserTap {
        &self.analyser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unity_bus() -> MixBus {
        let config = EngineConfig {
            master_volume: 1.0,
            ..EngineConfig::default()
        };
        MixBus::new(48000.0, &config)
    }

    fn run(bus: &mut MixBus, level: f32, frames: usize) -> (Vec<f32>, Vec<f32>) {
        bus.begin_block(frames);
        let input = vec![level; frames];
        let (mix, _) = bus.inputs();
        mix.mix_in(&input, &input, 1.0);
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        bus.finish_block(&mut l, &mut r);
        (l, r)
    }

    #[test]
    fn quiet_signal_passes_once() {
        let mut bus = unity_bus();
        let (l, r) = run(&mut bus, 0.1, 512);
        // Below the glue knee and with no send, the bus is a wire
        for (a, b) in l.iter().zip(&r) {
            assert_abs_diff_eq!(*a, 0.1, epsilon = 1e-6);
            assert_abs_diff_eq!(*b, 0.1, epsilon = 1e-6);
        }
    }

    #[test]
    fn output_is_hard_limited() {
        let mut bus = unity_bus();
        bus.set_master_volume(2.0);
        let (_, _) = run(&mut bus, 1.0, 128);
        let (l, _) = run(&mut bus, 10.0, 128);
        assert!(l.iter().all(|s| s.abs() <= 1.0));
        assert_eq!(l[127], 1.0);
    }

    #[test]
    fn master_volume_ramps_over_one_block() {
        let mut bus = unity_bus();
        bus.set_master_volume(0.0);
        let (l, _) = run(&mut bus, 0.1, 100);
        assert!(l[0] > 0.09, "ramp should start near the old gain, got {}", l[0]);
        assert_abs_diff_eq!(l[99], 0.0, epsilon = 1e-6);

        let (l, _) = run(&mut bus, 0.1, 100);
        assert!(l.iter().all(|&s| s == 0.0));
        assert_eq!(bus.master_volume(), 0.0);
    }

    #[test]
    fn master_volume_is_clamped() {
        let mut bus = unity_bus();
        bus.set_master_volume(5.0);
        assert_eq!(bus.master_volume(), 2.0);
        bus.set_master_volume(-1.0);
        assert_eq!(bus.master_volume(), 0.0);
    }

    #[test]
    fn reverb_send_returns_a_delayed_tail() {
        let mut bus = unity_bus();
        let frames = 2048;
        bus.begin_block(frames);
        let mut impulse = vec![0.0; frames];
        impulse[0] = 1.0;
        let (_, send) = bus.inputs();
        send.mix_in(&impulse, &impulse, 1.0);
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        bus.finish_block(&mut l, &mut r);

        // Nothing before the convolution latency, a tail after it
        assert!(l[..256].iter().all(|&s| s == 0.0));
        assert!(l[256..].iter().any(|&s| s.abs() > 1e-3));
    }

    #[test]
    fn analyser_sees_the_master_output() {
        let mut bus = unity_bus();
        run(&mut bus, 0.1, 2048);
        assert_abs_diff_eq!(bus.analyser().rms(), 0.1, epsilon = 1e-4);
    }
}

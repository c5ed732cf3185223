//! Clip buffers and looping playback voices.
//!
//! A voice reads its buffer with linear interpolation at a fractional step,
//! which covers both sample-rate conversion and playback-rate changes.

use std::sync::Arc;

/// Decoded audio: planar `f32` channels at the clip's native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Build from planar channels. Channels are truncated to the shortest one.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(frames);
        }
        AudioBuffer {
            channels,
            sample_rate,
        }
    }

    /// Create from interleaved 16-bit signed PCM.
    pub fn from_interleaved_i16(pcm: &[i16], channel_count: usize, sample_rate: u32) -> Self {
        let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        Self::from_interleaved_f32(&samples, channel_count, sample_rate)
    }

    /// Create from interleaved f32 samples.
    pub fn from_interleaved_f32(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        let channel_count = channel_count.max(1);
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        AudioBuffer {
            channels,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames.
    pub fn length(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.length() as f64 / self.sample_rate as f64
    }

    pub fn channel_data(&self, channel: usize) -> Option<&[f32]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    /// Read one channel at a fractional frame position, wrapping at the end
    /// so the last frame interpolates towards the first.
    pub fn read_looped(&self, channel: usize, position: f64) -> f32 {
        let Some(data) = self.channels.get(channel) else {
            return 0.0;
        };
        let len = data.len();
        if len == 0 || !position.is_finite() || position < 0.0 {
            return 0.0;
        }

        let idx = position as usize % len;
        let next = (idx + 1) % len;
        let frac = (position - position.floor()) as f32;
        data[idx] * (1.0 - frac) + data[next] * frac
    }
}

/// A playing, looping voice over a shared buffer.
///
/// Dropping the voice is the equivalent of stopping and disconnecting a
/// buffer source node.
#[derive(Debug, Clone)]
pub struct ClipVoice {
    buffer: Arc<AudioBuffer>,
    /// Read position in buffer frames.
    position: f64,
}

impl ClipVoice {
    /// Start at `offset` seconds into the buffer.
    pub fn new(buffer: Arc<AudioBuffer>, offset: f64) -> Self {
        let len = buffer.length() as f64;
        let mut position = offset.max(0.0) * buffer.sample_rate() as f64;
        if len > 0.0 && position >= len {
            position %= len;
        }
        ClipVoice { buffer, position }
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    /// Current read position in seconds.
    pub fn position_seconds(&self) -> f64 {
        self.position / self.buffer.sample_rate().max(1) as f64
    }

    /// Fill `left`/`right` advancing `step` buffer frames per output frame.
    /// Mono clips are copied to both sides.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32], step: f64) {
        let len = self.buffer.length() as f64;
        if len == 0.0 {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }
        let stereo = self.buffer.number_of_channels() > 1;

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let sample_l = self.buffer.read_looped(0, self.position);
            *l = sample_l;
            *r = if stereo {
                self.buffer.read_looped(1, self.position)
            } else {
                sample_l
            };

            self.position += step;
            if self.position >= len {
                self.position %= len;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize, sample_rate: u32) -> Arc<AudioBuffer> {
        let data: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        Arc::new(AudioBuffer::new(vec![data], sample_rate))
    }

    #[test]
    fn interleaved_pcm_is_split_into_channels() {
        let pcm: Vec<i16> = vec![0, 16384, -16384, 32767];
        let buf = AudioBuffer::from_interleaved_i16(&pcm, 2, 44100);

        assert_eq!(buf.number_of_channels(), 2);
        assert_eq!(buf.length(), 2);
        let left = buf.channel_data(0).unwrap();
        let right = buf.channel_data(1).unwrap();
        assert!(left[0].abs() < 1e-6);
        assert!((right[0] - 0.5).abs() < 1e-3);
        assert!((left[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn duration_uses_native_rate() {
        let buf = AudioBuffer::new(vec![vec![0.0; 22050]], 44100);
        assert!((buf.duration() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ragged_channels_are_truncated() {
        let buf = AudioBuffer::new(vec![vec![0.0; 10], vec![0.0; 7]], 8000);
        assert_eq!(buf.length(), 7);
    }

    #[test]
    fn looped_read_interpolates_across_the_seam() {
        let buf = AudioBuffer::new(vec![vec![0.0, 1.0, 0.0, -1.0]], 44100);
        assert!((buf.read_looped(0, 0.5) - 0.5).abs() < 1e-6);
        assert!((buf.read_looped(0, 3.5) - (-0.5)).abs() < 1e-6);
        assert!((buf.read_looped(0, 5.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn voice_wraps_instead_of_finishing() {
        let mut voice = ClipVoice::new(ramp(100, 100), 0.0);
        let mut l = vec![0.0; 250];
        let mut r = vec![0.0; 250];
        voice.render(&mut l, &mut r, 1.0);

        assert_eq!(l[99], 99.0);
        assert_eq!(l[100], 0.0);
        assert_eq!(l[249], 49.0);
        assert_eq!(l, r);
        assert!((voice.position_seconds() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn voice_starts_at_offset() {
        let mut voice = ClipVoice::new(ramp(100, 100), 0.25);
        let mut l = [0.0; 1];
        let mut r = [0.0; 1];
        voice.render(&mut l, &mut r, 1.0);
        assert_eq!(l[0], 25.0);
    }

    #[test]
    fn double_step_reads_twice_as_fast() {
        let mut voice = ClipVoice::new(ramp(1000, 1000), 0.0);
        let mut l = vec![0.0; 100];
        let mut r = vec![0.0; 100];
        voice.render(&mut l, &mut r, 2.0);
        assert!((voice.position_seconds() - 0.2).abs() < 1e-9);
    }
}

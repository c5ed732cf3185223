//! Clip player: one decoded clip, one looping voice, one processing chain.
//!
//! Transport is a two-state machine (stopped or playing, with a paused
//! offset). Playing means a [`ClipVoice`] exists; there is never more than
//! one, and it is always dropped before a replacement is built. The reported
//! position comes from the [`Playhead`], not from the voice, so it is exact at
//! any point between render blocks.
//!
//! Chain: voice → high-pass → low shelf → high shelf → compressor →
//! `volume * trim` → mix input, plus a fixed send into the shared reverb.

use std::sync::Arc;

use crate::config::ClipChainConfig;
use crate::context::AudioContext;
use crate::decode::{ClipFile, decode_audio};
use crate::dsp::compressor::Compressor;
use crate::dsp::filter::{FilterType, StereoBiquad};
use crate::dsp::mixer::StereoBuffer;
use crate::dsp::sampler::{AudioBuffer, ClipVoice};
use crate::error::{EngineError, Result};
use crate::fetch::SourceFetcher;
use crate::playhead::{Playhead, wrap};

pub const MIN_PLAYBACK_RATE: f64 = 0.25;
pub const MAX_PLAYBACK_RATE: f64 = 4.0;
pub const MAX_VOLUME: f64 = 2.0;
pub const MAX_DETUNE_SEMITONES: f64 = 24.0;
pub const MAX_EQ_GAIN_DB: f64 = 18.0;

/// Loudness trim from the RMS of the first `trim_window` seconds across all
/// channels. Silent clips get unity trim.
pub fn compute_trim_gain(buffer: &AudioBuffer, config: &ClipChainConfig) -> f64 {
    let window = ((config.trim_window * buffer.sample_rate() as f64) as usize).min(buffer.length());
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for channel in 0..buffer.number_of_channels() {
        if let Some(data) = buffer.channel_data(channel) {
            sum += data[..window].iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>();
            count += window;
        }
    }
    if count == 0 {
        return 1.0;
    }
    let rms = (sum / count as f64).sqrt();
    if rms > 0.0 && rms.is_finite() {
        (config.trim_target_rms / rms).clamp(config.trim_min, config.trim_max)
    } else {
        1.0
    }
}

/// The fixed per-clip processing chain.
#[derive(Debug, Clone)]
struct ClipChain {
    highpass: StereoBiquad,
    low_shelf: StereoBiquad,
    high_shelf: StereoBiquad,
    compressor: Compressor,
    /// Output gain reached at the end of the last block.
    gain: f32,
    reverb_send: f32,
    scratch: StereoBuffer,
}

impl ClipChain {
    fn new(sample_rate: f64, config: &ClipChainConfig) -> Self {
        ClipChain {
            highpass: StereoBiquad::new(FilterType::Highpass, config.highpass_hz, sample_rate),
            low_shelf: StereoBiquad::new(FilterType::LowShelf, config.low_shelf_hz, sample_rate),
            high_shelf: StereoBiquad::new(FilterType::HighShelf, config.high_shelf_hz, sample_rate),
            compressor: Compressor::new(sample_rate, &config.compressor),
            gain: 0.0,
            reverb_send: config.reverb_send as f32,
            scratch: StereoBuffer::default(),
        }
    }

    fn reset(&mut self) {
        self.highpass.reset();
        self.low_shelf.reset();
        self.high_shelf.reset();
        self.compressor.reset();
    }
}

#[derive(Debug, Clone)]
pub struct ClipPlayer {
    config: ClipChainConfig,
    buffer: Option<Arc<AudioBuffer>>,
    voice: Option<ClipVoice>,
    playhead: Playhead,
    volume: f64,
    trim_gain: f64,
    playback_rate: f64,
    detune_cents: f64,
    chain: ClipChain,
}

impl ClipPlayer {
    /// A player whose chain runs at the context's `sample_rate`.
    pub fn new(sample_rate: f64, config: &ClipChainConfig) -> Self {
        ClipPlayer {
            config: config.clone(),
            buffer: None,
            voice: None,
            playhead: Playhead::new(),
            volume: 1.0,
            trim_gain: 1.0,
            playback_rate: 1.0,
            detune_cents: 0.0,
            chain: ClipChain::new(sample_rate, config),
        }
    }

    // ── Loading ──────────────────────────────────────────────

    /// Fetch and decode `url`. A failed fetch leaves the player untouched.
    pub async fn load_from_url(
        &mut self,
        url: &str,
        fetcher: &dyn SourceFetcher,
    ) -> Result<Arc<AudioBuffer>> {
        let bytes = fetcher.fetch(url).await?;
        log::info!("fetched {} bytes from {url}", bytes.len());
        self.load_from_blob(&bytes)
    }

    /// Strict WAV loader: rejects anything that is not named or typed as WAV.
    pub fn load_from_file(&mut self, file: &ClipFile) -> Result<Arc<AudioBuffer>> {
        if !file.is_wav() {
            return Err(EngineError::UnsupportedFormat {
                name: file.name.clone(),
            });
        }
        self.load_from_blob(&file.bytes)
    }

    /// Decode raw bytes. Playback is stopped first; if decoding fails the
    /// previously loaded buffer stays in place.
    pub fn load_from_blob(&mut self, bytes: &[u8]) -> Result<Arc<AudioBuffer>> {
        self.stop();
        let decoded = decode_audio(bytes)?;
        self.trim_gain = compute_trim_gain(&decoded, &self.config);
        log::info!(
            "decoded {:.2}s clip ({} ch @ {} Hz), trim {:.2}",
            decoded.duration(),
            decoded.number_of_channels(),
            decoded.sample_rate(),
            self.trim_gain
        );

        let buffer = Arc::new(decoded);
        self.buffer = Some(Arc::clone(&buffer));
        self.chain.reset();
        Ok(buffer)
    }

    /// Stop and release the buffer.
    pub fn unload(&mut self) {
        self.stop();
        self.buffer = None;
        self.trim_gain = 1.0;
    }

    // ── Transport ────────────────────────────────────────────

    /// Start looping from the paused offset. Resumes a suspended context.
    pub fn play(&mut self, ctx: &mut AudioContext) -> Result<()> {
        let buffer = self
            .buffer
            .clone()
            .ok_or(EngineError::NotLoaded { operation: "play" })?;
        ctx.resume();
        if self.voice.is_some() {
            return Ok(());
        }

        self.voice = Some(ClipVoice::new(buffer, self.playhead.offset()));
        self.playhead.start(ctx.current_time());
        // No fade-in on start; ramps are for live volume moves
        self.chain.gain = self.target_gain();
        Ok(())
    }

    /// Freeze the position and drop the voice. No-op when not playing.
    pub fn pause(&mut self, ctx: &AudioContext) {
        if self.voice.take().is_none() {
            return;
        }
        self.playhead
            .freeze(ctx.current_time(), self.effective_rate(), self.duration());
    }

    /// Drop any voice and rewind to zero.
    pub fn stop(&mut self) {
        self.voice = None;
        self.playhead.reset();
    }

    /// Jump to `seconds`, clamped to the clip. A playing clip restarts its
    /// voice at the new offset.
    pub fn seek(&mut self, seconds: f64, ctx: &AudioContext) -> Result<()> {
        let buffer = self
            .buffer
            .clone()
            .ok_or(EngineError::NotLoaded { operation: "seek" })?;
        if !seconds.is_finite() {
            log::warn!("ignoring non-finite seek target {seconds}");
            return Ok(());
        }
        let target = seconds.clamp(0.0, buffer.duration());

        if self.voice.take().is_some() {
            self.voice = Some(ClipVoice::new(buffer, target));
        }
        self.playhead.set_offset(target, ctx.current_time());
        Ok(())
    }

    // ── Parameters ───────────────────────────────────────────

    pub fn set_volume(&mut self, volume: f64) {
        if let Some(v) = finite("volume", volume) {
            self.volume = v.clamp(0.0, MAX_VOLUME);
        }
    }

    pub fn set_playback_rate(&mut self, rate: f64, ctx: &AudioContext) {
        let Some(rate) = finite("playback rate", rate) else {
            return;
        };
        self.playhead
            .reanchor(ctx.current_time(), self.effective_rate());
        self.playback_rate = rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE);
    }

    pub fn set_detune_semitones(&mut self, semitones: f64, ctx: &AudioContext) {
        let Some(semitones) = finite("detune", semitones) else {
            return;
        };
        self.playhead
            .reanchor(ctx.current_time(), self.effective_rate());
        self.detune_cents = semitones.clamp(-MAX_DETUNE_SEMITONES, MAX_DETUNE_SEMITONES) * 100.0;
    }

    pub fn set_low_eq_gain_db(&mut self, db: f64) {
        if let Some(db) = finite("low EQ gain", db) {
            self.chain
                .low_shelf
                .set_gain_db(db.clamp(-MAX_EQ_GAIN_DB, MAX_EQ_GAIN_DB));
        }
    }

    pub fn set_high_eq_gain_db(&mut self, db: f64) {
        if let Some(db) = finite("high EQ gain", db) {
            self.chain
                .high_shelf
                .set_gain_db(db.clamp(-MAX_EQ_GAIN_DB, MAX_EQ_GAIN_DB));
        }
    }

    // ── Queries ──────────────────────────────────────────────

    /// Playhead position in seconds, wrapped into the loop.
    pub fn current_time(&self, ctx: &AudioContext) -> f64 {
        if self.buffer.is_none() {
            return 0.0;
        }
        let duration = self.duration();
        let position = self
            .playhead
            .position(ctx.current_time(), self.effective_rate());
        if position == duration && !self.is_playing() {
            // Seeked to the very end while paused
            return duration;
        }
        wrap(position, duration)
    }

    pub fn has_loaded_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map_or(0.0, |b| b.duration())
    }

    pub fn is_playing(&self) -> bool {
        self.voice.is_some()
    }

    pub fn audio_buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.buffer.clone()
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn trim_gain(&self) -> f64 {
        self.trim_gain
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn detune_cents(&self) -> f64 {
        self.detune_cents
    }

    pub fn low_eq_gain_db(&self) -> f64 {
        self.chain.low_shelf.gain_db()
    }

    pub fn high_eq_gain_db(&self) -> f64 {
        self.chain.high_shelf.gain_db()
    }

    /// Rate times the detune multiplier `2^(cents / 1200)`.
    pub fn effective_rate(&self) -> f64 {
        self.playback_rate * 2.0_f64.powf(self.detune_cents / 1200.0)
    }

    fn target_gain(&self) -> f32 {
        (self.volume * self.trim_gain) as f32
    }

    // ── Rendering ────────────────────────────────────────────

    /// Render `frames` through the chain and add the result to the bus
    /// inputs. Silent players add nothing.
    pub(crate) fn render(
        &mut self,
        frames: usize,
        output_rate: f64,
        mix: &mut StereoBuffer,
        send: &mut StereoBuffer,
    ) {
        let target = self.target_gain();
        let step = self.effective_rate();
        let Some(voice) = self.voice.as_mut() else {
            return;
        };
        let step = step * voice.buffer().sample_rate() as f64 / output_rate;

        let chain = &mut self.chain;
        chain.scratch.clear(frames);
        let StereoBuffer { left, right } = &mut chain.scratch;
        voice.render(left, right, step);
        chain.highpass.process_block(left, right);
        chain.low_shelf.process_block(left, right);
        chain.high_shelf.process_block(left, right);
        chain.compressor.process_block(left, right);

        let start = chain.gain;
        let delta = if frames > 0 {
            (target - start) / frames as f32
        } else {
            0.0
        };
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let gain = start + delta * (i + 1) as f32;
            *l *= gain;
            *r *= gain;
        }
        if frames > 0 {
            chain.gain = target;
        }

        mix.mix_in(left, right, 1.0);
        send.mix_in(left, right, chain.reverb_send);
    }
}

fn finite(name: &str, value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        log::warn!("ignoring non-finite {name}: {value}");
        None
    }
}

//! Mix engine. Owns the audio context and the bus, plus one clip player per
//! track id, and keeps the players in step with the UI's track list.
//!
//! The host drives audio by calling [`MixEngine::render`] from its output
//! callback. Everything else is a control-thread call between blocks.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::capture::{CapturePipeline, MediaRecorder, RecordingFuture, WavRecorder};
use crate::config::EngineConfig;
use crate::context::AudioContext;
use crate::decode::ClipFile;
use crate::dsp::analyser::AnalyserTap;
use crate::dsp::mixer::MixBus;
use crate::dsp::sampler::AudioBuffer;
use crate::error::Result;
use crate::fetch::{SourceFetcher, default_fetcher};
use crate::mix::{TrackMix, usable_bpm};
use crate::player::{ClipPlayer, MAX_VOLUME};
use crate::track::Track;

pub struct MixEngine {
    config: EngineConfig,
    context: AudioContext,
    /// Built on first use and never rebuilt.
    bus: Option<MixBus>,
    /// Player not bound to any track, for single-clip use.
    clip: ClipPlayer,
    /// Ordered by id so the bus sums in the same order on every run.
    players: BTreeMap<String, ClipPlayer>,
    tracks: Vec<Track>,
    target_bpm: Option<f64>,
    fetcher: Box<dyn SourceFetcher>,
    capture: CapturePipeline,
}

impl std::fmt::Debug for MixEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixEngine")
            .field("context", &self.context)
            .field("bus_built", &self.bus.is_some())
            .field("players", &self.players.len())
            .field("tracks", &self.tracks.len())
            .field("target_bpm", &self.target_bpm)
            .field("capture", &self.capture)
            .finish()
    }
}

impl Default for MixEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MixEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let sample_rate = config.sample_rate as f64;
        MixEngine {
            context: AudioContext::new(sample_rate),
            bus: None,
            clip: ClipPlayer::new(sample_rate, &config.clip_chain),
            players: BTreeMap::new(),
            tracks: Vec::new(),
            target_bpm: usable_bpm(config.target_bpm),
            fetcher: default_fetcher(),
            capture: CapturePipeline::new(Box::new(WavRecorder::new())),
            config,
        }
    }

    /// Replace the source fetcher.
    pub fn with_fetcher(mut self, fetcher: impl SourceFetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    /// Replace the media recorder used for capture.
    pub fn with_recorder(mut self, recorder: impl MediaRecorder + 'static) -> Self {
        self.capture = CapturePipeline::new(Box::new(recorder));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Resume the audio context, as a user gesture would.
    pub fn resume(&mut self) {
        self.context.resume();
    }

    pub fn suspend(&mut self) {
        self.context.suspend();
    }

    fn ensure_bus(&mut self) -> &mut MixBus {
        let sample_rate = self.context.sample_rate();
        let config = &self.config;
        self.bus
            .get_or_insert_with(|| MixBus::new(sample_rate, config))
    }

    // ── Track coordination ───────────────────────────────────

    /// Take a new track list: players of vanished ids are released, the
    /// rest get their mix recomputed.
    pub fn update_tracks(&mut self, tracks: Vec<Track>) {
        self.players.retain(|id, player| {
            let live = tracks.iter().any(|t| &t.id == id);
            if !live {
                log::debug!("releasing player for removed track {id}");
                player.unload();
            }
            live
        });
        self.tracks = tracks;
        self.recompute_mix();
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Push resolved mix parameters to every live player. Never touches
    /// transport, so playing voices keep playing.
    fn recompute_mix(&mut self) {
        for (id, mix) in TrackMix::resolve_all(&self.tracks, self.target_bpm) {
            if let Some(player) = self.players.get_mut(&id) {
                apply_mix(player, &mix, &self.context);
            }
        }
    }

    pub async fn load_track_from_url(&mut self, id: &str, url: &str) -> Result<Arc<AudioBuffer>> {
        log::info!("loading track {id} from {url}");
        let created = !self.players.contains_key(id);
        let sample_rate = self.context.sample_rate();
        let chain = &self.config.clip_chain;
        let player = self
            .players
            .entry(id.to_string())
            .or_insert_with(|| ClipPlayer::new(sample_rate, chain));
        let result = player.load_from_url(url, self.fetcher.as_ref()).await;
        self.finish_track_load(id, created, result)
    }

    pub fn load_track_from_file(&mut self, id: &str, file: &ClipFile) -> Result<Arc<AudioBuffer>> {
        let created = !self.players.contains_key(id);
        let result = self.player_entry(id).load_from_file(file);
        self.finish_track_load(id, created, result)
    }

    pub fn load_track_from_blob(&mut self, id: &str, bytes: &[u8]) -> Result<Arc<AudioBuffer>> {
        let created = !self.players.contains_key(id);
        let result = self.player_entry(id).load_from_blob(bytes);
        self.finish_track_load(id, created, result)
    }

    fn player_entry(&mut self, id: &str) -> &mut ClipPlayer {
        let sample_rate = self.context.sample_rate();
        let chain = &self.config.clip_chain;
        self.players
            .entry(id.to_string())
            .or_insert_with(|| ClipPlayer::new(sample_rate, chain))
    }

    fn finish_track_load(
        &mut self,
        id: &str,
        created: bool,
        result: Result<Arc<AudioBuffer>>,
    ) -> Result<Arc<AudioBuffer>> {
        match &result {
            Ok(_) => self.recompute_mix(),
            Err(e) => {
                log::warn!("loading track {id} failed: {e}");
                if created {
                    self.players.remove(id);
                }
            }
        }
        result
    }

    /// Start every loaded player of a live track. With no tracks registered,
    /// start every loaded player, the single-clip player included.
    pub fn play_all(&mut self) -> Result<()> {
        self.recompute_mix();
        self.ensure_bus();

        if self.tracks.is_empty() {
            if self.clip.has_loaded_buffer() {
                self.clip.play(&mut self.context)?;
            }
            for player in self.players.values_mut() {
                if player.has_loaded_buffer() {
                    player.play(&mut self.context)?;
                }
            }
            return Ok(());
        }

        for track in &self.tracks {
            if let Some(player) = self.players.get_mut(&track.id) {
                if player.has_loaded_buffer() {
                    player.play(&mut self.context)?;
                }
            }
        }
        Ok(())
    }

    pub fn stop_all(&mut self) {
        self.recompute_mix();
        self.clip.stop();
        for player in self.players.values_mut() {
            player.stop();
        }
    }

    /// No-op for ids without a loaded buffer.
    pub fn play_track(&mut self, id: &str) -> Result<()> {
        if !self.track_has_buffer(id) {
            return Ok(());
        }
        self.ensure_bus();
        match self.players.get_mut(id) {
            Some(player) => player.play(&mut self.context),
            None => Ok(()),
        }
    }

    pub fn pause_track(&mut self, id: &str) {
        if let Some(player) = self.players.get_mut(id) {
            player.pause(&self.context);
        }
    }

    pub fn toggle_track_playback(&mut self, id: &str) -> Result<()> {
        if self.is_track_playing(id) {
            self.pause_track(id);
            Ok(())
        } else {
            self.play_track(id)
        }
    }

    /// Global fallback tempo. Non-positive or non-finite clears it.
    pub fn set_target_bpm(&mut self, bpm: Option<f64>) {
        self.target_bpm = usable_bpm(bpm);
        self.recompute_mix();
    }

    pub fn target_bpm(&self) -> Option<f64> {
        self.target_bpm
    }

    pub fn set_track_low_eq_gain_db(&mut self, id: &str, db: f64) {
        if let Some(player) = self.players.get_mut(id) {
            player.set_low_eq_gain_db(db);
        }
    }

    pub fn set_track_high_eq_gain_db(&mut self, id: &str, db: f64) {
        if let Some(player) = self.players.get_mut(id) {
            player.set_high_eq_gain_db(db);
        }
    }

    pub fn track_player(&self, id: &str) -> Option<&ClipPlayer> {
        self.players.get(id)
    }

    pub fn has_any_loaded_buffer(&self) -> bool {
        self.clip.has_loaded_buffer() || self.players.values().any(ClipPlayer::has_loaded_buffer)
    }

    // ── Master ───────────────────────────────────────────────

    pub fn set_master_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            log::warn!("ignoring non-finite master volume {volume}");
            return;
        }
        let volume = volume.clamp(0.0, MAX_VOLUME);
        self.config.master_volume = volume;
        if let Some(bus) = self.bus.as_mut() {
            bus.set_master_volume(volume);
        }
    }

    pub fn master_volume(&self) -> f64 {
        self.config.master_volume
    }

    /// The analysis tap, once the bus exists.
    pub fn analyser(&self) -> Option<&AnalyserTap> {
        self.bus.as_ref().map(MixBus::analyser)
    }

    /// Render one block of master output. A suspended context renders
    /// silence and its clock stands still.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if self.context.is_suspended() {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }

        let sample_rate = self.context.sample_rate();
        let config = &self.config;
        let bus = self
            .bus
            .get_or_insert_with(|| MixBus::new(sample_rate, config));
        bus.begin_block(frames);
        let (mix, send) = bus.inputs();
        self.clip.render(frames, sample_rate, mix, send);
        for player in self.players.values_mut() {
            player.render(frames, sample_rate, mix, send);
        }
        bus.finish_block(&mut left[..frames], &mut right[..frames]);
        left[frames..].fill(0.0);
        right[frames..].fill(0.0);

        self.capture.write(&left[..frames], &right[..frames]);
        self.context.advance(frames);
    }

    // ── Capture ──────────────────────────────────────────────

    pub fn start_recording(&mut self) -> Result<()> {
        self.ensure_bus();
        self.capture.start(&mut self.context)
    }

    /// See [`CapturePipeline::stop`]. The future does not borrow the engine.
    pub fn stop_recording(&mut self) -> RecordingFuture {
        self.capture.stop()
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    // ── Single-clip mode ─────────────────────────────────────

    pub async fn load_from_url(&mut self, url: &str) -> Result<Arc<AudioBuffer>> {
        self.clip.load_from_url(url, self.fetcher.as_ref()).await
    }

    pub fn load_from_file(&mut self, file: &ClipFile) -> Result<Arc<AudioBuffer>> {
        self.clip.load_from_file(file)
    }

    pub fn load_from_blob(&mut self, bytes: &[u8]) -> Result<Arc<AudioBuffer>> {
        self.clip.load_from_blob(bytes)
    }

    pub fn play(&mut self) -> Result<()> {
        self.ensure_bus();
        self.clip.play(&mut self.context)
    }

    pub fn pause(&mut self) {
        self.clip.pause(&self.context);
    }

    pub fn stop(&mut self) {
        self.clip.stop();
    }

    pub fn seek(&mut self, seconds: f64) -> Result<()> {
        self.clip.seek(seconds, &self.context)
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.clip.set_volume(volume);
    }

    pub fn current_time(&self) -> f64 {
        self.clip.current_time(&self.context)
    }

    pub fn duration(&self) -> f64 {
        self.clip.duration()
    }

    pub fn is_playing(&self) -> bool {
        self.clip.is_playing()
    }

    pub fn has_loaded_buffer(&self) -> bool {
        self.clip.has_loaded_buffer()
    }

    pub fn unload(&mut self) {
        self.clip.unload();
    }

    // ── Visualization feed ───────────────────────────────────

    /// The single clip when loaded, else the first listed track with audio.
    fn visualizer_player(&self) -> Option<&ClipPlayer> {
        if self.clip.has_loaded_buffer() {
            return Some(&self.clip);
        }
        self.tracks
            .iter()
            .filter_map(|t| self.players.get(&t.id))
            .find(|p| p.has_loaded_buffer())
    }

    pub fn visualizer_audio_buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.visualizer_player().and_then(ClipPlayer::audio_buffer)
    }

    pub fn visualizer_current_time(&self) -> f64 {
        self.visualizer_player()
            .map_or(0.0, |p| p.current_time(&self.context))
    }

    pub fn track_audio_buffer(&self, id: &str) -> Option<Arc<AudioBuffer>> {
        self.players.get(id).and_then(ClipPlayer::audio_buffer)
    }

    pub fn track_current_time(&self, id: &str) -> f64 {
        self.players
            .get(id)
            .map_or(0.0, |p| p.current_time(&self.context))
    }

    pub fn is_track_playing(&self, id: &str) -> bool {
        self.players.get(id).is_some_and(ClipPlayer::is_playing)
    }

    fn track_has_buffer(&self, id: &str) -> bool {
        self.players.get(id).is_some_and(ClipPlayer::has_loaded_buffer)
    }
}

fn apply_mix(player: &mut ClipPlayer, mix: &TrackMix, ctx: &AudioContext) {
    player.set_low_eq_gain_db(mix.low_eq_gain_db);
    player.set_high_eq_gain_db(mix.high_eq_gain_db);
    player.set_playback_rate(mix.playback_rate, ctx);
    player.set_detune_semitones(mix.detune_semitones, ctx);
    player.set_volume(mix.volume);
}

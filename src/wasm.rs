//! Browser bindings around [`MixEngine`].
//!
//! Exported methods cannot hold `&mut self` across an await, so the page
//! fetches clip bytes itself and hands them over.

use js_sys::{Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::capture::RecordedBlob;
use crate::config::EngineConfig;
use crate::engine::MixEngine;
use crate::error::EngineError;
use crate::track::Track;

#[wasm_bindgen(start)]
pub fn init() {
    console_log::init_with_level(log::Level::Info).ok();
    log::info!("sonicpalette core {} ready", crate::VERSION);
}

fn js_err(e: EngineError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn recorded_blob_to_js(blob: &RecordedBlob) -> Result<JsValue, JsValue> {
    let object = Object::new();
    Reflect::set(
        &object,
        &JsValue::from_str("data"),
        &Uint8Array::from(blob.data.as_slice()),
    )?;
    Reflect::set(
        &object,
        &JsValue::from_str("mimeType"),
        &JsValue::from_str(&blob.mime_type),
    )?;
    Ok(object.into())
}

#[wasm_bindgen(js_name = MixEngine)]
pub struct WasmMixEngine {
    inner: MixEngine,
}

#[wasm_bindgen(js_class = MixEngine)]
impl WasmMixEngine {
    /// Build an engine from an optional JSON config string.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<WasmMixEngine, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(js_err)?,
            None => EngineConfig::default(),
        };
        Ok(WasmMixEngine {
            inner: MixEngine::with_config(config),
        })
    }

    #[wasm_bindgen(js_name = updateTracks)]
    pub fn update_tracks(&mut self, tracks: JsValue) -> Result<(), JsValue> {
        let tracks: Vec<Track> = serde_wasm_bindgen::from_value(tracks)
            .map_err(|e| JsValue::from_str(&format!("track list: {e}")))?;
        self.inner.update_tracks(tracks);
        Ok(())
    }

    /// Decode and attach a clip to a track. Returns its duration in seconds.
    #[wasm_bindgen(js_name = loadTrackFromBytes)]
    pub fn load_track_from_bytes(&mut self, id: &str, bytes: &[u8]) -> Result<f64, JsValue> {
        let buffer = self.inner.load_track_from_blob(id, bytes).map_err(js_err)?;
        Ok(buffer.duration())
    }

    #[wasm_bindgen(js_name = loadFromBytes)]
    pub fn load_from_bytes(&mut self, bytes: &[u8]) -> Result<f64, JsValue> {
        let buffer = self.inner.load_from_blob(bytes).map_err(js_err)?;
        Ok(buffer.duration())
    }

    pub fn resume(&mut self) {
        self.inner.resume();
    }

    pub fn suspend(&mut self) {
        self.inner.suspend();
    }

    pub fn play(&mut self) -> Result<(), JsValue> {
        self.inner.play().map_err(js_err)
    }

    pub fn pause(&mut self) {
        self.inner.pause();
    }

    pub fn stop(&mut self) {
        self.inner.stop();
    }

    pub fn seek(&mut self, seconds: f64) -> Result<(), JsValue> {
        self.inner.seek(seconds).map_err(js_err)
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, volume: f64) {
        self.inner.set_volume(volume);
    }

    #[wasm_bindgen(js_name = currentTime)]
    pub fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    pub fn duration(&self) -> f64 {
        self.inner.duration()
    }

    #[wasm_bindgen(js_name = isPlaying)]
    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    #[wasm_bindgen(js_name = hasLoadedBuffer)]
    pub fn has_loaded_buffer(&self) -> bool {
        self.inner.has_loaded_buffer()
    }

    pub fn unload(&mut self) {
        self.inner.unload();
    }

    #[wasm_bindgen(js_name = playAll)]
    pub fn play_all(&mut self) -> Result<(), JsValue> {
        self.inner.play_all().map_err(js_err)
    }

    #[wasm_bindgen(js_name = stopAll)]
    pub fn stop_all(&mut self) {
        self.inner.stop_all();
    }

    #[wasm_bindgen(js_name = playTrack)]
    pub fn play_track(&mut self, id: &str) -> Result<(), JsValue> {
        self.inner.play_track(id).map_err(js_err)
    }

    #[wasm_bindgen(js_name = pauseTrack)]
    pub fn pause_track(&mut self, id: &str) {
        self.inner.pause_track(id);
    }

    #[wasm_bindgen(js_name = toggleTrackPlayback)]
    pub fn toggle_track_playback(&mut self, id: &str) -> Result<(), JsValue> {
        self.inner.toggle_track_playback(id).map_err(js_err)
    }

    #[wasm_bindgen(js_name = isTrackPlaying)]
    pub fn is_track_playing(&self, id: &str) -> bool {
        self.inner.is_track_playing(id)
    }

    #[wasm_bindgen(js_name = trackCurrentTime)]
    pub fn track_current_time(&self, id: &str) -> f64 {
        self.inner.track_current_time(id)
    }

    #[wasm_bindgen(js_name = trackDuration)]
    pub fn track_duration(&self, id: &str) -> f64 {
        self.inner
            .track_audio_buffer(id)
            .map_or(0.0, |buffer| buffer.duration())
    }

    #[wasm_bindgen(js_name = trackWaveformPeaks)]
    pub fn track_waveform_peaks(&self, id: &str, bars: usize) -> Vec<f32> {
        self.inner
            .track_audio_buffer(id)
            .map(|buffer| crate::visual::waveform_peaks(&buffer, bars))
            .unwrap_or_default()
    }

    #[wasm_bindgen(js_name = setTrackLowEqGainDb)]
    pub fn set_track_low_eq_gain_db(&mut self, id: &str, db: f64) {
        self.inner.set_track_low_eq_gain_db(id, db);
    }

    #[wasm_bindgen(js_name = setTrackHighEqGainDb)]
    pub fn set_track_high_eq_gain_db(&mut self, id: &str, db: f64) {
        self.inner.set_track_high_eq_gain_db(id, db);
    }

    #[wasm_bindgen(js_name = setTargetBpm)]
    pub fn set_target_bpm(&mut self, bpm: Option<f64>) {
        self.inner.set_target_bpm(bpm);
    }

    #[wasm_bindgen(js_name = setMasterVolume)]
    pub fn set_master_volume(&mut self, volume: f64) {
        self.inner.set_master_volume(volume);
    }

    /// Fill one output block. Call from the page's audio callback.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.inner.render(left, right);
    }

    /// Frequency magnitudes in dB, empty before the first render.
    #[wasm_bindgen(js_name = frequencyData)]
    pub fn frequency_data(&self) -> Vec<f32> {
        self.inner
            .analyser()
            .map(|tap| tap.frequency_data_db())
            .unwrap_or_default()
    }

    /// Waveform peaks of whatever the visualizer is showing.
    #[wasm_bindgen(js_name = waveformPeaks)]
    pub fn waveform_peaks(&self, bars: usize) -> Vec<f32> {
        self.inner
            .visualizer_audio_buffer()
            .map(|buffer| crate::visual::waveform_peaks(&buffer, bars))
            .unwrap_or_default()
    }

    #[wasm_bindgen(js_name = visualizerCurrentTime)]
    pub fn visualizer_current_time(&self) -> f64 {
        self.inner.visualizer_current_time()
    }

    #[wasm_bindgen(js_name = visualizerProgress)]
    pub fn visualizer_progress(&self) -> f64 {
        let duration = self
            .inner
            .visualizer_audio_buffer()
            .map_or(0.0, |buffer| buffer.duration());
        crate::visual::playhead_progress(self.inner.visualizer_current_time(), duration)
    }

    #[wasm_bindgen(js_name = startRecording)]
    pub fn start_recording(&mut self) -> Result<(), JsValue> {
        self.inner.start_recording().map_err(js_err)
    }

    /// Resolves to `{ data: Uint8Array, mimeType: string }`, or `null` when
    /// nothing was captured.
    #[wasm_bindgen(js_name = stopRecording)]
    pub fn stop_recording(&mut self) -> js_sys::Promise {
        let pending = self.inner.stop_recording();
        future_to_promise(async move {
            match pending.await.map_err(js_err)? {
                Some(blob) => recorded_blob_to_js(&blob),
                None => Ok(JsValue::NULL),
            }
        })
    }

    #[wasm_bindgen(js_name = isRecording)]
    pub fn is_recording(&self) -> bool {
        self.inner.is_recording()
    }
}

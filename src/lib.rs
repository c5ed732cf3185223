pub mod capture;
pub mod collab;
pub mod config;
pub mod context;
pub mod decode;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod mix;
pub mod player;
pub mod playhead;
pub mod track;
pub mod visual;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

use wasm_bindgen::prelude::*;

pub use crate::capture::{CapturePipeline, MediaRecorder, RecordedBlob, RecorderEvent, WavRecorder};
pub use crate::config::EngineConfig;
pub use crate::context::AudioContext;
pub use crate::decode::{ClipFile, decode_audio};
pub use crate::dsp::sampler::AudioBuffer;
pub use crate::engine::MixEngine;
pub use crate::error::{EngineError, Result};
pub use crate::fetch::{MemoryFetcher, SourceFetcher};
pub use crate::mix::TrackMix;
pub use crate::player::ClipPlayer;
pub use crate::track::Track;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the sonicpalette-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

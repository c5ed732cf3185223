//! DSP: the audio graph the engine renders itself.
//!
//! All processing runs in Rust, block by block, so the same graph drives a
//! WebAudio AudioWorklet (via WASM) and native hosts alike.

pub mod analyser;
pub mod compressor;
pub mod filter;
pub mod mixer;
pub mod reverb;
pub mod sampler;

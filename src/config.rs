//! Engine configuration.
//!
//! Every constant of the clip chain and the mix bus lives here with its
//! default, so a host can tune the graph from JSON without touching code.
//! Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Output sample rate of the audio context.
    pub sample_rate: u32,
    /// Initial master gain.
    pub master_volume: f64,
    /// Initial global target tempo.
    pub target_bpm: Option<f64>,
    pub clip_chain: ClipChainConfig,
    #[serde(default = "CompressorConfig::glue")]
    pub glue_compressor: CompressorConfig,
    pub reverb: ReverbConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            master_volume: 0.8,
            target_bpm: None,
            clip_chain: ClipChainConfig::default(),
            glue_compressor: CompressorConfig::glue(),
            reverb: ReverbConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Configuration(format!("engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(EngineError::Configuration(format!(
                "sample rate {} outside 8000..=192000",
                self.sample_rate
            )));
        }
        if !self.master_volume.is_finite() {
            return Err(EngineError::Configuration(
                "master volume must be finite".into(),
            ));
        }
        if self.reverb.partition_size == 0 || !self.reverb.partition_size.is_power_of_two() {
            return Err(EngineError::Configuration(format!(
                "reverb partition size {} is not a power of two",
                self.reverb.partition_size
            )));
        }
        Ok(())
    }
}

/// Per-clip processing chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClipChainConfig {
    /// Rumble filter cutoff in Hz.
    pub highpass_hz: f64,
    pub low_shelf_hz: f64,
    pub high_shelf_hz: f64,
    pub compressor: CompressorConfig,
    /// Level of the post-gain send into the shared reverb.
    pub reverb_send: f64,
    /// RMS the loudness trim aims for.
    pub trim_target_rms: f64,
    pub trim_min: f64,
    pub trim_max: f64,
    /// Seconds from the start of the clip measured for the trim.
    pub trim_window: f64,
}

impl Default for ClipChainConfig {
    fn default() -> Self {
        Self {
            highpass_hz: 32.0,
            low_shelf_hz: 250.0,
            high_shelf_hz: 5000.0,
            compressor: CompressorConfig::default(),
            reverb_send: 0.18,
            trim_target_rms: 0.12,
            trim_min: 0.35,
            trim_max: 2.5,
            trim_window: 1.0,
        }
    }
}

/// Compressor parameters. The default is the per-clip leveler;
/// [`CompressorConfig::glue`] is the gentler bus preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressorConfig {
    /// Threshold in dB.
    pub threshold: f64,
    pub ratio: f64,
    /// Knee width in dB.
    pub knee: f64,
    /// Attack time in seconds.
    pub attack: f64,
    /// Release time in seconds.
    pub release: f64,
    /// Makeup gain in dB.
    pub makeup_gain: f64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold: -20.0,
            ratio: 3.0,
            knee: 10.0,
            attack: 0.01,
            release: 0.2,
            makeup_gain: 0.0,
        }
    }
}

impl CompressorConfig {
    pub fn glue() -> Self {
        Self {
            threshold: -14.0,
            ratio: 2.0,
            knee: 6.0,
            attack: 0.02,
            release: 0.25,
            makeup_gain: 0.0,
        }
    }
}

/// Shared convolution reverb.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverbConfig {
    /// Impulse response length in seconds.
    pub duration: f64,
    /// Seed of the impulse response noise, so every engine sounds the same.
    pub seed: u64,
    /// Gain of the wet return into the master.
    pub return_gain: f64,
    /// Convolution block size in frames. Must be a power of two.
    pub partition_size: usize,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            duration: 0.5,
            seed: 0x5011_C0DE,
            return_gain: 0.6,
            partition_size: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_graph_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.clip_chain.compressor.threshold, -20.0);
        assert_eq!(config.glue_compressor.threshold, -14.0);
        assert_eq!(config.glue_compressor.ratio, 2.0);
        assert_eq!(config.reverb.return_gain, 0.6);
        assert_eq!(config.clip_chain.reverb_send, 0.18);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            EngineConfig::from_json(r#"{ "sampleRate": 44100, "reverb": { "returnGain": 0.3 } }"#)
                .unwrap();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.reverb.return_gain, 0.3);
        assert_eq!(config.reverb.partition_size, 256);
        assert_eq!(config.glue_compressor, CompressorConfig::glue());
        assert_eq!(config.clip_chain, ClipChainConfig::default());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "sampleRate": 12 }"#),
            Err(EngineError::Configuration(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "reverb": { "partitionSize": 300 } }"#),
            Err(EngineError::Configuration(_))
        ));
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}

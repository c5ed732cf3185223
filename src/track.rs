//! Tracks as the UI layer describes them.

use serde::{Deserialize, Serialize};

use crate::collab::SonicProfile;

pub const DEFAULT_TRACK_VOLUME: f64 = 0.8;

fn default_volume() -> f64 {
    DEFAULT_TRACK_VOLUME
}

/// One layer of the mix. The engine only reads tracks; the UI owns them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    /// Tempo the clip was generated at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_bpm: Option<f64>,
    /// Tempo this track should play at; falls back to the engine target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_bpm: Option<f64>,
    /// Detune in semitones, [-12, 12].
    #[serde(default)]
    pub pitch_semitones: f64,
    #[serde(default)]
    pub low_eq_gain_db: f64,
    #[serde(default)]
    pub high_eq_gain_db: f64,
    /// Linear gain, [0, 2].
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_soloed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<SonicProfile>,
}

impl Track {
    pub fn new(id: impl Into<String>) -> Self {
        Track {
            id: id.into(),
            source_bpm: None,
            target_bpm: None,
            pitch_semitones: 0.0,
            low_eq_gain_db: 0.0,
            high_eq_gain_db: 0.0,
            volume: DEFAULT_TRACK_VOLUME,
            is_muted: false,
            is_soloed: false,
            audio_url: None,
            profile: None,
        }
    }

    /// Parse a track list as the UI serializes it.
    pub fn list_from_json(json: &str) -> serde_json::Result<Vec<Track>> {
        serde_json::from_str(json)
    }
}

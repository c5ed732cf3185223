//! Collaborator boundary: the composition and generation services that
//! produce clips. The engine only defines the data it exchanges with them
//! and the seams a host plugs real clients into.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Environment variable holding the generation service key.
pub const API_KEY_ENV: &str = "FAL_KEY";

pub const MIN_DURATION_SECS: f64 = 1.0;
pub const MAX_DURATION_SECS: f64 = 60.0;

// ── Sonic profile ────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Emotion {
    pub valence: f64,
    pub arousal: f64,
    pub dominance: f64,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MusicalParameters {
    /// Tempo the clip is generated at, in BPM.
    pub tempo: f64,
    pub mode: String,
    pub articulation: String,
    pub register: String,
    pub rhythmic_density: f64,
    pub harmonic_tension: f64,
    pub spectral_brightness: f64,
    pub attack_speed: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundDesign {
    pub instrument: String,
    pub waveform: String,
    pub texture: String,
    pub space: String,
}

/// What the composition collaborator derives from an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SonicProfile {
    pub emotion: Emotion,
    pub musical_parameters: MusicalParameters,
    pub sound_design: SoundDesign,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SonicProfile {
    /// The embedded tempo, if it is usable as a reference.
    pub fn tempo(&self) -> Option<f64> {
        let tempo = self.musical_parameters.tempo;
        (tempo.is_finite() && tempo > 0.0).then_some(tempo)
    }
}

/// Build the text prompt the generation collaborator receives for a profile.
pub fn compose_audio_prompt(profile: &SonicProfile) -> String {
    let p = &profile.musical_parameters;
    let s = &profile.sound_design;
    format!(
        "Create a {}-inspired minimalist instrumental in {} mode at {} BPM. \
         Use {} as the main element, played in the {} register with {} articulation. \
         Texture should be {} with {}. \
         Keep it as a single realistic, mix-ready instrumental layer.",
        profile.emotion.label.to_lowercase(),
        p.mode,
        p.tempo,
        s.instrument,
        p.register,
        p.articulation,
        s.texture,
        s.space,
    )
}

// ── Generation parameters ────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduler {
    #[default]
    Euler,
    Heun,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceType {
    #[default]
    Cfg,
    Apg,
    CfgStar,
}

/// User-facing generation settings. Optional fields left as `None` are not
/// sent, so the service applies its own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Default 15; negative values are raised to 0.
    pub guidance_scale: f64,
    /// Clip length in seconds. Default 10, rounded and clamped to [1, 60].
    pub duration: f64,
    /// Default true.
    pub instrumental: bool,
    pub scheduler: Scheduler,
    pub guidance_type: GuidanceType,
    /// Rounded to a whole step count.
    pub number_of_steps: Option<f64>,
    pub granularity_scale: Option<f64>,
    pub guidance_interval: Option<f64>,
    pub guidance_interval_decay: Option<f64>,
    pub minimum_guidance_scale: Option<f64>,
    pub tag_guidance_scale: Option<f64>,
    pub lyric_guidance_scale: Option<f64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            guidance_scale: 15.0,
            duration: 10.0,
            instrumental: true,
            scheduler: Scheduler::Euler,
            guidance_type: GuidanceType::Cfg,
            number_of_steps: None,
            granularity_scale: None,
            guidance_interval: None,
            guidance_interval_decay: None,
            minimum_guidance_scale: None,
            tag_guidance_scale: None,
            lyric_guidance_scale: None,
        }
    }
}

/// A validated request, ready to serialize for the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub guidance_scale: f64,
    pub instrumental: bool,
    pub duration: u32,
    pub scheduler: Scheduler,
    pub guidance_type: GuidanceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_interval_decay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_guidance_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_guidance_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric_guidance_scale: Option<f64>,
}

impl GenerationParams {
    /// Validate and clamp into a request for `prompt`. Non-finite optional
    /// values are dropped as if unset.
    pub fn request(&self, prompt: &str) -> Result<GenerationRequest> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EngineError::InvalidRequest("prompt is empty".into()));
        }
        if !self.guidance_scale.is_finite() {
            return Err(EngineError::InvalidRequest(format!(
                "guidance scale {} is not a number",
                self.guidance_scale
            )));
        }
        if !self.duration.is_finite() {
            return Err(EngineError::InvalidRequest(format!(
                "duration {} is not a number",
                self.duration
            )));
        }

        let optional = |v: Option<f64>| v.filter(|v| v.is_finite());
        Ok(GenerationRequest {
            prompt: prompt.to_string(),
            guidance_scale: self.guidance_scale.max(0.0),
            instrumental: self.instrumental,
            duration: self
                .duration
                .round()
                .clamp(MIN_DURATION_SECS, MAX_DURATION_SECS) as u32,
            scheduler: self.scheduler,
            guidance_type: self.guidance_type,
            number_of_steps: optional(self.number_of_steps).map(|n| n.round().max(1.0) as u32),
            granularity_scale: optional(self.granularity_scale),
            guidance_interval: optional(self.guidance_interval),
            guidance_interval_decay: optional(self.guidance_interval_decay),
            minimum_guidance_scale: optional(self.minimum_guidance_scale),
            tag_guidance_scale: optional(self.tag_guidance_scale),
            lyric_guidance_scale: optional(self.lyric_guidance_scale),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedAudio {
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationResult {
    pub audio: Option<GeneratedAudio>,
    pub request_id: Option<String>,
}

impl GenerationResult {
    /// URL of the generated clip.
    pub fn audio_url(&self) -> Result<&str> {
        self.audio
            .as_ref()
            .and_then(|a| a.url.as_deref())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                EngineError::Collaborator(format!(
                    "generation result has no audio url (request {})",
                    self.request_id.as_deref().unwrap_or("unknown")
                ))
            })
    }
}

// ── Credentials and seams ────────────────────────────────────

#[derive(Clone)]
pub struct CollaboratorCredentials {
    api_key: String,
}

impl std::fmt::Debug for CollaboratorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorCredentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl CollaboratorCredentials {
    /// An explicit key wins; otherwise fall back to [`API_KEY_ENV`].
    pub fn resolve(explicit: Option<&str>) -> Result<Self> {
        match explicit.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => Ok(Self {
                api_key: key.to_string(),
            }),
            None => Self::from_env(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_env_var(API_KEY_ENV)
    }

    pub fn from_env_var(name: &str) -> Result<Self> {
        match std::env::var(name) {
            Ok(key) if !key.trim().is_empty() => Ok(Self {
                api_key: key.trim().to_string(),
            }),
            _ => Err(EngineError::Configuration(format!(
                "generation API key missing; set {name}"
            ))),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

pub type CollabFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

/// Turns an image into a [`SonicProfile`].
pub trait ProfileComposer {
    fn compose<'a>(&'a self, image_base64: &'a str, genre: &'a str)
    -> CollabFuture<'a, SonicProfile>;
}

/// Turns a prompt into a hosted clip.
pub trait AudioGenerator {
    fn generate<'a>(&'a self, request: &'a GenerationRequest)
    -> CollabFuture<'a, GenerationResult>;
}

/// A generated clip, ready to load into a track.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedClip {
    pub prompt: String,
    pub audio_url: String,
    /// Tempo the clip was asked for, usable as the track's source tempo.
    pub source_bpm: Option<f64>,
}

/// Compose a prompt for `profile`, run the generator, and return the clip URL.
pub async fn generate_for_profile(
    generator: &dyn AudioGenerator,
    params: &GenerationParams,
    profile: &SonicProfile,
) -> Result<GeneratedClip> {
    let prompt = compose_audio_prompt(profile);
    let request = params.request(&prompt)?;
    log::info!(
        "requesting {}s clip ({:?}, {:?})",
        request.duration,
        request.scheduler,
        request.guidance_type
    );
    let result = generator.generate(&request).await?;
    let audio_url = result.audio_url()?.to_string();
    Ok(GeneratedClip {
        prompt: request.prompt,
        audio_url,
        source_bpm: profile.tempo(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> SonicProfile {
        serde_json::from_str(
            r#"{
                "emotion": { "valence": 0.7, "arousal": 0.4, "dominance": 0.5, "label": "Serene" },
                "musicalParameters": {
                    "tempo": 96, "mode": "Dorian", "articulation": "legato",
                    "register": "middle", "rhythmic_density": 0.3,
                    "harmonic_tension": 0.2, "spectral_brightness": 0.6,
                    "attack_speed": "slow"
                },
                "soundDesign": {
                    "instrument": "piano", "waveform": "sine",
                    "texture": "airy", "space": "a wide hall"
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn profile_tempo_must_be_positive() {
        let mut p = profile();
        assert_eq!(p.tempo(), Some(96.0));
        p.musical_parameters.tempo = 0.0;
        assert_eq!(p.tempo(), None);
        p.musical_parameters.tempo = f64::NAN;
        assert_eq!(p.tempo(), None);
    }

    #[test]
    fn prompt_describes_the_profile() {
        let prompt = compose_audio_prompt(&profile());
        assert!(prompt.starts_with("Create a serene-inspired minimalist instrumental"));
        assert!(prompt.contains("in Dorian mode at 96 BPM."));
        assert!(prompt.contains("Use piano as the main element"));
        assert!(prompt.contains("Texture should be airy with a wide hall."));
    }

    #[test]
    fn defaults_and_clamps() {
        let request = GenerationParams::default().request("  rain  ").unwrap();
        assert_eq!(request.prompt, "rain");
        assert_eq!(request.guidance_scale, 15.0);
        assert_eq!(request.duration, 10);
        assert!(request.instrumental);
        assert_eq!(request.scheduler, Scheduler::Euler);
        assert_eq!(request.guidance_type, GuidanceType::Cfg);

        let params = GenerationParams {
            guidance_scale: -3.0,
            duration: 600.0,
            ..Default::default()
        };
        let request = params.request("x").unwrap();
        assert_eq!(request.guidance_scale, 0.0);
        assert_eq!(request.duration, 60);

        let params = GenerationParams {
            duration: 0.2,
            ..Default::default()
        };
        assert_eq!(params.request("x").unwrap().duration, 1);
    }

    #[test]
    fn rejects_invalid_requests() {
        assert!(matches!(
            GenerationParams::default().request("   "),
            Err(EngineError::InvalidRequest(_))
        ));
        let params = GenerationParams {
            duration: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            params.request("x"),
            Err(EngineError::InvalidRequest(_))
        ));
    }

    #[test]
    fn only_present_optionals_are_serialized() {
        let params = GenerationParams {
            number_of_steps: Some(27.6),
            tag_guidance_scale: Some(f64::INFINITY),
            guidance_type: GuidanceType::CfgStar,
            ..Default::default()
        };
        let json = serde_json::to_value(params.request("x").unwrap()).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["number_of_steps"], 28);
        assert_eq!(obj["guidance_type"], "cfg_star");
        assert_eq!(obj["scheduler"], "euler");
        assert!(!obj.contains_key("tag_guidance_scale"));
        assert!(!obj.contains_key("lyric_guidance_scale"));
        assert!(!obj.contains_key("granularity_scale"));
    }

    #[test]
    fn result_without_url_is_a_collaborator_error() {
        let result: GenerationResult =
            serde_json::from_str(r#"{ "request_id": "abc", "audio": {} }"#).unwrap();
        let err = result.audio_url().unwrap_err();
        assert!(matches!(err, EngineError::Collaborator(ref m) if m.contains("abc")));

        let result: GenerationResult =
            serde_json::from_str(r#"{ "audio": { "url": "https://cdn/x.wav" } }"#).unwrap();
        assert_eq!(result.audio_url().unwrap(), "https://cdn/x.wav");
    }

    #[test]
    fn credentials_prefer_explicit_key() {
        let creds = CollaboratorCredentials::resolve(Some(" key-123 ")).unwrap();
        assert_eq!(creds.api_key(), "key-123");
        assert!(!format!("{creds:?}").contains("key-123"));

        let err = CollaboratorCredentials::from_env_var("SONIC_PALETTE_UNSET_TEST_KEY").unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    struct EchoGenerator;

    impl AudioGenerator for EchoGenerator {
        fn generate<'a>(
            &'a self,
            request: &'a GenerationRequest,
        ) -> CollabFuture<'a, GenerationResult> {
            Box::pin(async move {
                Ok(GenerationResult {
                    audio: Some(GeneratedAudio {
                        url: Some(format!("mem://{}s.wav", request.duration)),
                        ..Default::default()
                    }),
                    request_id: Some("req-1".into()),
                })
            })
        }
    }

    #[tokio::test]
    async fn generation_flow_yields_a_loadable_url() {
        let clip = generate_for_profile(&EchoGenerator, &GenerationParams::default(), &profile())
            .await
            .unwrap();
        assert_eq!(clip.audio_url, "mem://10s.wav");
        assert_eq!(clip.source_bpm, Some(96.0));
        assert!(clip.prompt.contains("96 BPM"));
    }
}

//! Mix-state resolution: what a track's player should be set to, given the
//! whole track list and the engine's global tempo.

use crate::track::Track;

/// Tracks detune by at most an octave either way.
pub const MAX_TRACK_PITCH_SEMITONES: f64 = 12.0;

/// Parameters pushed to one clip player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMix {
    pub audible: bool,
    /// Configured volume, or 0 when the track is not audible.
    pub volume: f64,
    /// `target / original` tempo, or 1 without both.
    pub playback_rate: f64,
    pub detune_semitones: f64,
    pub low_eq_gain_db: f64,
    pub high_eq_gain_db: f64,
}

/// `Some(bpm)` only for positive, finite tempos.
pub fn usable_bpm(bpm: Option<f64>) -> Option<f64> {
    bpm.filter(|b| b.is_finite() && *b > 0.0)
}

/// Whether any track in the list is soloed.
pub fn any_soloed(tracks: &[Track]) -> bool {
    tracks.iter().any(|t| t.is_soloed)
}

impl TrackMix {
    /// Solo wins over mute: with any solo active only soloed tracks play.
    pub fn resolve(track: &Track, any_soloed: bool, global_target_bpm: Option<f64>) -> Self {
        let audible = if any_soloed {
            track.is_soloed
        } else {
            !track.is_muted
        };

        let original = usable_bpm(track.source_bpm)
            .or_else(|| track.profile.as_ref().and_then(|p| p.tempo()));
        let target = usable_bpm(track.target_bpm).or(usable_bpm(global_target_bpm));
        let playback_rate = match (target, original) {
            (Some(target), Some(original)) => target / original,
            _ => 1.0,
        };

        TrackMix {
            audible,
            volume: if audible { track.volume } else { 0.0 },
            playback_rate,
            detune_semitones: track
                .pitch_semitones
                .clamp(-MAX_TRACK_PITCH_SEMITONES, MAX_TRACK_PITCH_SEMITONES),
            low_eq_gain_db: track.low_eq_gain_db,
            high_eq_gain_db: track.high_eq_gain_db,
        }
    }

    /// Resolve every track in list order.
    pub fn resolve_all(tracks: &[Track], global_target_bpm: Option<f64>) -> Vec<(String, TrackMix)> {
        let soloed = any_soloed(tracks);
        tracks
            .iter()
            .map(|t| (t.id.clone(), Self::resolve(t, soloed, global_target_bpm)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::SonicProfile;

    fn track(id: &str, muted: bool, soloed: bool) -> Track {
        Track {
            is_muted: muted,
            is_soloed: soloed,
            ..Track::new(id)
        }
    }

    #[test]
    fn tempo_ratio_is_target_over_source() {
        let t = Track {
            source_bpm: Some(120.0),
            target_bpm: Some(90.0),
            ..Track::new("a")
        };
        assert_eq!(TrackMix::resolve(&t, false, Some(140.0)).playback_rate, 0.75);
    }

    #[test]
    fn global_target_fills_in_and_profile_tempo_is_the_fallback_source() {
        let mut profile = SonicProfile::default();
        profile.musical_parameters.tempo = 100.0;
        let t = Track {
            profile: Some(profile),
            target_bpm: Some(-5.0),
            ..Track::new("a")
        };
        assert_eq!(TrackMix::resolve(&t, false, Some(150.0)).playback_rate, 1.5);
    }

    #[test]
    fn no_original_tempo_means_unit_rate() {
        let t = Track {
            target_bpm: Some(90.0),
            source_bpm: Some(f64::NAN),
            ..Track::new("a")
        };
        assert_eq!(TrackMix::resolve(&t, false, Some(60.0)).playback_rate, 1.0);

        let t = Track {
            source_bpm: Some(120.0),
            ..Track::new("b")
        };
        assert_eq!(TrackMix::resolve(&t, false, None).playback_rate, 1.0);
    }

    #[test]
    fn solo_overrides_everything() {
        let tracks = vec![track("a", false, true), track("b", false, false)];
        let mix = TrackMix::resolve_all(&tracks, None);
        assert!(mix[0].1.audible && mix[0].1.volume > 0.0);
        assert!(!mix[1].1.audible);
        assert_eq!(mix[1].1.volume, 0.0);
    }

    #[test]
    fn mute_applies_without_solo() {
        let tracks = vec![track("a", true, false), track("b", false, false)];
        let mix = TrackMix::resolve_all(&tracks, None);
        assert_eq!(mix[0].1.volume, 0.0);
        assert_eq!(mix[1].1.volume, 0.8);
    }

    #[test]
    fn muted_and_soloed_is_audible() {
        let tracks = vec![track("a", true, true), track("b", false, true), track("c", false, false)];
        let mix = TrackMix::resolve_all(&tracks, None);
        assert!(mix[0].1.audible);
        assert!(mix[1].1.audible);
        assert!(!mix[2].1.audible);
    }
}

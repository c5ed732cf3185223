use std::io::Cursor;

use approx::assert_abs_diff_eq;
use sonicpalette_core::{EngineError, MemoryFetcher, MixEngine, Track};

const OUTPUT_RATE: f64 = 48000.0;
const BLOCK: usize = 128;

fn wav(seconds: f64, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut out), spec).unwrap();
        let frames = (seconds * sample_rate as f64) as usize;
        for i in 0..frames {
            let phase = 2.0 * std::f64::consts::PI * 330.0 * i as f64 / sample_rate as f64;
            let s = (0.25 * phase.sin() * 32767.0) as i16;
            writer.write_sample(s).unwrap();
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    out
}

fn render(engine: &mut MixEngine, seconds: f64) -> f32 {
    let blocks = (seconds * OUTPUT_RATE / BLOCK as f64).round() as usize;
    let mut peak = 0.0f32;
    for _ in 0..blocks {
        let mut left = vec![0.0; BLOCK];
        let mut right = vec![0.0; BLOCK];
        engine.render(&mut left, &mut right);
        for s in left.iter().chain(&right) {
            assert!(s.abs() <= 1.0);
            peak = peak.max(s.abs());
        }
    }
    peak
}

fn engine() -> MixEngine {
    let fetcher = MemoryFetcher::new()
        .with_source("https://cdn.test/drums.wav", wav(2.0, 44100))
        .with_source("https://cdn.test/bass.wav", wav(3.0, 22050));
    MixEngine::new().with_fetcher(fetcher)
}

#[tokio::test]
async fn load_play_and_follow_the_track_list() {
    let mut engine = engine();
    let mut drums = Track::new("drums");
    drums.source_bpm = Some(100.0);
    drums.target_bpm = Some(120.0);
    engine.update_tracks(vec![drums, Track::new("bass")]);

    let buffer = engine
        .load_track_from_url("drums", "https://cdn.test/drums.wav")
        .await
        .unwrap();
    assert_eq!(buffer.sample_rate(), 44100);
    assert_abs_diff_eq!(buffer.duration(), 2.0, epsilon = 1e-4);
    engine
        .load_track_from_url("bass", "https://cdn.test/bass.wav")
        .await
        .unwrap();

    engine.play_all().unwrap();
    let peak = render(&mut engine, 1.0);
    assert!(peak > 0.01, "mix should be audible, peak {peak}");

    // 1 s of audio clock at 1.2x covers 1.2 s of a 2 s clip
    assert_abs_diff_eq!(engine.track_current_time("drums"), 1.2, epsilon = 1e-6);
    assert_abs_diff_eq!(engine.track_current_time("bass"), 1.0, epsilon = 1e-6);

    // Dropping a track releases its player and the mix carries on
    engine.update_tracks(vec![Track::new("bass")]);
    assert!(engine.track_audio_buffer("drums").is_none());
    assert!(engine.is_track_playing("bass"));
    assert!(engine.visualizer_audio_buffer().is_some());

    engine.stop_all();
    assert!(!engine.is_track_playing("bass"));
    assert_eq!(engine.track_current_time("bass"), 0.0);
}

#[tokio::test]
async fn a_bad_source_does_not_disturb_the_others() {
    let mut engine = engine();
    engine.update_tracks(vec![Track::new("a"), Track::new("b")]);
    engine
        .load_track_from_url("a", "https://cdn.test/drums.wav")
        .await
        .unwrap();

    let err = engine
        .load_track_from_url("b", "https://cdn.test/missing.wav")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Load { .. }));
    assert!(engine.track_player("b").is_none());

    engine.play_all().unwrap();
    assert!(engine.is_track_playing("a"));
    assert!(!engine.is_track_playing("b"));
}

#[tokio::test]
async fn capture_the_master_mix() {
    let mut engine = engine();
    engine.load_from_url("https://cdn.test/drums.wav").await.unwrap();
    engine.play().unwrap();
    engine.start_recording().unwrap();
    render(&mut engine, 1.0);

    let blob = engine.stop_recording().await.unwrap().unwrap();
    assert_eq!(blob.mime_type, "audio/wav");

    let reader = hound::WavReader::new(Cursor::new(blob.data)).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 48000);
    assert_eq!(reader.duration(), 48000);
}

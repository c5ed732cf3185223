//! Decoding clip bytes into an [`AudioBuffer`].
//!
//! The container is sniffed from the first bytes rather than trusted from a
//! URL or file name: generation backends serve WAV and MP3 under arbitrary
//! paths.

use std::io::Cursor;
use std::path::Path;

use crate::dsp::sampler::AudioBuffer;
use crate::error::{EngineError, Result};

/// MIME types the strict WAV loader accepts.
pub const WAV_MIME_TYPES: [&str; 3] = ["audio/wav", "audio/x-wav", "audio/wave"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Wav,
    Mp3,
}

fn sniff(bytes: &[u8]) -> Option<Container> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(Container::Wav);
    }
    if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0)
    {
        return Some(Container::Mp3);
    }
    None
}

/// Decode WAV (and MP3 with the `mp3` feature) into planar `f32`.
pub fn decode_audio(bytes: &[u8]) -> Result<AudioBuffer> {
    let buffer = match sniff(bytes) {
        Some(Container::Wav) => decode_wav(bytes)?,
        Some(Container::Mp3) => decode_mp3(bytes)?,
        None => {
            return Err(EngineError::Decode(
                "unrecognized audio container".to_string(),
            ));
        }
    };
    if buffer.is_empty() {
        return Err(EngineError::Decode("audio contains no frames".to_string()));
    }
    Ok(buffer)
}

fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| EngineError::Decode(format!("WAV header: {e}")))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<std::result::Result<Vec<f32>, hound::Error>>()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, hound::Error>>(),
    }
    .map_err(|e| EngineError::Decode(format!("WAV data: {e}")))?;

    Ok(AudioBuffer::from_interleaved_f32(
        &samples,
        channels,
        spec.sample_rate,
    ))
}

#[cfg(feature = "mp3")]
fn decode_mp3(bytes: &[u8]) -> Result<AudioBuffer> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut pcm: Vec<i16> = Vec::new();
    let mut channels = 0usize;
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if channels == 0 {
                    channels = frame.channels;
                    sample_rate = frame.sample_rate as u32;
                }
                // Frames with a different layout would break interleaving
                if frame.channels == channels {
                    pcm.extend_from_slice(&frame.data);
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(EngineError::Decode(format!("MP3: {e:?}"))),
        }
    }

    if channels == 0 {
        return Err(EngineError::Decode("MP3 contains no frames".to_string()));
    }
    Ok(AudioBuffer::from_interleaved_i16(&pcm, channels, sample_rate))
}

#[cfg(not(feature = "mp3"))]
fn decode_mp3(_bytes: &[u8]) -> Result<AudioBuffer> {
    Err(EngineError::Decode(
        "MP3 support is not enabled (build with the `mp3` feature)".to_string(),
    ))
}

/// A user-picked file: name, declared MIME type, and contents.
#[derive(Debug, Clone)]
pub struct ClipFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ClipFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        ClipFile {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, guessing the MIME type from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).map_err(|e| EngineError::load(path.display().to_string(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("wav") => "audio/wav",
            Some(ext) if ext.eq_ignore_ascii_case("mp3") => "audio/mpeg",
            _ => "",
        };
        Ok(ClipFile::new(name, mime_type, bytes))
    }

    /// Whether the strict WAV loader accepts this file: a `.wav` name or a
    /// WAV MIME type.
    pub fn is_wav(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(".wav")
            || WAV_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

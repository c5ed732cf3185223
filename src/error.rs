//! Engine error taxonomy.
//!
//! Every failure carries the operation or origin it came from so the UI layer
//! can show a message without inspecting engine internals.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Source bytes could not be acquired (non-2xx response, unreadable file).
    #[error("failed to load audio from {origin}: {reason}")]
    Load { origin: String, reason: String },

    /// Bytes were acquired but are not decodable audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// The strict WAV loader rejected a file.
    #[error("unsupported file '{name}': only WAV files are supported")]
    UnsupportedFormat { name: String },

    /// A transport operation needs a decoded buffer.
    #[error("{operation}: no audio loaded")]
    NotLoaded { operation: &'static str },

    /// The media recorder reported an error during capture.
    #[error("recording failed: {0}")]
    Recording(String),

    /// A collaborator endpoint or key is missing.
    #[error("missing configuration: {0}")]
    Configuration(String),

    /// A collaborator request failed validation before it was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A collaborator answered without the data the engine needs.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl EngineError {
    pub(crate) fn load(origin: impl Into<String>, reason: impl ToString) -> Self {
        EngineError::Load {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_origin() {
        let err = EngineError::load("https://cdn.example/clip.wav", "HTTP 404 Not Found");
        assert_eq!(
            err.to_string(),
            "failed to load audio from https://cdn.example/clip.wav: HTTP 404 Not Found"
        );

        let err = EngineError::NotLoaded { operation: "play" };
        assert_eq!(err.to_string(), "play: no audio loaded");
    }
}

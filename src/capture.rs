//! Capture pipeline: records the master output through a media recorder.
//!
//! `Idle → Recording → Idle`. The recorder is fed from the bus's recording
//! tap on every rendered block and reports back over a channel, the way a
//! platform recorder fires `dataavailable`, `stop`, and `error` events.

use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, error::TryRecvError, unbounded_channel};

use crate::context::AudioContext;
use crate::error::{EngineError, Result};

/// Container/codec preference, best first.
pub const PREFERRED_MIME_TYPES: [&str; 3] = [
    "audio/webm;codecs=opus",
    "audio/webm",
    "audio/ogg;codecs=opus",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// An encoded chunk.
    DataAvailable(Vec<u8>),
    /// The recorder has delivered its last chunk.
    Stopped,
    Error(String),
}

/// A sink that encodes the recording tap.
pub trait MediaRecorder {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Container used when none of the preferred types is supported.
    fn default_mime_type(&self) -> &str;

    /// Begin a session. Events for it go to `events`.
    fn start(
        &mut self,
        mime_type: &str,
        sample_rate: u32,
        events: UnboundedSender<RecorderEvent>,
    ) -> Result<()>;

    /// One block of the master output.
    fn write(&mut self, left: &[f32], right: &[f32]);

    /// Flush and finish. Must eventually send `Stopped` (or `Error`).
    fn request_stop(&mut self);
}

/// The finished capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedBlob {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Resolves once the recorder has delivered its final chunk.
pub type RecordingFuture = Pin<Box<dyn Future<Output = Result<Option<RecordedBlob>>>>>;

/// Pick the first preferred type the recorder supports, else its default.
pub fn select_mime_type(recorder: &dyn MediaRecorder) -> String {
    PREFERRED_MIME_TYPES
        .iter()
        .find(|mime| recorder.is_type_supported(mime))
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| recorder.default_mime_type().to_string())
}

struct Session {
    mime_type: String,
    events: UnboundedReceiver<RecorderEvent>,
    chunks: Vec<Vec<u8>>,
}

pub struct CapturePipeline {
    recorder: Box<dyn MediaRecorder>,
    session: Option<Session>,
    /// Error reported while recording, surfaced by the next stop.
    last_error: Option<String>,
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("recording", &self.is_recording())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl CapturePipeline {
    pub fn new(recorder: Box<dyn MediaRecorder>) -> Self {
        CapturePipeline {
            recorder,
            session: None,
            last_error: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Resume the context and start a session. Already recording is a
    /// logged no-op.
    pub fn start(&mut self, ctx: &mut AudioContext) -> Result<()> {
        ctx.resume();
        if self.is_recording() {
            log::warn!("start_recording called while already recording");
            return Ok(());
        }

        let mime_type = select_mime_type(self.recorder.as_ref());
        let (tx, rx) = unbounded_channel();
        self.recorder
            .start(&mime_type, ctx.sample_rate() as u32, tx)
            .map_err(|e| EngineError::Recording(e.to_string()))?;

        log::info!("recording started ({mime_type})");
        if let Some(message) = self.last_error.take() {
            log::warn!("discarding unreported recorder error: {message}");
        }
        self.session = Some(Session {
            mime_type,
            events: rx,
            chunks: Vec::new(),
        });
        Ok(())
    }

    /// Feed a rendered block to the recorder and collect whatever it emitted.
    pub(crate) fn write(&mut self, left: &[f32], right: &[f32]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        self.recorder.write(left, right);

        loop {
            match session.events.try_recv() {
                Ok(RecorderEvent::DataAvailable(chunk)) => {
                    if !chunk.is_empty() {
                        session.chunks.push(chunk);
                    }
                }
                Ok(RecorderEvent::Stopped) | Err(TryRecvError::Empty) => break,
                Ok(RecorderEvent::Error(message)) => {
                    log::warn!("recorder error: {message}");
                    self.recorder.request_stop();
                    self.last_error = Some(message);
                    self.session = None;
                    break;
                }
                Err(TryRecvError::Disconnected) => {
                    log::warn!("recorder went away mid-recording");
                    self.last_error = Some("recorder disconnected".to_string());
                    self.session = None;
                    break;
                }
            }
        }
    }

    /// Stop the session. The returned future owns everything it needs, so
    /// the engine can keep rendering while it waits for the final chunk.
    ///
    /// Resolves to `None` when nothing was captured. The pipeline is idle
    /// as soon as this returns, whatever the outcome.
    pub fn stop(&mut self) -> RecordingFuture {
        if let Some(message) = self.last_error.take() {
            self.session = None;
            return Box::pin(async move { Err(EngineError::Recording(message)) });
        }
        let Some(session) = self.session.take() else {
            return Box::pin(async { Ok(None) });
        };

        self.recorder.request_stop();
        Box::pin(async move {
            let Session {
                mime_type,
                mut events,
                mut chunks,
            } = session;

            while let Some(event) = events.recv().await {
                match event {
                    RecorderEvent::DataAvailable(chunk) => {
                        if !chunk.is_empty() {
                            chunks.push(chunk);
                        }
                    }
                    RecorderEvent::Stopped => break,
                    RecorderEvent::Error(message) => {
                        return Err(EngineError::Recording(message));
                    }
                }
            }

            if chunks.is_empty() {
                log::info!("recording stopped with nothing captured");
                return Ok(None);
            }
            let data = chunks.concat();
            log::info!("recording stopped: {} bytes of {mime_type}", data.len());
            Ok(Some(RecordedBlob { data, mime_type }))
        })
    }
}

/// Records 16-bit PCM WAV. The whole file is delivered as one chunk on stop.
#[derive(Debug, Default)]
pub struct WavRecorder {
    sample_rate: u32,
    samples: Vec<i16>,
    events: Option<UnboundedSender<RecorderEvent>>,
}

impl WavRecorder {
    pub const MIME_TYPE: &'static str = "audio/wav";

    pub fn new() -> Self {
        Self::default()
    }

    fn encode(&self) -> std::result::Result<Vec<u8>, hound::Error> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut output = Vec::new();
        let mut writer = hound::WavWriter::new(Cursor::new(&mut output), spec)?;
        for &s in &self.samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
        Ok(output)
    }
}

impl MediaRecorder for WavRecorder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == Self::MIME_TYPE
    }

    fn default_mime_type(&self) -> &str {
        Self::MIME_TYPE
    }

    fn start(
        &mut self,
        _mime_type: &str,
        sample_rate: u32,
        events: UnboundedSender<RecorderEvent>,
    ) -> Result<()> {
        self.sample_rate = sample_rate;
        self.samples.clear();
        self.events = Some(events);
        Ok(())
    }

    fn write(&mut self, left: &[f32], right: &[f32]) {
        if self.events.is_none() {
            return;
        }
        for (l, r) in left.iter().zip(right) {
            self.samples.push((l.clamp(-1.0, 1.0) * 32767.0) as i16);
            self.samples.push((r.clamp(-1.0, 1.0) * 32767.0) as i16);
        }
    }

    fn request_stop(&mut self) {
        let Some(events) = self.events.take() else {
            return;
        };
        // A closed receiver means nobody waits for the result
        if !self.samples.is_empty() {
            match self.encode() {
                Ok(bytes) => {
                    let _ = events.send(RecorderEvent::DataAvailable(bytes));
                }
                Err(e) => {
                    let _ = events.send(RecorderEvent::Error(e.to_string()));
                }
            }
        }
        let _ = events.send(RecorderEvent::Stopped);
        self.samples = Vec::new();
    }
}

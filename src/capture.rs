//! Voice input capabilities.
//!
//! Chained mode recognizes speech locally and sends the transcript as text.
//! Realtime mode streams raw microphone samples. Both sit behind traits so
//! the chat session can run headless and in tests.

use crate::error::CaptureError;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    /// One recognition result. Interim results are superseded by the next one.
    Result { transcript: String, is_final: bool },
    Error(CaptureError),
    /// The engine stopped on its own.
    Ended,
}

pub type SpeechNotifier = mpsc::UnboundedSender<SpeechEvent>;

/// Continuous speech recognition with interim results.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechCapture: Send {
    fn start(&mut self, locale: &str, events: SpeechNotifier) -> Result<(), CaptureError>;
    fn stop(&mut self);
}

/// Mono f32 samples at the requested rate.
pub type FrameSink = mpsc::Sender<Vec<f32>>;

#[cfg_attr(test, mockall::automock)]
pub trait MicrophoneCapture: Send {
    fn start(&mut self, sample_rate: u32, frames: FrameSink) -> Result<(), CaptureError>;
    /// Releases the device before returning.
    fn stop(&mut self);
}

/// Used when the host has no recognizer.
pub struct NoSpeech;

impl SpeechCapture for NoSpeech {
    fn start(&mut self, _locale: &str, _events: SpeechNotifier) -> Result<(), CaptureError> {
        Err(CaptureError::Unavailable)
    }

    fn stop(&mut self) {}
}

/// Used when no microphone backend is compiled in.
pub struct NoMicrophone;

impl MicrophoneCapture for NoMicrophone {
    fn start(&mut self, _sample_rate: u32, _frames: FrameSink) -> Result<(), CaptureError> {
        Err(CaptureError::Failed("no microphone backend".to_string()))
    }

    fn stop(&mut self) {}
}

/// Builds the running transcript from recognition results.
///
/// Finalized segments accumulate, each followed by a space; the latest
/// interim segment is shown after them until it is finalized or replaced.
#[derive(Debug, Default, Clone)]
pub struct TranscriptAccumulator {
    finalized: String,
    interim: String,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, transcript: &str, is_final: bool) {
        if is_final {
            self.finalized.push_str(transcript);
            self.finalized.push(' ');
            self.interim.clear();
        } else {
            self.interim = transcript.to_string();
        }
    }

    pub fn current(&self) -> String {
        format!("{}{}", self.finalized, self.interim)
    }

    /// The text to send when capture stops.
    pub fn finish(&self) -> String {
        self.current().trim().to_string()
    }
}

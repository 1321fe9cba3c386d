//! Audio output.
//!
//! Chained mode plays one synthesized file per assistant message through
//! [`PlaybackController`]; at most one message is active at a time. Realtime
//! mode schedules decoded PCM16 chunks on an [`AudioContext`] as they arrive.

use crate::error::PlaybackError;
use tokio::sync::mpsc;
use voice_tutor_types::audio::PCM16_SAMPLE_RATE;

/// Completion notices from a playing element, keyed by message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Ended(String),
    Failed(String),
}

pub type PlaybackNotifier = mpsc::UnboundedSender<PlaybackEvent>;

/// A loaded audio file.
#[cfg_attr(test, mockall::automock)]
pub trait AudioElement: Send {
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    /// `volume` is in `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);
}

/// Opens audio elements for message URLs.
///
/// The element reports `Ended`/`Failed` for `message_id` on `events` when
/// playback finishes on its own.
#[cfg_attr(test, mockall::automock)]
pub trait AudioBackend: Send {
    fn load(
        &mut self,
        message_id: &str,
        url: &str,
        events: PlaybackNotifier,
    ) -> Result<Box<dyn AudioElement>, PlaybackError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackState {
    pub active: Option<String>,
    pub playing: bool,
    /// 0 to 100
    pub volume: u8,
}

struct ActiveElement {
    message_id: String,
    element: Box<dyn AudioElement>,
}

pub struct PlaybackController {
    backend: Box<dyn AudioBackend>,
    notifier: PlaybackNotifier,
    active: Option<ActiveElement>,
    playing: bool,
    volume: u8,
}

impl PlaybackController {
    pub const DEFAULT_VOLUME: u8 = 100;

    pub fn new(backend: Box<dyn AudioBackend>, notifier: PlaybackNotifier) -> Self {
        Self {
            backend,
            notifier,
            active: None,
            playing: false,
            volume: Self::DEFAULT_VOLUME,
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            active: self.active.as_ref().map(|a| a.message_id.clone()),
            playing: self.playing,
            volume: self.volume,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn gain(&self) -> f32 {
        f32::from(self.volume) / 100.0
    }

    /// Play/pause for one message.
    ///
    /// Toggling the active message pauses or resumes it in place. Toggling any
    /// other message releases the current element first, so two messages never
    /// play at once.
    pub fn toggle(&mut self, message_id: &str, url: &str) -> PlaybackState {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|a| a.message_id == message_id);

        if is_active {
            if self.playing {
                self.pause();
            } else {
                self.resume();
            }
            return self.state();
        }

        self.stop();
        let mut element = match self
            .backend
            .load(message_id, url, self.notifier.clone())
        {
            Ok(element) => element,
            Err(e) => {
                tracing::warn!("failed to load audio for {}: {}", message_id, e);
                return self.state();
            }
        };
        element.set_volume(self.gain());
        if let Err(e) = element.play() {
            tracing::warn!("failed to play audio for {}: {}", message_id, e);
            return self.state();
        }
        self.active = Some(ActiveElement {
            message_id: message_id.to_string(),
            element,
        });
        self.playing = true;
        self.state()
    }

    pub fn pause(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.element.pause();
            self.playing = false;
        }
    }

    pub fn resume(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match active.element.play() {
            Ok(()) => self.playing = true,
            Err(e) => {
                tracing::warn!("failed to resume {}: {}", active.message_id, e);
                self.stop();
            }
        }
    }

    /// Sets the volume, clamped to 100, and applies it to the active element.
    pub fn set_volume(&mut self, volume: u8) -> PlaybackState {
        self.volume = volume.min(100);
        let gain = self.gain();
        if let Some(active) = self.active.as_mut() {
            active.element.set_volume(gain);
        }
        self.state()
    }

    /// Resets when the element for the active message ends or fails.
    /// Notices for elements already released are ignored.
    pub fn handle_event(&mut self, event: PlaybackEvent) -> PlaybackState {
        let (PlaybackEvent::Ended(message_id) | PlaybackEvent::Failed(message_id)) = &event;
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|a| &a.message_id == message_id);
        if is_active {
            if let PlaybackEvent::Failed(_) = event {
                tracing::warn!("playback failed for {}", message_id);
            }
            self.active = None;
            self.playing = false;
        }
        self.state()
    }

    /// Releases the active element.
    pub fn stop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.element.pause();
        }
        self.playing = false;
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// An output clock that plays buffers as soon as they are started.
pub trait AudioContext: Send {
    fn sample_rate(&self) -> u32;
    fn start_buffer(&mut self, samples: Vec<f32>) -> Result<(), PlaybackError>;
    fn close(&mut self);
}

pub trait AudioContextFactory: Send {
    fn open(&mut self, sample_rate: u32) -> Result<Box<dyn AudioContext>, PlaybackError>;
}

/// Used when no audio output is available. Every load and open fails, which
/// the controller and player treat as a silent reset.
pub struct NoAudio;

impl AudioBackend for NoAudio {
    fn load(
        &mut self,
        _message_id: &str,
        url: &str,
        _events: PlaybackNotifier,
    ) -> Result<Box<dyn AudioElement>, PlaybackError> {
        Err(PlaybackError::Unavailable(format!("cannot play {}", url)))
    }
}

impl AudioContextFactory for NoAudio {
    fn open(&mut self, _sample_rate: u32) -> Result<Box<dyn AudioContext>, PlaybackError> {
        Err(PlaybackError::Unavailable("no output device".to_string()))
    }
}

/// Plays realtime assistant speech.
///
/// Chunks are started the moment they arrive with no gapless scheduling, so
/// consecutive chunks may overlap or leave small gaps.
#[derive(Default)]
pub struct RealtimePlayer {
    context: Option<Box<dyn AudioContext>>,
    chunks_played: u64,
}

impl RealtimePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a context at the PCM16 stream rate, replacing any open one.
    pub fn open(&mut self, factory: &mut dyn AudioContextFactory) -> Result<(), PlaybackError> {
        let context = factory.open(PCM16_SAMPLE_RATE)?;
        self.attach(context);
        Ok(())
    }

    pub fn attach(&mut self, context: Box<dyn AudioContext>) {
        self.close();
        self.context = Some(context);
    }

    pub fn is_open(&self) -> bool {
        self.context.is_some()
    }

    pub fn chunks_played(&self) -> u64 {
        self.chunks_played
    }

    /// Decodes one base64 PCM16 chunk and starts it. Returns the sample count.
    pub fn play_chunk(&mut self, audio: &str) -> Result<usize, PlaybackError> {
        let Some(context) = self.context.as_mut() else {
            return Err(PlaybackError::Unavailable("no audio context".to_string()));
        };
        let samples = voice_tutor_utils::audio::decode_f32(audio)
            .map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let count = samples.len();
        context.start_buffer(samples)?;
        self.chunks_played += 1;
        Ok(count)
    }

    pub fn close(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.close();
        }
    }
}

impl Drop for RealtimePlayer {
    fn drop(&mut self) {
        self.close();
    }
}

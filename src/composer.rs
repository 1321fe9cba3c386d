//! Outbound message composer.
//!
//! Turns learner input into client envelopes: trimmed text turns, fixed-size
//! PCM16 frames while a realtime recording runs, and the commit sentinel that
//! ends a recording.

use crate::error::{ClientError, Result};
use crate::gateway::Outbound;
use voice_tutor_types::audio::FRAME_SIZE;
use voice_tutor_types::{ClientEvent, ConnectionState};
use voice_tutor_utils::audio::{FrameAccumulator, encode_f32};

pub struct Composer {
    outbound: Option<Outbound>,
    frames: FrameAccumulator,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    pub fn new() -> Self {
        Self {
            outbound: None,
            frames: FrameAccumulator::new(FRAME_SIZE),
        }
    }

    pub fn attach(&mut self, outbound: Outbound) {
        self.outbound = Some(outbound);
    }

    pub fn detach(&mut self) {
        self.outbound = None;
        self.frames.clear();
    }

    pub fn state(&self) -> ConnectionState {
        self.outbound
            .as_ref()
            .map(Outbound::state)
            .unwrap_or_default()
    }

    fn outbound(&self) -> Result<&Outbound> {
        self.outbound
            .as_ref()
            .ok_or(ClientError::NotConnected(ConnectionState::Disconnected))
    }

    /// Sends one text turn. `text` must already be trimmed and non-empty.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.outbound()?.send(ClientEvent::text(text)).await
    }

    /// Buffers captured samples and sends every full frame.
    ///
    /// Frames completed while the channel is down are discarded, not queued.
    /// Returns the number of frames written.
    pub async fn stream_samples(&mut self, samples: &[f32]) -> Result<usize> {
        let frames = self.frames.push(samples);
        let mut sent = 0;
        for frame in frames {
            if self.send_frame(&frame).await? {
                sent += 1;
            }
        }
        Ok(sent)
    }

    async fn send_frame(&self, frame: &[f32]) -> Result<bool> {
        let outbound = self.outbound()?;
        if !outbound.state().is_connected() {
            tracing::debug!("skipping {} samples while {}", frame.len(), outbound.state());
            return Ok(false);
        }
        outbound.send(ClientEvent::audio(encode_f32(frame))).await?;
        Ok(true)
    }

    /// Ends a realtime recording: flushes the partial frame, then sends the
    /// commit sentinel. Nothing is written when the channel is down.
    pub async fn commit_audio(&mut self) -> Result<()> {
        let partial = self.frames.flush();
        if !self.state().is_connected() {
            tracing::debug!("dropping audio commit while {}", self.state());
            return Ok(());
        }
        if let Some(frame) = partial {
            self.send_frame(&frame).await?;
        }
        self.outbound()?.send(ClientEvent::AudioCommit).await
    }

    pub fn reset_audio(&mut self) {
        self.frames.clear();
    }

    pub fn buffered_samples(&self) -> usize {
        self.frames.buffered()
    }
}

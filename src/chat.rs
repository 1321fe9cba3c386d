//! The chat session context.
//!
//! [`ChatSession`] owns every resource scoped to one open chat: the gateway
//! channel, conversation state, playback and capture. Each discrete event has
//! its own handler, and [`ChatSession::run`] feeds them one at a time in
//! arrival order. Dropping the session releases everything.

use crate::capture::{
    FrameSink, MicrophoneCapture, NoMicrophone, NoSpeech, SpeechCapture, SpeechEvent, SpeechNotifier,
    TranscriptAccumulator,
};
use crate::composer::Composer;
use crate::config::Config;
use crate::conversation::Conversation;
use crate::dispatcher::Dispatcher;
use crate::error::{CaptureError, ClientError, Result};
use crate::gateway::{Gateway, InboundRx, Stats, gateway_url};
use crate::playback::{
    AudioBackend, AudioContextFactory, NoAudio, PlaybackController, PlaybackEvent, PlaybackState,
    RealtimePlayer,
};
use crate::service::{SessionService, poll_transcription};
use crate::suggestions;
use crate::view::{ViewEvent, ViewTx};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use voice_tutor_types::audio::PCM16_SAMPLE_RATE;
use voice_tutor_types::session::Suggestion;
use voice_tutor_types::{ArchitectureMode, ConnectionState, Message, Session, SpokenLanguage};

const MIC_FRAME_CAPACITY: usize = 64;
const NO_RESPONSE_TEXT: &str = "Error: No response received. Please try again.";

/// Host capabilities the session drives.
pub struct Capabilities {
    pub speech: Box<dyn SpeechCapture>,
    pub microphone: Box<dyn MicrophoneCapture>,
    pub audio: Box<dyn AudioBackend>,
    pub audio_context: Box<dyn AudioContextFactory>,
}

impl Capabilities {
    /// No voice input or audio output; text chat only.
    pub fn headless() -> Self {
        Self {
            speech: Box::new(NoSpeech),
            microphone: Box::new(NoMicrophone),
            audio: Box::new(NoAudio),
            audio_context: Box::new(NoAudio),
        }
    }
}

/// Learner actions.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Text(String),
    ToggleRecording,
    StartRecording,
    StopRecording,
    TogglePlayback(String),
    Volume(u8),
    SubmitRecording { audio: Vec<u8>, filename: String },
    DownloadTranscript(Option<PathBuf>),
    Quit,
}

/// Result of polling for an uploaded recording's transcription.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Transcribed(String),
    NotReady,
    Failed(String),
}

enum Recording {
    Idle,
    Speech(TranscriptAccumulator),
    Realtime,
}

struct Receivers {
    speech: mpsc::UnboundedReceiver<SpeechEvent>,
    frames: mpsc::Receiver<Vec<f32>>,
    playback: mpsc::UnboundedReceiver<PlaybackEvent>,
    uploads: mpsc::UnboundedReceiver<UploadOutcome>,
}

pub struct ChatSession {
    session: Session,
    mode: ArchitectureMode,
    config: Config,
    service: Arc<dyn SessionService>,
    gateway: Gateway,
    inbound: Option<InboundRx>,
    composer: Composer,
    dispatcher: Dispatcher,
    conversation: Conversation,
    playback: PlaybackController,
    realtime: RealtimePlayer,
    speech: Box<dyn SpeechCapture>,
    microphone: Box<dyn MicrophoneCapture>,
    audio_context: Box<dyn AudioContextFactory>,
    recording: Recording,
    starters: Vec<Suggestion>,
    shown_suggestions: Option<Vec<Suggestion>>,
    speech_tx: SpeechNotifier,
    frames_tx: FrameSink,
    uploads_tx: mpsc::UnboundedSender<UploadOutcome>,
    receivers: Option<Receivers>,
    upload_task: Option<JoinHandle<()>>,
    view: ViewTx,
    disposed: bool,
}

impl ChatSession {
    pub fn new(
        session: Session,
        mode: ArchitectureMode,
        config: Config,
        service: Arc<dyn SessionService>,
        capabilities: Capabilities,
        view: ViewTx,
    ) -> Self {
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::channel(MIC_FRAME_CAPACITY);
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (uploads_tx, uploads_rx) = mpsc::unbounded_channel();

        Self {
            mode,
            gateway: Gateway::new(config.channel_capacity()),
            inbound: None,
            composer: Composer::new(),
            dispatcher: Dispatcher::new(mode, config.backend_origin()),
            conversation: Conversation::new(),
            playback: PlaybackController::new(capabilities.audio, playback_tx),
            realtime: RealtimePlayer::new(),
            speech: capabilities.speech,
            microphone: capabilities.microphone,
            audio_context: capabilities.audio_context,
            recording: Recording::Idle,
            starters: suggestions::initial(session.intent()),
            shown_suggestions: None,
            speech_tx,
            frames_tx,
            uploads_tx,
            receivers: Some(Receivers {
                speech: speech_rx,
                frames: frames_rx,
                playback: playback_rx,
                uploads: uploads_rx,
            }),
            upload_task: None,
            view,
            disposed: false,
            session,
            config,
            service,
        }
    }

    /// Fetches the architecture mode and starter suggestions, then builds the
    /// session. The mode falls back to chained when the config is unavailable.
    pub async fn open(
        session: Session,
        config: Config,
        service: Arc<dyn SessionService>,
        capabilities: Capabilities,
        view: ViewTx,
    ) -> Self {
        let mode = match service.fetch_config().await {
            Ok(backend) => backend.architecture_mode(),
            Err(e) => {
                tracing::warn!("failed to fetch backend config, assuming chained: {}", e);
                ArchitectureMode::Chained
            }
        };
        tracing::info!("session {} uses {} mode", session.session_id(), mode);
        let starters =
            suggestions::starters(service.as_ref(), session.grade(), session.intent()).await;
        let mut chat = Self::new(session, mode, config, service, capabilities, view);
        chat.starters = starters;
        chat
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn mode(&self) -> ArchitectureMode {
        self.mode
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.composer.state()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn is_recording(&self) -> bool {
        !matches!(self.recording, Recording::Idle)
    }

    pub fn stats(&self) -> Stats {
        self.gateway.stats()
    }

    fn emit(&self, event: ViewEvent) {
        if self.view.send(event).is_err() {
            tracing::trace!("view closed, dropping update");
        }
    }

    /// Opens the gateway channel for this session's mode.
    ///
    /// In realtime mode an output context is opened as well; if that fails the
    /// chat continues without assistant audio.
    pub async fn connect(&mut self) -> Result<()> {
        let url = gateway_url(
            self.config.backend_origin(),
            self.mode,
            self.session.session_id(),
        )?;
        let connection = self.gateway.connect(&url).await?;
        self.composer.attach(connection.outbound);
        self.inbound = Some(connection.inbound);

        if self.mode == ArchitectureMode::Realtime {
            if let Err(e) = self.realtime.open(self.audio_context.as_mut()) {
                tracing::warn!("assistant audio disabled: {}", e);
            }
        }
        Ok(())
    }

    /// Suggestions the view should currently show.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        if self.conversation.show_suggestions() {
            self.starters.clone()
        } else if self.conversation.awaiting_learner() && !self.conversation.is_pending() {
            suggestions::contextual(self.conversation.language())
        } else {
            Vec::new()
        }
    }

    fn refresh_suggestions(&mut self) {
        let current = self.suggestions();
        if self.shown_suggestions.as_ref() != Some(&current) {
            self.shown_suggestions = Some(current.clone());
            self.emit(ViewEvent::Suggestions(current));
        }
    }

    /// Sends a typed message. Refused while a recording is in progress.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        if self.is_recording() {
            return Err(ClientError::InputBusy);
        }
        self.send_intent(text).await
    }

    async fn send_intent(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        if self.conversation.is_pending() {
            return Err(ClientError::ResponsePending);
        }
        let state = self.composer.state();
        if !state.is_connected() {
            return Err(ClientError::NotConnected(state));
        }

        if let Some(language) = SpokenLanguage::requested_in(text) {
            if self.conversation.set_language(language) {
                self.emit(ViewEvent::Language(language));
            }
        }
        self.composer.send_text(text).await?;

        let message = Message::user(text);
        self.conversation.append(message.clone());
        self.emit(ViewEvent::MessageAppended(message));
        self.conversation.begin_pending(Instant::now());
        self.emit(ViewEvent::Processing(true));
        self.conversation.hide_suggestions();
        self.refresh_suggestions();
        Ok(())
    }

    /// Starts voice input for the session's mode.
    ///
    /// Refused while a reply is pending or assistant audio is playing. A
    /// capture failure is raised as an alert and leaves the session idle.
    pub fn start_recording(&mut self) -> Result<()> {
        if self.is_recording() {
            return Err(ClientError::InputBusy);
        }
        if self.conversation.is_pending() {
            return Err(ClientError::ResponsePending);
        }
        if self.playback.is_playing() {
            return Err(ClientError::InputBusy);
        }

        match self.mode {
            ArchitectureMode::Chained => {
                let locale = self.conversation.language().locale();
                if let Err(e) = self.speech.start(locale, self.speech_tx.clone()) {
                    return Err(self.capture_failed(e));
                }
                self.recording = Recording::Speech(TranscriptAccumulator::new());
                self.conversation.set_live_transcript("");
                self.emit(ViewEvent::LiveTranscript(String::new()));
                tracing::info!("speech capture started ({})", locale);
            }
            ArchitectureMode::Realtime => {
                if let Err(e) = self.microphone.start(PCM16_SAMPLE_RATE, self.frames_tx.clone()) {
                    return Err(self.capture_failed(e));
                }
                self.composer.reset_audio();
                self.recording = Recording::Realtime;
                tracing::info!("microphone streaming started");
            }
        }
        self.emit(ViewEvent::Recording(true));
        Ok(())
    }

    fn capture_failed(&self, e: CaptureError) -> ClientError {
        tracing::warn!("capture failed: {}", e);
        self.emit(ViewEvent::Alert(e.to_string()));
        e.into()
    }

    /// Stops voice input.
    ///
    /// Speech capture sends the accumulated transcript as a text turn.
    /// Microphone streaming flushes the last partial frame and sends the commit
    /// sentinel. The device is released before anything is sent.
    pub async fn stop_recording(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.recording, Recording::Idle) {
            Recording::Idle => Ok(()),
            Recording::Speech(transcript) => {
                self.speech.stop();
                self.emit(ViewEvent::Recording(false));
                self.conversation.set_live_transcript("");
                self.emit(ViewEvent::LiveTranscript(String::new()));
                self.send_intent(&transcript.finish()).await
            }
            Recording::Realtime => {
                self.microphone.stop();
                self.emit(ViewEvent::Recording(false));
                self.composer.commit_audio().await
            }
        }
    }

    pub async fn toggle_recording(&mut self) -> Result<()> {
        if self.is_recording() {
            self.stop_recording().await
        } else {
            self.start_recording()
        }
    }

    pub async fn handle_speech_event(&mut self, event: SpeechEvent) -> Result<()> {
        match event {
            SpeechEvent::Result {
                transcript,
                is_final,
            } => {
                let current = match &mut self.recording {
                    Recording::Speech(accumulator) => {
                        accumulator.apply(&transcript, is_final);
                        accumulator.current()
                    }
                    _ => return Ok(()),
                };
                self.conversation.set_live_transcript(&current);
                self.emit(ViewEvent::LiveTranscript(current));
                Ok(())
            }
            SpeechEvent::Error(e) => {
                if !matches!(self.recording, Recording::Speech(_)) {
                    return Ok(());
                }
                self.recording = Recording::Idle;
                self.speech.stop();
                self.emit(ViewEvent::Recording(false));
                match e {
                    CaptureError::Failed(reason) => {
                        tracing::warn!("speech recognition error: {}", reason);
                    }
                    e => self.emit(ViewEvent::Alert(e.to_string())),
                }
                Ok(())
            }
            // The engine ended on its own. Only an explicit stop sends.
            SpeechEvent::Ended => {
                if matches!(self.recording, Recording::Speech(_)) {
                    self.recording = Recording::Idle;
                    self.speech.stop();
                    self.emit(ViewEvent::Recording(false));
                }
                Ok(())
            }
        }
    }

    pub async fn handle_mic_frame(&mut self, samples: Vec<f32>) -> Result<()> {
        if !matches!(self.recording, Recording::Realtime) {
            return Ok(());
        }
        self.composer.stream_samples(&samples).await?;
        Ok(())
    }

    /// Applies one inbound gateway frame.
    pub fn handle_inbound(&mut self, raw: &str) {
        let updates = self
            .dispatcher
            .dispatch(raw, &mut self.conversation, &mut self.realtime);
        for update in updates {
            self.emit(update);
        }
        self.refresh_suggestions();
    }

    pub fn handle_playback_event(&mut self, event: PlaybackEvent) {
        let state = self.playback.handle_event(event);
        self.emit(ViewEvent::Playback(state));
    }

    /// Play/pause the audio attached to a message. Messages without audio are
    /// ignored.
    pub fn toggle_playback(&mut self, message_id: &str) -> PlaybackState {
        let url = self
            .conversation
            .find(message_id)
            .and_then(Message::audio_url)
            .map(str::to_string);
        let Some(url) = url else {
            tracing::debug!("message {} has no audio", message_id);
            return self.playback.state();
        };
        let state = self.playback.toggle(message_id, &url);
        self.emit(ViewEvent::Playback(state.clone()));
        state
    }

    pub fn set_volume(&mut self, volume: u8) -> PlaybackState {
        let state = self.playback.set_volume(volume);
        self.emit(ViewEvent::Playback(state.clone()));
        state
    }

    /// Uploads a finished recording and starts polling for its transcription
    /// in the background. The outcome arrives through [`Self::handle_upload_outcome`].
    pub async fn submit_recording(&mut self, audio: Vec<u8>, filename: &str) -> Result<()> {
        if self.is_recording() {
            return Err(ClientError::InputBusy);
        }
        if self.conversation.is_pending() {
            return Err(ClientError::ResponsePending);
        }
        self.conversation.begin_pending(Instant::now());
        self.emit(ViewEvent::Processing(true));

        let stored = match self
            .service
            .upload_audio(audio, filename, self.session.session_id())
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                self.clear_pending();
                return Err(e);
            }
        };

        if let Some(task) = self.upload_task.take() {
            task.abort();
        }
        let service = self.service.clone();
        let uploads_tx = self.uploads_tx.clone();
        let interval = self.config.poll_interval();
        let attempts = self.config.poll_attempts();
        self.upload_task = Some(tokio::spawn(async move {
            let outcome = match poll_transcription(service.as_ref(), &stored, interval, attempts).await {
                Ok(Some(text)) => UploadOutcome::Transcribed(text),
                Ok(None) => UploadOutcome::NotReady,
                Err(e) => UploadOutcome::Failed(e.to_string()),
            };
            let _ = uploads_tx.send(outcome);
        }));
        Ok(())
    }

    pub async fn handle_upload_outcome(&mut self, outcome: UploadOutcome) -> Result<()> {
        self.upload_task = None;
        self.clear_pending();
        match outcome {
            UploadOutcome::Transcribed(text) => self.send_intent(&text).await,
            UploadOutcome::NotReady => {
                self.emit(ViewEvent::Notice(
                    "Transcription is taking longer than expected. Please try again.".to_string(),
                ));
                Ok(())
            }
            UploadOutcome::Failed(reason) => Err(ClientError::Service(reason)),
        }
    }

    fn clear_pending(&mut self) {
        if self.conversation.clear_pending() {
            self.emit(ViewEvent::Processing(false));
        }
    }

    /// Saves the session transcript, by default to `transcript-{id}.txt`.
    pub async fn download_transcript(&mut self, path: Option<PathBuf>) -> Result<PathBuf> {
        let text = self
            .service
            .fetch_transcript(self.session.session_id())
            .await?;
        let path = path.unwrap_or_else(|| {
            PathBuf::from(format!("transcript-{}.txt", self.session.session_id()))
        });
        tokio::fs::write(&path, text).await?;
        tracing::info!("transcript saved to {}", path.display());
        self.emit(ViewEvent::Notice(format!("Transcript saved to {}", path.display())));
        Ok(path)
    }

    fn response_deadline(&self) -> Option<tokio::time::Instant> {
        let timeout = self.config.response_timeout()?;
        let since = self.conversation.pending_since()?;
        Some(tokio::time::Instant::from_std(since + timeout))
    }

    /// Gives up on a pending reply once the configured timeout has passed.
    /// Returns true when the reply was abandoned.
    pub fn expire_pending(&mut self, now: Instant) -> bool {
        let (Some(timeout), Some(since)) = (
            self.config.response_timeout(),
            self.conversation.pending_since(),
        ) else {
            return false;
        };
        if now.saturating_duration_since(since) < timeout {
            return false;
        }
        tracing::warn!("no response after {:?}", timeout);
        self.clear_pending();
        let message = Message::assistant(NO_RESPONSE_TEXT);
        self.conversation.append(message.clone());
        self.emit(ViewEvent::MessageAppended(message));
        self.refresh_suggestions();
        true
    }

    pub async fn handle_input(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Text(text) => self.send_text(&text).await,
            Input::ToggleRecording => self.toggle_recording().await,
            Input::StartRecording => self.start_recording(),
            Input::StopRecording => self.stop_recording().await,
            Input::TogglePlayback(message_id) => {
                self.toggle_playback(&message_id);
                Ok(())
            }
            Input::Volume(volume) => {
                self.set_volume(volume);
                Ok(())
            }
            Input::SubmitRecording { audio, filename } => {
                self.submit_recording(audio, &filename).await
            }
            Input::DownloadTranscript(path) => self.download_transcript(path).await.map(|_| ()),
            Input::Quit => Ok(()),
        }
    }

    fn report(&self, result: Result<()>) {
        match result {
            Ok(()) => {}
            // Already raised as an alert.
            Err(ClientError::Capture(_)) => {}
            Err(e) => {
                tracing::warn!("{}", e);
                self.emit(ViewEvent::Notice(e.to_string()));
            }
        }
    }

    /// Processes events until `inputs` closes or yields [`Input::Quit`], then
    /// disposes the session. Can only run once.
    pub async fn run(&mut self, mut inputs: mpsc::Receiver<Input>) -> Result<()> {
        if self.disposed {
            return Err(ClientError::AlreadyRunning);
        }
        let Some(mut receivers) = self.receivers.take() else {
            return Err(ClientError::AlreadyRunning);
        };
        let mut inbound = self.inbound.take();
        let mut state_rx = self.gateway.subscribe();

        let state = *state_rx.borrow_and_update();
        self.emit(ViewEvent::Connection(state));
        self.refresh_suggestions();

        loop {
            let deadline = self.response_deadline();
            tokio::select! {
                Some(raw) = next_frame(&mut inbound) => self.handle_inbound(&raw),
                input = inputs.recv() => match input {
                    None | Some(Input::Quit) => break,
                    Some(input) => {
                        let result = self.handle_input(input).await;
                        self.report(result);
                    }
                },
                Some(event) = receivers.speech.recv() => {
                    let result = self.handle_speech_event(event).await;
                    self.report(result);
                }
                Some(samples) = receivers.frames.recv() => {
                    let result = self.handle_mic_frame(samples).await;
                    self.report(result);
                }
                Some(event) = receivers.playback.recv() => self.handle_playback_event(event),
                Some(outcome) = receivers.uploads.recv() => {
                    let result = self.handle_upload_outcome(outcome).await;
                    self.report(result);
                }
                Ok(()) = state_rx.changed() => {
                    let state = *state_rx.borrow_and_update();
                    self.emit(ViewEvent::Connection(state));
                }
                _ = sleep_until(deadline) => {
                    self.expire_pending(Instant::now());
                }
            }
        }

        self.dispose();
        Ok(())
    }

    /// Stops capture, releases playback and the audio context, and closes the
    /// channel. Idempotent; also runs on drop.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        match std::mem::replace(&mut self.recording, Recording::Idle) {
            Recording::Speech(_) => self.speech.stop(),
            Recording::Realtime => self.microphone.stop(),
            Recording::Idle => {}
        }
        if let Some(task) = self.upload_task.take() {
            task.abort();
        }
        self.playback.stop();
        self.realtime.close();
        self.composer.detach();
        self.inbound = None;
        self.gateway.close();
        tracing::info!("chat session {} closed", self.session.session_id());
    }

    #[cfg(test)]
    pub(crate) fn attach(&mut self, connection: crate::gateway::Connection) {
        self.composer.attach(connection.outbound);
        self.inbound = Some(connection.inbound);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn next_frame(inbound: &mut Option<InboundRx>) -> Option<String> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockMicrophoneCapture, MockSpeechCapture};
    use crate::gateway::{Connection, Outbound};
    use crate::playback::tests::{FakeBackend, FakeFactory, Recorder};
    use crate::service::MockSessionService;
    use crate::view::{self, ViewRx};
    use std::time::Duration;
    use tokio::sync::watch;
    use voice_tutor_types::audio::FRAME_SIZE;
    use voice_tutor_types::{ClientEvent, Intent, LeadForm};

    struct Harness {
        chat: ChatSession,
        view: ViewRx,
        sent: mpsc::Receiver<ClientEvent>,
        frames: mpsc::Sender<String>,
        state: watch::Sender<ConnectionState>,
        audio: Recorder,
    }

    fn session() -> Session {
        let form = LeadForm::builder()
            .with_name("Asha")
            .with_email("a@x.com")
            .with_mobile("9999999999")
            .with_intent(Intent::Fees)
            .with_grade("10")
            .build();
        Session::new("S1", &form)
    }

    fn speech_ok() -> MockSpeechCapture {
        let mut speech = MockSpeechCapture::new();
        speech.expect_start().returning(|_, _| Ok(()));
        speech.expect_stop().return_const(());
        speech
    }

    fn harness_with(
        mode: ArchitectureMode,
        config: Config,
        service: MockSessionService,
        speech: MockSpeechCapture,
        microphone: MockMicrophoneCapture,
    ) -> Harness {
        let audio = Recorder::default();
        let capabilities = Capabilities {
            speech: Box::new(speech),
            microphone: Box::new(microphone),
            audio: Box::new(FakeBackend {
                recorder: audio.clone(),
            }),
            audio_context: Box::new(FakeFactory {
                recorder: audio.clone(),
            }),
        };
        let (view_tx, view) = view::channel();
        let mut chat = ChatSession::new(
            session(),
            mode,
            config,
            Arc::new(service),
            capabilities,
            view_tx,
        );

        let (state, state_rx) = watch::channel(ConnectionState::Connected);
        let (out_tx, sent) = mpsc::channel(64);
        let (frames, inbound) = mpsc::channel(64);
        chat.attach(Connection {
            outbound: Outbound::new(state_rx, out_tx),
            inbound,
        });

        Harness {
            chat,
            view,
            sent,
            frames,
            state,
            audio,
        }
    }

    fn harness(mode: ArchitectureMode) -> Harness {
        harness_with(
            mode,
            Config::default(),
            MockSessionService::new(),
            speech_ok(),
            MockMicrophoneCapture::new(),
        )
    }

    fn drain(view: &mut ViewRx) -> Vec<ViewEvent> {
        let mut events = Vec::new();
        while let Ok(event) = view.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_asha_fee_question_round_trip() {
        let mut h = harness(ArchitectureMode::Chained);

        h.chat.send_text("What is the total fee?").await.unwrap();

        assert_eq!(h.sent.try_recv().unwrap(), ClientEvent::text("What is the total fee?"));
        assert!(h.chat.conversation().is_pending());
        assert_eq!(h.chat.suggestions(), Vec::<Suggestion>::new());

        h.chat
            .handle_inbound(r#"{"type":"final","text":"The fee is 50,000.","audio_url":"/audio/r1.mp3"}"#);
        h.chat.handle_inbound(r#"{"type":"final","text":"Anything else?"}"#);

        let events = drain(&mut h.view);
        let cleared = events
            .iter()
            .filter(|e| **e == ViewEvent::Processing(false))
            .count();
        assert_eq!(cleared, 1);
        assert!(!h.chat.conversation().is_pending());

        let messages = h.chat.conversation().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[1].audio_url(),
            Some("http://localhost:8000/audio/r1.mp3")
        );
        assert_eq!(h.chat.suggestions()[1].text, "Explain in Hindi");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_writes_nothing() {
        let mut h = harness(ArchitectureMode::Chained);
        h.state.send_replace(ConnectionState::Disconnected);

        let result = h.chat.send_text("hello").await;

        assert!(matches!(
            result,
            Err(ClientError::NotConnected(ConnectionState::Disconnected))
        ));
        assert!(h.sent.try_recv().is_err());
        assert!(h.chat.conversation().messages().is_empty());
        assert!(!h.chat.conversation().is_pending());
    }

    #[tokio::test]
    async fn test_blank_text_is_ignored() {
        let mut h = harness(ArchitectureMode::Chained);
        h.chat.send_text("   ").await.unwrap();
        assert!(h.sent.try_recv().is_err());
        assert!(h.chat.conversation().messages().is_empty());
    }

    #[tokio::test]
    async fn test_second_send_waits_for_reply() {
        let mut h = harness(ArchitectureMode::Chained);
        h.chat.send_text("first").await.unwrap();

        assert!(matches!(
            h.chat.send_text("second").await,
            Err(ClientError::ResponsePending)
        ));
        assert!(matches!(h.chat.start_recording(), Err(ClientError::ResponsePending)));
        assert_eq!(h.chat.conversation().messages().len(), 1);
    }

    #[tokio::test]
    async fn test_language_request_switches_capture_locale() {
        let mut speech = MockSpeechCapture::new();
        speech
            .expect_start()
            .withf(|locale, _| locale == "hi-IN")
            .times(1)
            .returning(|_, _| Ok(()));
        speech.expect_stop().return_const(());
        let mut h = harness_with(
            ArchitectureMode::Chained,
            Config::default(),
            MockSessionService::new(),
            speech,
            MockMicrophoneCapture::new(),
        );

        h.chat.send_text("Explain in Hindi").await.unwrap();
        assert!(drain(&mut h.view).contains(&ViewEvent::Language(SpokenLanguage::Hindi)));

        h.chat.handle_inbound(r#"{"type":"final","text":"नमस्ते"}"#);
        h.chat.start_recording().unwrap();
    }

    #[tokio::test]
    async fn test_speech_capture_sends_transcript_on_stop() {
        let mut h = harness(ArchitectureMode::Chained);

        h.chat.start_recording().unwrap();
        assert!(matches!(h.chat.send_text("typed").await, Err(ClientError::InputBusy)));
        for (transcript, is_final) in [("when can", false), ("when can I enroll", true), ("this", false)] {
            h.chat
                .handle_speech_event(SpeechEvent::Result {
                    transcript: transcript.to_string(),
                    is_final,
                })
                .await
                .unwrap();
        }
        assert_eq!(h.chat.conversation().live_transcript(), "when can I enroll this");

        h.chat.stop_recording().await.unwrap();

        assert!(!h.chat.is_recording());
        assert_eq!(
            h.sent.try_recv().unwrap(),
            ClientEvent::text("when can I enroll this")
        );
        assert!(h.chat.conversation().is_pending());
    }

    #[tokio::test]
    async fn test_speech_ending_on_its_own_sends_nothing() {
        let mut h = harness(ArchitectureMode::Chained);

        h.chat.start_recording().unwrap();
        h.chat
            .handle_speech_event(SpeechEvent::Result {
                transcript: "when can I enroll".to_string(),
                is_final: true,
            })
            .await
            .unwrap();
        h.chat.handle_speech_event(SpeechEvent::Ended).await.unwrap();

        assert!(!h.chat.is_recording());
        assert!(h.sent.try_recv().is_err());
        assert!(!h.chat.conversation().is_pending());

        h.chat.stop_recording().await.unwrap();
        assert!(h.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_permission_denied_raises_alert() {
        let mut speech = MockSpeechCapture::new();
        speech
            .expect_start()
            .returning(|_, _| Err(CaptureError::PermissionDenied));
        let mut h = harness_with(
            ArchitectureMode::Chained,
            Config::default(),
            MockSessionService::new(),
            speech,
            MockMicrophoneCapture::new(),
        );

        assert!(h.chat.start_recording().is_err());
        assert!(!h.chat.is_recording());
        assert_eq!(
            drain(&mut h.view),
            vec![ViewEvent::Alert(CaptureError::PermissionDenied.to_string())]
        );
    }

    #[tokio::test]
    async fn test_realtime_recording_streams_frames_then_commits() {
        let mut microphone = MockMicrophoneCapture::new();
        microphone
            .expect_start()
            .withf(|rate, _| *rate == 24_000)
            .times(1)
            .returning(|_, _| Ok(()));
        microphone.expect_stop().times(1).return_const(());
        let mut h = harness_with(
            ArchitectureMode::Realtime,
            Config::default(),
            MockSessionService::new(),
            speech_ok(),
            microphone,
        );

        h.chat.start_recording().unwrap();
        h.chat.handle_mic_frame(vec![0.25; FRAME_SIZE + 100]).await.unwrap();
        h.chat.stop_recording().await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = h.sent.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds, vec!["audio", "audio", "audio_commit"]);
        assert!(!h.chat.conversation().is_pending());
    }

    #[tokio::test]
    async fn test_mic_refused_while_assistant_audio_plays() {
        let mut h = harness(ArchitectureMode::Chained);
        h.chat.send_text("fees?").await.unwrap();
        h.chat
            .handle_inbound(r#"{"type":"final","text":"It is 50,000.","audio_url":"/audio/r1.mp3"}"#);
        let message_id = h.chat.conversation().last().unwrap().id().to_string();

        assert!(h.chat.toggle_playback(&message_id).playing);
        assert!(matches!(h.chat.start_recording(), Err(ClientError::InputBusy)));

        h.chat.handle_playback_event(PlaybackEvent::Ended(message_id));
        assert!(!h.chat.playback_state().playing);
        h.chat.start_recording().unwrap();
    }

    #[tokio::test]
    async fn test_realtime_connect_path_plays_audio() {
        let mut h = harness(ArchitectureMode::Realtime);
        h.chat.realtime.open(&mut FakeFactory {
            recorder: h.audio.clone(),
        })
        .unwrap();

        for _ in 0..5 {
            let audio = voice_tutor_utils::audio::encode_i16(&[1, 2, 3, 4]);
            h.chat
                .handle_inbound(&serde_json::json!({"type": "audio", "audio": audio}).to_string());
        }
        h.chat.handle_inbound(r#"{"type":"transcript","text":"Hello!"}"#);

        let entries = h.audio.entries();
        assert_eq!(entries[0], "open 24000");
        assert_eq!(entries[1..].iter().filter(|e| *e == "buffer 4").count(), 5);
        assert_eq!(h.chat.conversation().last().unwrap().text(), "Hello!");
    }

    #[tokio::test]
    async fn test_response_timeout_appends_error() {
        let config = Config::builder()
            .with_response_timeout(Some(Duration::from_secs(5)))
            .build();
        let mut h = harness_with(
            ArchitectureMode::Chained,
            config,
            MockSessionService::new(),
            speech_ok(),
            MockMicrophoneCapture::new(),
        );
        h.chat.send_text("hello?").await.unwrap();
        let since = h.chat.conversation().pending_since().unwrap();

        assert!(!h.chat.expire_pending(since + Duration::from_secs(4)));
        assert!(h.chat.expire_pending(since + Duration::from_secs(6)));

        assert!(!h.chat.conversation().is_pending());
        assert_eq!(h.chat.conversation().last().unwrap().text(), NO_RESPONSE_TEXT);
        assert!(!h.chat.expire_pending(since + Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_pending_never_expires_without_timeout() {
        let mut h = harness(ArchitectureMode::Chained);
        h.chat.send_text("hello?").await.unwrap();
        let since = h.chat.conversation().pending_since().unwrap();
        assert!(!h.chat.expire_pending(since + Duration::from_secs(3600)));
        assert!(h.chat.conversation().is_pending());
    }

    #[tokio::test]
    async fn test_upload_transcription_is_sent_as_text() {
        let mut service = MockSessionService::new();
        service
            .expect_upload_audio()
            .withf(|audio, filename, user_id| audio.len() == 3 && filename == "rec.webm" && user_id == "S1")
            .returning(|_, _, _| Ok("stored.webm".to_string()));
        service
            .expect_fetch_transcription()
            .returning(|_| Ok(Some("what are the fees".to_string())));
        let config = Config::builder()
            .with_poll_interval(Duration::from_millis(1))
            .build();
        let mut h = harness_with(
            ArchitectureMode::Chained,
            config,
            service,
            speech_ok(),
            MockMicrophoneCapture::new(),
        );

        h.chat.submit_recording(vec![1, 2, 3], "rec.webm").await.unwrap();
        assert!(h.chat.conversation().is_pending());

        let mut receivers = h.chat.receivers.take().unwrap();
        let outcome = receivers.uploads.recv().await.unwrap();
        assert_eq!(outcome, UploadOutcome::Transcribed("what are the fees".to_string()));
        h.chat.handle_upload_outcome(outcome).await.unwrap();

        assert_eq!(h.sent.try_recv().unwrap(), ClientEvent::text("what are the fees"));
        assert!(h.chat.conversation().is_pending());
    }

    #[tokio::test]
    async fn test_upload_not_ready_clears_processing() {
        let mut h = harness(ArchitectureMode::Chained);
        h.chat.conversation.begin_pending(Instant::now());

        h.chat.handle_upload_outcome(UploadOutcome::NotReady).await.unwrap();

        assert!(!h.chat.conversation().is_pending());
        assert!(h.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_download_transcript_writes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut service = MockSessionService::new();
        service
            .expect_fetch_transcript()
            .withf(|id| id == "S1")
            .returning(|_| Ok("USER: hi\nASSISTANT: hello\n".to_string()));
        let mut h = harness_with(
            ArchitectureMode::Chained,
            Config::default(),
            service,
            speech_ok(),
            MockMicrophoneCapture::new(),
        );

        let target = dir.path().join("out.txt");
        let path = h.chat.download_transcript(Some(target.clone())).await.unwrap();

        assert_eq!(path, target);
        assert_eq!(
            std::fs::read_to_string(&target).unwrap(),
            "USER: hi\nASSISTANT: hello\n"
        );
    }

    #[tokio::test]
    async fn test_dispose_releases_microphone_once() {
        let mut microphone = MockMicrophoneCapture::new();
        microphone.expect_start().returning(|_, _| Ok(()));
        microphone.expect_stop().times(1).return_const(());
        let mut h = harness_with(
            ArchitectureMode::Realtime,
            Config::default(),
            MockSessionService::new(),
            speech_ok(),
            microphone,
        );

        h.chat.start_recording().unwrap();
        h.chat.dispose();
        h.chat.dispose();

        assert!(!h.chat.is_recording());
        assert_eq!(h.chat.connection_state(), ConnectionState::Disconnected);
        assert!(h.sent.try_recv().is_err(), "no commit after dispose");
    }

    #[tokio::test]
    async fn test_run_processes_frames_in_order() {
        let Harness {
            mut chat,
            mut view,
            frames,
            ..
        } = harness(ArchitectureMode::Chained);
        let (inputs_tx, inputs) = mpsc::channel(8);

        let task = tokio::spawn(async move {
            chat.run(inputs).await.unwrap();
            chat
        });

        frames
            .send(r#"{"type":"transcription","text":"one"}"#.to_string())
            .await
            .unwrap();
        frames.send(r#"{"type":"bogus"}"#.to_string()).await.unwrap();
        frames
            .send(r#"{"type":"final","text":"two"}"#.to_string())
            .await
            .unwrap();

        let mut appended = Vec::new();
        while appended.len() < 2 {
            if let Some(ViewEvent::MessageAppended(message)) = view.recv().await {
                appended.push(message.text().to_string());
            }
        }
        inputs_tx.send(Input::Quit).await.unwrap();
        let chat = task.await.unwrap();

        assert_eq!(appended, vec!["one", "two"]);
        assert_eq!(chat.conversation().dropped_envelopes(), 1);
        assert_eq!(chat.connection_state(), ConnectionState::Disconnected);
    }
}

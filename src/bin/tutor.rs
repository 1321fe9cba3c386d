use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;
use voice_tutor::capture::{MicrophoneCapture, NoSpeech};
use voice_tutor::config::ConfigBuilder;
use voice_tutor::error::PlaybackError;
use voice_tutor::playback::{AudioBackend, AudioContextFactory, AudioElement, PlaybackNotifier};
use voice_tutor::types::{Intent, LeadForm, MessageRole};
use voice_tutor::{
    Capabilities, ChatSession, Config, Entry, HttpSessionService, Input, SessionBootstrap,
    SessionCache, SessionService, ViewEvent,
};

#[derive(Parser)]
#[command(version, about = "Talk to the admissions tutor from a terminal")]
struct Cli {
    /// Backend origin, e.g. http://localhost:8000
    #[arg(long, env = "BACKEND_ORIGIN")]
    origin: Option<String>,

    /// Open this session instead of the cached one
    #[arg(long)]
    session: Option<String>,

    /// Ignore the cached session and start with lead capture
    #[arg(long)]
    new_session: bool,

    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    mobile: Option<String>,
    /// Admission, Fees, Demo, Syllabus, Other, or free text
    #[arg(long)]
    intent: Option<String>,
    #[arg(long)]
    grade: Option<String>,

    /// Input device name (default device when omitted)
    #[cfg(feature = "native-audio")]
    #[arg(long)]
    input_device: Option<String>,

    /// Output device name (default device when omitted)
    #[cfg(feature = "native-audio")]
    #[arg(long)]
    output_device: Option<String>,

    /// Print the audio devices and exit
    #[cfg(feature = "native-audio")]
    #[arg(long)]
    list_devices: bool,
}

const HELP: &str = "\
commands:
  <text>              send a message
  /mic                start or stop voice input
  /play <n>           play or pause the audio of reply #n
  /volume <0-100>     set playback volume
  /upload <file>      transcribe a recording and send it
  /transcript [file]  save the session transcript
  /help               show this help
  /quit               leave the chat";

#[derive(Debug, PartialEq)]
enum Command {
    Send(String),
    Mic,
    Play(usize),
    Volume(u8),
    Upload(PathBuf),
    Transcript(Option<PathBuf>),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(Command::Send(line.to_string())));
    }
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };
    let command = match name {
        "/mic" => Command::Mic,
        "/play" => Command::Play(
            arg.parse()
                .map_err(|_| format!("expected a reply number, got {:?}", arg))?,
        ),
        "/volume" => Command::Volume(
            arg.parse::<u16>()
                .map(|v| v.min(100) as u8)
                .map_err(|_| format!("expected a volume 0-100, got {:?}", arg))?,
        ),
        "/upload" if !arg.is_empty() => Command::Upload(PathBuf::from(arg)),
        "/upload" => return Err("usage: /upload <file>".to_string()),
        "/transcript" => Command::Transcript((!arg.is_empty()).then(|| PathBuf::from(arg))),
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        other => return Err(format!("unknown command {}", other)),
    };
    Ok(Some(command))
}

/// "Plays" reply audio by printing its URL for an external player.
struct LinkBackend;

struct LinkElement {
    url: String,
}

impl AudioElement for LinkElement {
    fn play(&mut self) -> std::result::Result<(), PlaybackError> {
        println!("▶ {}", self.url);
        Ok(())
    }

    fn pause(&mut self) {
        println!("⏸ {}", self.url);
    }

    fn set_volume(&mut self, volume: f32) {
        tracing::debug!("volume {:.2} for {}", volume, self.url);
    }
}

impl AudioBackend for LinkBackend {
    fn load(
        &mut self,
        _message_id: &str,
        url: &str,
        _events: PlaybackNotifier,
    ) -> std::result::Result<Box<dyn AudioElement>, PlaybackError> {
        Ok(Box::new(LinkElement {
            url: url.to_string(),
        }))
    }
}

#[cfg_attr(not(feature = "native-audio"), allow(unused_variables))]
fn capabilities(cli: &Cli) -> Capabilities {
    let microphone: Box<dyn MicrophoneCapture>;
    let audio_context: Box<dyn AudioContextFactory>;
    #[cfg(feature = "native-audio")]
    {
        microphone = Box::new(voice_tutor::native::NativeMicrophone::new(cli.input_device.clone()));
        audio_context = Box::new(voice_tutor::native::NativeOutput::new(cli.output_device.clone()));
    }
    #[cfg(not(feature = "native-audio"))]
    {
        microphone = Box::new(voice_tutor::capture::NoMicrophone);
        audio_context = Box::new(voice_tutor::playback::NoAudio);
    }
    Capabilities {
        speech: Box::new(NoSpeech),
        microphone,
        audio: Box::new(LinkBackend),
        audio_context,
    }
}

fn prompt(label: &str, value: Option<&String>) -> Result<String> {
    if let Some(value) = value {
        return Ok(value.clone());
    }
    print!("{}: ", label);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_lead(cli: &Cli) -> Result<LeadForm> {
    Ok(LeadForm::builder()
        .with_name(&prompt("Name", cli.name.as_ref())?)
        .with_email(&prompt("Email", cli.email.as_ref())?)
        .with_mobile(&prompt("Mobile", cli.mobile.as_ref())?)
        .with_intent(Intent::from(
            prompt("Looking for (Admission/Fees/Demo/Syllabus/Other)", cli.intent.as_ref())?.as_str(),
        ))
        .with_grade(&prompt("Grade", cli.grade.as_ref())?)
        .build())
}

async fn start_session(cli: &Cli, bootstrap: &SessionBootstrap) -> Result<voice_tutor::types::Session> {
    if let Some(session_id) = &cli.session {
        return bootstrap
            .open(session_id)
            .await
            .with_context(|| format!("Failed to open session {}", session_id));
    }
    if cli.new_session {
        bootstrap.cache().clear().await;
    } else {
        match bootstrap.resume().await {
            Entry::Chat(session) => {
                println!("Welcome back, {}.", session.name());
                return Ok(session);
            }
            Entry::LeadCapture { reason: Some(reason) } => println!("{}", reason),
            Entry::LeadCapture { reason: None } => {}
        }
    }

    let form = read_lead(cli)?;
    let route = bootstrap.submit(&form).await?;
    tracing::info!("lead captured, continuing at {}", route.path());
    Ok(bootstrap.open(&route.session_id).await?)
}

/// Prints view updates and remembers which replies carry audio.
async fn render(mut view: voice_tutor::view::ViewRx, replies: Arc<Mutex<Vec<String>>>) {
    while let Some(event) = view.recv().await {
        match event {
            ViewEvent::MessageAppended(message) => match message.role() {
                MessageRole::User => println!("you: {}", message.text()),
                MessageRole::Assistant => {
                    let tag = match message.audio_url() {
                        Some(_) => match replies.lock() {
                            Ok(mut replies) => {
                                replies.push(message.id().to_string());
                                format!(" [/play {}]", replies.len())
                            }
                            Err(_) => String::new(),
                        },
                        None => String::new(),
                    };
                    println!("tutor: {}{}", message.text(), tag);
                }
            },
            ViewEvent::Processing(true) => println!("…"),
            ViewEvent::Processing(false) => {}
            ViewEvent::Connection(state) => println!("[{}]", state),
            ViewEvent::Language(language) => println!("[speaking {}]", language),
            ViewEvent::LiveTranscript(text) if !text.is_empty() => println!("~ {}", text),
            ViewEvent::LiveTranscript(_) => {}
            ViewEvent::Recording(true) => println!("[recording, /mic to stop]"),
            ViewEvent::Recording(false) => println!("[recording stopped]"),
            ViewEvent::Playback(state) => tracing::debug!("playback: {:?}", state),
            ViewEvent::AssistantAudio { samples } => tracing::trace!("assistant audio: {}", samples),
            ViewEvent::Suggestions(suggestions) if !suggestions.is_empty() => {
                let line: Vec<String> = suggestions
                    .iter()
                    .map(|s| format!("{} {}", s.emoji, s.text))
                    .collect();
                println!("try: {}", line.join(" | "));
            }
            ViewEvent::Suggestions(_) => {}
            ViewEvent::Alert(text) => println!("!! {}", text),
            ViewEvent::Notice(text) => println!("[{}]", text),
        }
    }
}

/// Reads commands from stdin and forwards them as chat inputs.
async fn read_commands(inputs: mpsc::Sender<Input>, replies: Arc<Mutex<Vec<String>>>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        let input = match command {
            Command::Send(text) => Input::Text(text),
            Command::Mic => Input::ToggleRecording,
            Command::Play(n) => {
                let id = replies
                    .lock()
                    .ok()
                    .and_then(|replies| n.checked_sub(1).and_then(|i| replies.get(i).cloned()));
                match id {
                    Some(id) => Input::TogglePlayback(id),
                    None => {
                        println!("no reply #{} with audio", n);
                        continue;
                    }
                }
            }
            Command::Volume(volume) => Input::Volume(volume),
            Command::Upload(path) => match tokio::fs::read(&path).await {
                Ok(audio) => Input::SubmitRecording {
                    audio,
                    filename: file_name(&path),
                },
                Err(e) => {
                    println!("cannot read {}: {}", path.display(), e);
                    continue;
                }
            },
            Command::Transcript(path) => Input::DownloadTranscript(path),
            Command::Help => {
                println!("{}", HELP);
                continue;
            }
            Command::Quit => Input::Quit,
        };
        let quit = input == Input::Quit;
        if inputs.send(input).await.is_err() || quit {
            return Ok(());
        }
    }
    let _ = inputs.send(Input::Quit).await;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording.webm".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "native-audio")]
    if cli.list_devices {
        println!("inputs:\n{}", voice_tutor::native::get_available_inputs()?);
        println!("outputs:\n{}", voice_tutor::native::get_available_outputs()?);
        return Ok(());
    }

    let config = match &cli.origin {
        Some(origin) => ConfigBuilder::from_config(config)
            .with_backend_origin(origin)
            .build(),
        None => config,
    };
    tracing::info!("using backend {}", config.backend_origin());

    let service: Arc<dyn SessionService> = Arc::new(HttpSessionService::new(config.backend_origin())?);
    let bootstrap = SessionBootstrap::new(
        service.clone(),
        SessionCache::new(config.session_cache_path()),
        config.session_ttl(),
    );
    let session = start_session(&cli, &bootstrap).await?;

    let (view_tx, view_rx) = voice_tutor::view::channel();
    let replies = Arc::new(Mutex::new(Vec::new()));
    let render_handle = tokio::spawn(render(view_rx, replies.clone()));

    let mut chat = ChatSession::open(session, config, service, capabilities(&cli), view_tx).await;
    chat.connect().await.context("Failed to connect to the tutor")?;
    println!("{}", HELP);

    let (inputs_tx, inputs_rx) = mpsc::channel::<Input>(32);
    let reader_handle = tokio::spawn(read_commands(inputs_tx, replies));

    chat.run(inputs_rx).await?;
    let stats = chat.stats();
    tracing::info!(
        "sent {} frames, received {}",
        stats.frames_sent(),
        stats.frames_received()
    );
    drop(chat);

    reader_handle.abort();
    let _ = render_handle.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(
            parse_command("What are the fees?"),
            Ok(Some(Command::Send("What are the fees?".to_string())))
        );
        assert_eq!(parse_command("/play 2"), Ok(Some(Command::Play(2))));
        assert_eq!(parse_command("/volume 250"), Ok(Some(Command::Volume(100))));
        assert_eq!(parse_command("/transcript"), Ok(Some(Command::Transcript(None))));
        assert_eq!(
            parse_command("/upload rec.webm"),
            Ok(Some(Command::Upload(PathBuf::from("rec.webm"))))
        );
        assert!(parse_command("/upload").is_err());
        assert!(parse_command("/dance").is_err());
    }
}

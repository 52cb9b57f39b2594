//! Terminal presentation surface.
//!
//! Three concurrent pieces, wired with channels:
//! - a stdin reader that turns lines into [`Action`]s,
//! - the session loop, which owns the [`PresentationSession`] and a one second ticker,
//! - the command handler, which carries out the session's [`Command`]s.

use crate::config::Config;
use crate::speech::{ElevenLabsPlayer, TranscriptPlayer};
use anyhow::{Context, Result};
use pitch_core::Command;
use pitch_core::api::{ApiClient, CreateSessionRequest, PresentationApi};
use pitch_core::conversation::Role;
use pitch_core::navigation::AdvanceOutcome;
use pitch_core::recording::{FinishedRecording, RecordingStatus, format_elapsed};
use pitch_core::session_state::{PresentationSession, SessionConfig};
use pitch_core::speech::{SpeechNotifier, SpeechPlayer, SubscriptionId};
use pitch_core::store::{LocalStore, StoreKey};
use pitch_native_utils::microphone::CpalMicrophone;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const HELP: &str = "\
Commands:
  /start     start recording
  /pause     pause recording
  /resume    resume recording
  /stop      stop recording
  /next      next slide
  /prev      previous slide
  /unlock    unlock the current slide
  /retry     retry a failed intervention
  /feedback  stop recording and request feedback
  /status    show the session state
  /help      show this help
  /quit      leave
Anything else is sent as a message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Start,
    Pause,
    Resume,
    Stop,
    Next,
    Prev,
    Unlock,
    Retry,
    Feedback,
    Status,
    Help,
    Quit,
    Say(String),
}

impl Action {
    /// `None` for blank lines. Unknown slash commands are reported, not sent.
    pub fn parse(line: &str) -> Option<Result<Action, String>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if !line.starts_with('/') {
            return Some(Ok(Action::Say(line.to_string())));
        }
        let action = match line.to_lowercase().as_str() {
            "/start" => Action::Start,
            "/pause" => Action::Pause,
            "/resume" => Action::Resume,
            "/stop" => Action::Stop,
            "/next" | "/n" => Action::Next,
            "/prev" | "/p" => Action::Prev,
            "/unlock" => Action::Unlock,
            "/retry" => Action::Retry,
            "/feedback" => Action::Feedback,
            "/status" => Action::Status,
            "/help" | "/?" => Action::Help,
            "/quit" | "/exit" => Action::Quit,
            other => return Some(Err(format!("Unknown command {other}, try /help"))),
        };
        Some(Ok(action))
    }
}

#[derive(Debug, Clone)]
pub struct PresentOptions {
    pub assignment: String,
    pub slides: Option<u32>,
    pub student: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Slide count from the flag, else the count stored when the deck was uploaded.
/// A flag value is written back to the store.
pub fn resolve_slide_count(flag: Option<u32>, store: &mut LocalStore) -> Result<u32> {
    if let Some(count) = flag {
        anyhow::ensure!(count > 0, "--slides must be at least 1");
        store.set(StoreKey::CurrentPdfSlideCount, count.to_string())?;
        return Ok(count);
    }
    store
        .get(StoreKey::CurrentPdfSlideCount)
        .and_then(|count| count.parse::<u32>().ok())
        .filter(|count| *count > 0)
        .context("No slide count known, pass --slides")
}

pub const MIN_STUDENT_NAME_LEN: usize = 2;

/// Creates a backend session for a named student, or reuses the stored one.
/// The backend refuses chat without a session, so having none is an error.
pub async fn register_student(
    api: &dyn PresentationApi,
    store: &mut LocalStore,
    student: Option<&str>,
    slide_count: u32,
) -> Result<String> {
    let Some(name) = student.map(str::trim) else {
        return store
            .get(StoreKey::SessionId)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .context("No practice session yet, pass --student <name> to start one");
    };
    anyhow::ensure!(
        name.chars().count() >= MIN_STUDENT_NAME_LEN,
        "Student name must be at least {MIN_STUDENT_NAME_LEN} characters"
    );

    let request = CreateSessionRequest {
        student_name: name.to_string(),
        slide_count: Some(slide_count),
        pdf_url: None,
    };
    let created = api
        .create_session(request)
        .await
        .with_context(|| format!("Failed to create a practice session for {name}"))?;
    let session_id = created.session_id.to_string();
    store.set(StoreKey::SessionId, session_id.clone())?;
    store.set(StoreKey::StudentId, created.student_id.to_string())?;
    store.set(StoreKey::StudentName, name)?;
    tracing::info!("Created backend session {} for {}", session_id, name);
    Ok(session_id)
}

pub async fn run_presentation(config: &Config, options: PresentOptions) -> Result<()> {
    let api: Arc<dyn PresentationApi> = Arc::new(
        ApiClient::new(config.api_base_url.clone(), config.request_timeout)
            .context("Failed to build API client")?,
    );
    let mut store = LocalStore::open(&config.store_path)
        .with_context(|| format!("Failed to open store at {}", config.store_path.display()))?;
    let total_slides = resolve_slide_count(options.slides, &mut store)?;
    let session_id =
        register_student(api.as_ref(), &mut store, options.student.as_deref(), total_slides)
            .await?;

    let notifier = Arc::new(SpeechNotifier::new());
    let player: Arc<dyn SpeechPlayer> = match &config.elevenlabs_api_key {
        Some(api_key) => Arc::new(ElevenLabsPlayer::new(
            SecretString::from(api_key.expose_secret().to_owned()),
            config.elevenlabs_voice_id.clone(),
            notifier.clone(),
            config.request_timeout,
        )?),
        None => {
            tracing::info!("ELEVENLABS_API_KEY not set, questions will be printed only");
            Arc::new(TranscriptPlayer::new(notifier.clone()))
        }
    };

    let (command_tx, command_rx) = mpsc::channel::<Command>(32);
    let (input_tx, mut input_rx) = mpsc::channel::<Action>(32);

    let mut session = PresentationSession::new(
        api.clone(),
        Box::new(CpalMicrophone::new(config.input_device.clone())),
        command_tx,
        SessionConfig {
            lock_policy: config.lock_policy.clone(),
            auto_unlock: config.auto_unlock,
            capture_on_lock: config.capture_on_lock,
        },
    );
    session.select_assignment(options.assignment.clone());
    session.set_backend_session(session_id);
    session.document_loaded(total_slides);

    let stdin_handle = tokio::spawn(read_stdin(input_tx));
    let command_handler = tokio::spawn(handle_commands(command_rx, player.clone()));
    let status_logger = StatusLogger::spawn(&notifier);

    println!(
        "Presenting {} ({} slides). Type /help for commands.",
        options.assignment, total_slides
    );

    // The session stays on this task; its futures borrow the microphone.
    tokio::select! {
        result = drive_session(&mut session, &mut input_rx, &mut store) => {
            if let Err(e) = result {
                tracing::error!("Session loop failed: {:?}", e);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down.");
        },
    }

    if session.recording_status() != RecordingStatus::Idle {
        if let Err(e) = session.stop_recording().await {
            tracing::warn!("Failed to stop recording on exit: {}", e);
        }
    }
    player.stop();
    status_logger.stop(&notifier).await;
    notifier.shutdown();
    stdin_handle.abort();
    drop(session);
    let _ = command_handler.await;
    tracing::info!("Presentation session ended");
    Ok(())
}

/// Logs speech status changes until stopped.
struct StatusLogger {
    id: Option<SubscriptionId>,
    handle: JoinHandle<()>,
}

impl StatusLogger {
    fn spawn(notifier: &SpeechNotifier) -> Self {
        let Some(subscription) = notifier.subscribe() else {
            return Self {
                id: None,
                handle: tokio::spawn(async {}),
            };
        };
        let mut updates = subscription.updates;
        let handle = tokio::spawn(async move {
            while let Some(status) = updates.recv().await {
                tracing::debug!("Speech status: {:?}", status);
            }
        });
        Self {
            id: Some(subscription.id),
            handle,
        }
    }

    async fn stop(self, notifier: &SpeechNotifier) {
        if let Some(id) = self.id {
            notifier.unsubscribe(id);
        }
        if let Err(e) = self.handle.await {
            tracing::warn!("Speech status logger failed: {}", e);
        }
    }
}

async fn read_stdin(input_tx: mpsc::Sender<Action>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match Action::parse(&line) {
                Some(Ok(action)) => {
                    let quit = action == Action::Quit;
                    if input_tx.send(action).await.is_err() || quit {
                        break;
                    }
                }
                Some(Err(message)) => println!("{message}"),
                None => {}
            },
            Ok(None) => {
                let _ = input_tx.send(Action::Quit).await;
                break;
            }
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

async fn handle_commands(mut command_rx: mpsc::Receiver<Command>, player: Arc<dyn SpeechPlayer>) {
    while let Some(command) = command_rx.recv().await {
        match command {
            Command::SpeakText(text) => {
                if let Err(e) = player.speak(&text).await {
                    tracing::warn!("Failed to speak: {:#}", e);
                }
            }
            Command::SlideAdvanced(slide) => println!("▶ Slide {slide}"),
            Command::SlideLocked(slide) => {
                player.stop();
                println!("🔒 Slide {slide} is locked. Answer the questions to continue.");
            }
            Command::DeckFinished => println!("End of the deck. Use /feedback when you are done."),
            Command::InterventionComplete { auto_unlocked } => {
                if auto_unlocked {
                    println!("🔓 Slide unlocked.");
                } else {
                    println!("Questions done. Use /unlock to continue.");
                }
            }
            Command::InterventionFailed(reason) => {
                println!("Could not start the questions: {reason}. Use /retry.");
            }
        }
    }
    tracing::debug!("Command handler stopped");
}

async fn drive_session(
    session: &mut PresentationSession,
    input_rx: &mut mpsc::Receiver<Action>,
    store: &mut LocalStore,
) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut finished: Option<FinishedRecording> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                session.tick();
            }
            action = input_rx.recv() => {
                let Some(action) = action else { break };
                let seen = session.history().len();
                let flow = apply(session, action, &mut finished, store).await?;
                print_new_replies(session, seen);
                if flow == Flow::Quit {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_new_replies(session: &PresentationSession, seen: usize) {
    for message in session.history().messages().iter().skip(seen) {
        if message.role == Role::Assistant {
            println!("AI: {}", message.content);
        }
    }
}

async fn apply(
    session: &mut PresentationSession,
    action: Action,
    finished: &mut Option<FinishedRecording>,
    store: &mut LocalStore,
) -> Result<Flow> {
    match action {
        Action::Start => match session.start_recording() {
            Ok(()) => println!("● Recording"),
            Err(e) => println!("Could not start recording: {e}"),
        },
        Action::Pause => match session.pause_recording() {
            Ok(()) => println!("Recording paused"),
            Err(e) => println!("{e}"),
        },
        Action::Resume => match session.resume_recording() {
            Ok(()) => println!("● Recording"),
            Err(e) => println!("{e}"),
        },
        Action::Stop => match session.stop_recording().await {
            Ok(recording) => {
                println!(
                    "Recording stopped: {} bytes, {} slide timestamps",
                    recording.segment.len(),
                    recording.timestamps.len()
                );
                *finished = Some(recording);
            }
            Err(e) => println!("Could not stop recording: {e}"),
        },
        Action::Next => match session.request_advance().await {
            AdvanceOutcome::Refused if session.is_locked() => {
                println!("Slide {} is locked.", session.current_slide());
            }
            AdvanceOutcome::Refused => println!("Cannot advance."),
            _ => {}
        },
        Action::Prev => {
            let slide = session.request_retreat();
            println!("◀ Slide {slide}");
        }
        Action::Unlock => {
            session.unlock();
            println!("🔓 Slide {} unlocked.", session.current_slide());
        }
        Action::Retry => {
            if !session.retry_intervention().await {
                println!("Nothing to retry.");
            }
        }
        Action::Feedback => {
            if session.recording_status() != RecordingStatus::Idle || finished.is_none() {
                match session.stop_recording().await {
                    Ok(recording) => *finished = Some(recording),
                    Err(e) => tracing::debug!("No recording to attach: {}", e),
                }
            }
            println!("Generating feedback...");
            match session.generate_feedback(finished.take(), store).await {
                Ok(report) => println!("Feedback ready: {}", report.summary()),
                Err(e) => println!("Error generating feedback: {e:#}"),
            }
        }
        Action::Status => {
            let snapshot = session.snapshot();
            let total = snapshot
                .total_slides
                .map_or_else(|| "?".to_string(), |n| n.to_string());
            println!(
                "Slide {}/{}{} | recording {:?} {} | intervention {:?} ({} asked) | {} messages",
                snapshot.current_slide,
                total,
                if snapshot.locked { " (locked)" } else { "" },
                snapshot.recording_status,
                format_elapsed(snapshot.elapsed_seconds),
                snapshot.intervention_state,
                snapshot.questions_asked,
                snapshot.messages.len(),
            );
        }
        Action::Help => println!("{HELP}"),
        Action::Quit => return Ok(Flow::Quit),
        Action::Say(text) => session.send_message(&text).await,
    }
    Ok(Flow::Continue)
}

use crate::{
    Command,
    api::{ChatRequest, ConversationLogEntry, FeedbackRequest, PresentationApi},
    conversation::{ChatMessage, ConversationHistory},
    feedback::FeedbackReport,
    intervention::{
        AnswerOutcome, COMPLETION_MESSAGE, InterventionSequencer, InterventionState, SlideRange,
        first_question_prompt, follow_up_prompt,
    },
    navigation::{AdvanceOutcome, LockPolicy, SlideGate},
    recording::{
        AudioCapture, AudioSegment, FinishedRecording, RecordingError, RecordingLifecycle,
        RecordingStatus, format_elapsed,
    },
    store::{LocalStore, StoreKey},
    timestamps::{SlideTimestamp, TimestampCorrelator},
};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub lock_policy: LockPolicy,
    /// Lift the gate as soon as both questions are answered.
    pub auto_unlock: bool,
    /// Stop the recording at lock time and attach the finalized audio to the
    /// first question. When false the recording is only paused.
    pub capture_on_lock: bool,
}

/// Everything a surface needs to render the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub recording_status: RecordingStatus,
    pub elapsed_seconds: u64,
    pub elapsed_display: String,
    pub has_segment: bool,
    pub current_slide: u32,
    pub total_slides: Option<u32>,
    pub locked: bool,
    pub auto_unlock_ready: bool,
    pub intervention_state: InterventionState,
    pub questions_asked: u8,
    pub slide_range: Option<SlideRange>,
    pub messages: Vec<ChatMessage>,
    pub slide_timestamps: Vec<SlideTimestamp>,
    pub is_loading: bool,
    pub assignment: Option<String>,
}

/// The presentation session state machine.
///
/// Owns recording, navigation, intervention, timestamps and conversation in one
/// place so every transition happens under a single `&mut self`. Talks to the
/// backend through [`PresentationApi`] and to the runtime through [`Command`]s.
pub struct PresentationSession {
    api: Arc<dyn PresentationApi>,
    command_tx: Sender<Command>,
    config: SessionConfig,
    recording: RecordingLifecycle,
    gate: SlideGate,
    intervention: InterventionSequencer,
    timestamps: TimestampCorrelator,
    history: ConversationHistory,
    assignment: Option<String>,
    backend_session_id: Option<String>,
    // audio captured when the gate locked, reused on retry
    lock_segment: Option<AudioSegment>,
    // the recording was paused by the lock, not by the presenter
    paused_for_lock: bool,
    is_loading: bool,
}

impl PresentationSession {
    pub fn new(
        api: Arc<dyn PresentationApi>,
        capture: Box<dyn AudioCapture>,
        command_tx: Sender<Command>,
        config: SessionConfig,
    ) -> Self {
        Self {
            api,
            command_tx,
            gate: SlideGate::new(config.lock_policy.clone()),
            config,
            recording: RecordingLifecycle::new(capture),
            intervention: InterventionSequencer::new(),
            timestamps: TimestampCorrelator::new(),
            history: ConversationHistory::new(),
            assignment: None,
            backend_session_id: None,
            lock_segment: None,
            paused_for_lock: false,
            is_loading: false,
        }
    }

    pub fn select_assignment(&mut self, assignment: impl Into<String>) {
        let assignment = assignment.into();
        tracing::info!("Selected assignment: {}", assignment);
        self.assignment = Some(assignment);
    }

    /// Once set, every appended message is also logged to the backend session.
    pub fn set_backend_session(&mut self, session_id: impl Into<String>) {
        self.backend_session_id = Some(session_id.into());
    }

    // --- Recording ---

    pub fn start_recording(&mut self) -> Result<(), RecordingError> {
        self.recording.start()?;
        self.timestamps.seed();
        Ok(())
    }

    pub fn pause_recording(&mut self) -> Result<(), RecordingError> {
        self.recording.pause()
    }

    pub fn resume_recording(&mut self) -> Result<(), RecordingError> {
        self.recording.resume()
    }

    /// Stops the recording and hands out the audio with its slide timestamps.
    ///
    /// If the recording was already finalized when the gate locked, that
    /// segment is returned together with the timestamps collected so far.
    pub async fn stop_recording(&mut self) -> Result<FinishedRecording, RecordingError> {
        self.paused_for_lock = false;
        let segment = if self.recording.is_active() {
            self.recording.stop().await?
        } else {
            match self.recording.segment() {
                Some(segment) if !self.timestamps.entries().is_empty() => segment.clone(),
                _ => {
                    return Err(RecordingError::InvalidTransition {
                        action: "stop",
                        status: RecordingStatus::Idle,
                    });
                }
            }
        };
        Ok(FinishedRecording {
            segment,
            timestamps: self.timestamps.take(),
        })
    }

    /// Called once per second by the runtime.
    pub fn tick(&mut self) -> bool {
        self.recording.tick()
    }

    // --- Navigation ---

    pub fn document_loaded(&mut self, total_slides: u32) {
        self.gate.document_loaded(total_slides);
        self.intervention.reset();
        self.lock_segment = None;
        tracing::info!(
            "Deck loaded with {} slides, lock triggers at {:?}",
            total_slides,
            self.gate.lock_trigger_slides()
        );
    }

    pub async fn request_advance(&mut self) -> AdvanceOutcome {
        let outcome = self.gate.request_advance();
        match outcome {
            AdvanceOutcome::Advanced(slide) => {
                self.leave_completed_intervention();
                if self.recording.is_active() {
                    self.timestamps
                        .record(slide, self.recording.elapsed_seconds());
                }
                self.emit(Command::SlideAdvanced(slide)).await;
            }
            AdvanceOutcome::Finished => {
                self.leave_completed_intervention();
                self.emit(Command::DeckFinished).await;
            }
            AdvanceOutcome::LockTriggered(slide) => {
                tracing::info!("Slide {} locked, starting intervention", slide);
                self.emit(Command::SlideLocked(slide)).await;
                self.enter_intervention(slide).await;
            }
            AdvanceOutcome::Refused => {
                tracing::debug!("Advance refused at slide {}", self.gate.current_slide());
            }
        }
        outcome
    }

    pub fn request_retreat(&mut self) -> u32 {
        self.gate.request_retreat()
    }

    /// Lifts the gate on the current slide. Safe to call repeatedly.
    ///
    /// A completed intervention is left on the next advance. Unlocking before
    /// both answers are in abandons the intervention right away.
    pub fn unlock(&mut self) {
        self.gate.unlock();
        tracing::info!("Slide {} unlocked", self.gate.current_slide());
        if self.intervention.state() != InterventionState::Complete {
            if self.intervention.state() == InterventionState::Questioning {
                tracing::info!("Intervention abandoned by manual unlock");
            }
            self.exit_intervention();
        }
    }

    fn leave_completed_intervention(&mut self) {
        if self.intervention.state() == InterventionState::Complete {
            self.exit_intervention();
        }
    }

    fn exit_intervention(&mut self) {
        self.intervention.reset();
        self.lock_segment = None;
        if !std::mem::take(&mut self.paused_for_lock) {
            return;
        }
        if self.recording.status() == RecordingStatus::Paused {
            match self.recording.resume() {
                Ok(()) => tracing::info!("Recording resumed after intervention"),
                Err(e) => tracing::warn!("Could not resume recording: {}", e),
            }
        }
    }

    // --- Intervention ---

    async fn enter_intervention(&mut self, trigger_slide: u32) {
        self.lock_segment = if self.config.capture_on_lock {
            self.recording.capture_current_segment().await
        } else {
            if self.recording.status() == RecordingStatus::Recording {
                match self.recording.pause() {
                    Ok(()) => self.paused_for_lock = true,
                    Err(e) => tracing::warn!("Could not pause recording at lock: {}", e),
                }
            }
            self.recording.segment().cloned()
        };
        self.ask_first_question(trigger_slide).await;
    }

    /// Re-runs intervention entry after a failed attempt. Only valid while the
    /// gate is locked and no intervention is running.
    pub async fn retry_intervention(&mut self) -> bool {
        if !self.gate.is_locked() || self.intervention.state() != InterventionState::Inactive {
            return false;
        }
        let slide = self.gate.current_slide();
        tracing::info!("Retrying intervention for slide {}", slide);
        self.ask_first_question(slide).await;
        true
    }

    async fn ask_first_question(&mut self, trigger_slide: u32) {
        let range = self.intervention.begin(trigger_slide);
        tracing::info!(
            "Intervention for slides {}-{} (audio attached: {})",
            range.start,
            range.end,
            self.lock_segment.is_some()
        );

        self.is_loading = true;
        let result = self.request_first_question(range).await;
        self.is_loading = false;

        match result {
            Ok(question) => self.say(question).await,
            Err(e) => {
                tracing::error!(
                    "Intervention for slides {}-{} failed: {:?}",
                    range.start,
                    range.end,
                    e
                );
                self.intervention.reset();
                let reason = format!("{e:#}");
                self.append(ChatMessage::error(&reason)).await;
                self.emit(Command::InterventionFailed(reason)).await;
            }
        }
    }

    async fn request_first_question(&self, range: SlideRange) -> Result<String> {
        let assignment = self
            .assignment
            .as_deref()
            .context("No assignment selected")?;
        let content = self
            .api
            .slide_content(assignment, range)
            .await
            .context("Failed to fetch slide content")?;
        let prompt =
            first_question_prompt(assignment, range, &content, self.lock_segment.is_some());
        let request = ChatRequest {
            session_id: self.backend_session_id.clone(),
            messages: vec![ChatMessage::user(prompt)],
            selected_assignment: assignment.to_string(),
            slide_number: Some(range.end),
            timestamp: Utc::now(),
            audio: self.lock_segment.clone(),
        };
        self.api
            .chat(request)
            .await
            .context("Failed to generate question")
    }

    async fn ask_follow_up(&mut self) {
        let Some(range) = self.intervention.slide_range() else {
            return;
        };
        let messages = self
            .history
            .with_extra(ChatMessage::user(follow_up_prompt(range)));
        let request = self.chat_request(messages, Some(self.gate.current_slide()));
        self.exchange(request).await;
    }

    async fn complete_intervention(&mut self) {
        self.say(COMPLETION_MESSAGE.to_string()).await;
        let auto_unlocked = self.config.auto_unlock;
        if auto_unlocked {
            self.gate.unlock();
        }
        tracing::info!("Intervention complete (auto unlocked: {})", auto_unlocked);
        self.emit(Command::InterventionComplete { auto_unlocked })
            .await;
    }

    // --- Conversation ---

    /// Appends the user's message, then either answers an intervention question
    /// or runs a normal chat turn.
    pub async fn send_message(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.append(ChatMessage::user(text)).await;

        match self.intervention.record_answer() {
            AnswerOutcome::AskFollowUp => self.ask_follow_up().await,
            AnswerOutcome::Completed => self.complete_intervention().await,
            AnswerOutcome::Ignored => {
                let request = self.chat_request(self.history.messages().to_vec(), None);
                self.exchange(request).await;
            }
        }
    }

    fn chat_request(&self, messages: Vec<ChatMessage>, slide_number: Option<u32>) -> ChatRequest {
        ChatRequest {
            session_id: self.backend_session_id.clone(),
            messages,
            selected_assignment: self.assignment.clone().unwrap_or_default(),
            slide_number,
            timestamp: Utc::now(),
            audio: None,
        }
    }

    async fn exchange(&mut self, request: ChatRequest) {
        self.is_loading = true;
        let result = self.api.chat(request).await;
        self.is_loading = false;
        match result {
            Ok(reply) => self.say(reply).await,
            Err(e) => {
                tracing::error!("Chat request failed: {:?}", e);
                self.append(ChatMessage::error(format!("{e:#}"))).await;
            }
        }
    }

    /// Appends an assistant message and asks the runtime to speak it.
    async fn say(&mut self, text: String) {
        self.append(ChatMessage::assistant(text.clone())).await;
        self.emit(Command::SpeakText(text)).await;
    }

    async fn append(&mut self, message: ChatMessage) {
        self.history.push(message.clone());
        if let Some(session_id) = &self.backend_session_id {
            let entry = ConversationLogEntry {
                role: message.role,
                content: message.content,
                slide_number: Some(self.gate.current_slide()),
                timestamp: Utc::now(),
            };
            if let Err(e) = self.api.log_conversation(session_id, entry).await {
                tracing::warn!("Failed to log conversation turn: {:#}", e);
            }
        }
    }

    async fn emit(&self, command: Command) {
        if let Err(e) = self.command_tx.send(command).await {
            tracing::warn!("Runtime stopped listening, dropped {:?}", e.0);
        }
    }

    // --- Feedback ---

    /// Submits the conversation (and the recording, if any) for feedback and
    /// stores the result under `pitchFeedback`.
    pub async fn generate_feedback(
        &mut self,
        recording: Option<FinishedRecording>,
        store: &mut LocalStore,
    ) -> Result<FeedbackReport> {
        if self.history.is_empty() {
            anyhow::bail!("Nothing to give feedback on yet, the conversation is empty");
        }
        let pdf_slide_count = store
            .get(StoreKey::CurrentPdfSlideCount)
            .and_then(|count| count.parse().ok())
            .or(self.gate.total_slides());
        let request = FeedbackRequest {
            messages: self.history.messages().to_vec(),
            selected_assignment: self.assignment.clone().unwrap_or_default(),
            pdf_session_id: store.get(StoreKey::CurrentPdfSession).map(str::to_string),
            pdf_slide_count,
            recording,
        };

        self.is_loading = true;
        let result = self.api.submit_feedback(request).await;
        self.is_loading = false;

        let report = result.context("Failed to generate feedback")?;
        store
            .set(StoreKey::PitchFeedback, report.to_store_value()?)
            .context("Failed to store feedback")?;
        tracing::info!("Feedback generated: {}", report.summary());
        Ok(report)
    }

    // --- Observation ---

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            recording_status: self.recording.status(),
            elapsed_seconds: self.recording.elapsed_seconds(),
            elapsed_display: format_elapsed(self.recording.elapsed_seconds()),
            has_segment: self.recording.segment().is_some(),
            current_slide: self.gate.current_slide(),
            total_slides: self.gate.total_slides(),
            locked: self.gate.is_locked(),
            auto_unlock_ready: self.intervention.auto_unlock_ready(),
            intervention_state: self.intervention.state(),
            questions_asked: self.intervention.questions_asked(),
            slide_range: self.intervention.slide_range(),
            messages: self.history.messages().to_vec(),
            slide_timestamps: self.timestamps.entries().to_vec(),
            is_loading: self.is_loading,
            assignment: self.assignment.clone(),
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn intervention_state(&self) -> InterventionState {
        self.intervention.state()
    }

    pub fn recording_status(&self) -> RecordingStatus {
        self.recording.status()
    }

    pub fn is_locked(&self) -> bool {
        self.gate.is_locked()
    }

    pub fn current_slide(&self) -> u32 {
        self.gate.current_slide()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }
}

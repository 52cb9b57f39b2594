//! Speech players for the command handler.
//!
//! [`ElevenLabsPlayer`] synthesizes with the ElevenLabs text-to-speech API and
//! plays the returned audio through rodio. [`TranscriptPlayer`] is used when no
//! API key is configured and only prints what would have been said.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pitch_core::speech::{SpeechNotifier, SpeechPlayer, SpeechStatus, clean_text_for_speech};
use rodio::{Decoder, OutputStream, Sink};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::io::Cursor;
use std::sync::{Arc, mpsc};
use std::time::Duration;

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const ELEVENLABS_MODEL_ID: &str = "eleven_monolingual_v1";
const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

enum Playback {
    Play(Vec<u8>),
    Stop,
}

pub struct ElevenLabsPlayer {
    client: reqwest::Client,
    api_key: SecretString,
    voice_id: String,
    notifier: Arc<SpeechNotifier>,
    playback_tx: mpsc::Sender<Playback>,
}

impl ElevenLabsPlayer {
    pub fn new(
        api_key: SecretString,
        voice_id: impl Into<String>,
        notifier: Arc<SpeechNotifier>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build speech HTTP client")?;

        // rodio's output stream is not Send, so it lives on its own thread
        let (playback_tx, playback_rx) = mpsc::channel();
        let thread_notifier = notifier.clone();
        std::thread::Builder::new()
            .name("speech-playback".into())
            .spawn(move || playback_loop(playback_rx, thread_notifier))
            .context("Failed to spawn playback thread")?;

        Ok(Self {
            client,
            api_key,
            voice_id: voice_id.into(),
            notifier,
            playback_tx,
        })
    }

    fn endpoint(&self) -> String {
        format!("{ELEVENLABS_BASE_URL}/{}", self.voice_id)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = json!({
            "text": text,
            "model_id": ELEVENLABS_MODEL_ID,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.5,
            },
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to reach the speech service")?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            anyhow::bail!("Speech synthesis failed with {status}: {message}");
        }
        let bytes = response
            .bytes()
            .await
            .context("Failed to read synthesized audio")?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechPlayer for ElevenLabsPlayer {
    async fn speak(&self, text: &str) -> Result<()> {
        self.stop();
        let text = clean_text_for_speech(text);
        if text.is_empty() {
            return Ok(());
        }

        self.notifier.set(SpeechStatus::LOADING);
        let audio = match self.synthesize(&text).await {
            Ok(audio) => audio,
            Err(e) => {
                self.notifier.set(SpeechStatus::IDLE);
                return Err(e);
            }
        };
        tracing::debug!("Synthesized {} bytes of speech", audio.len());

        if self.playback_tx.send(Playback::Play(audio)).is_err() {
            self.notifier.set(SpeechStatus::IDLE);
            anyhow::bail!("Playback thread is not running");
        }
        Ok(())
    }

    fn stop(&self) {
        // a closed channel means nothing can be playing
        let _ = self.playback_tx.send(Playback::Stop);
    }
}

fn playback_loop(playback_rx: mpsc::Receiver<Playback>, notifier: Arc<SpeechNotifier>) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(output) => output,
        Err(e) => {
            tracing::error!("No audio output available, speech disabled: {}", e);
            notifier.set(SpeechStatus::IDLE);
            return;
        }
    };
    let mut current: Option<Sink> = None;

    loop {
        match playback_rx.recv_timeout(PLAYBACK_POLL_INTERVAL) {
            Ok(Playback::Play(audio)) => {
                if let Some(sink) = current.take() {
                    sink.stop();
                }
                let source = match Decoder::new(Cursor::new(audio)) {
                    Ok(source) => source,
                    Err(e) => {
                        tracing::error!("Failed to decode speech audio: {}", e);
                        notifier.set(SpeechStatus::IDLE);
                        continue;
                    }
                };
                match Sink::try_new(&handle) {
                    Ok(sink) => {
                        sink.append(source);
                        notifier.set(SpeechStatus::SPEAKING);
                        current = Some(sink);
                    }
                    Err(e) => {
                        tracing::error!("Failed to open playback sink: {}", e);
                        notifier.set(SpeechStatus::IDLE);
                    }
                }
            }
            Ok(Playback::Stop) => {
                if let Some(sink) = current.take() {
                    sink.stop();
                    notifier.set(SpeechStatus::IDLE);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if current.as_ref().is_some_and(Sink::empty) {
                    current = None;
                    notifier.set(SpeechStatus::IDLE);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(sink) = current.take() {
        sink.stop();
    }
    notifier.set(SpeechStatus::IDLE);
    tracing::debug!("Playback thread stopped");
}

/// Prints spoken text instead of playing it.
pub struct TranscriptPlayer {
    notifier: Arc<SpeechNotifier>,
}

impl TranscriptPlayer {
    pub fn new(notifier: Arc<SpeechNotifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl SpeechPlayer for TranscriptPlayer {
    async fn speak(&self, text: &str) -> Result<()> {
        let text = clean_text_for_speech(text);
        if text.is_empty() {
            return Ok(());
        }
        self.notifier.set(SpeechStatus::SPEAKING);
        tracing::info!("Speaking: {}", text);
        self.notifier.set(SpeechStatus::IDLE);
        Ok(())
    }

    fn stop(&self) {
        self.notifier.set(SpeechStatus::IDLE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transcript_player_reports_speaking_then_idle() {
        let notifier = Arc::new(SpeechNotifier::new());
        let mut subscription = notifier.subscribe().unwrap();
        let player = TranscriptPlayer::new(notifier.clone());

        player.speak("**Why** this market?").await.unwrap();

        let mut seen = Vec::new();
        while let Ok(status) = subscription.updates.try_recv() {
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![SpeechStatus::IDLE, SpeechStatus::SPEAKING, SpeechStatus::IDLE]
        );
    }

    #[tokio::test]
    async fn test_blank_text_is_not_spoken() {
        let notifier = Arc::new(SpeechNotifier::new());
        let player = TranscriptPlayer::new(notifier.clone());
        player.speak("   ").await.unwrap();
        assert_eq!(notifier.status(), SpeechStatus::IDLE);
    }

    #[test]
    fn test_endpoint_includes_voice() {
        let notifier = Arc::new(SpeechNotifier::new());
        let player = ElevenLabsPlayer::new(
            SecretString::from("key".to_string()),
            "voice-123",
            notifier,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            player.endpoint(),
            "https://api.elevenlabs.io/v1/text-to-speech/voice-123"
        );
    }
}

//! Recording lifecycle: start, pause, resume, stop and elapsed-time accounting.
//!
//! The physical microphone sits behind [`AudioCapture`] so the lifecycle can be
//! driven in tests without a device. The lifecycle owns the capture exclusively
//! and releases it on every exit path, including drop.

use crate::timestamps::SlideTimestamp;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use std::sync::Arc;

/// MIME type used for every finalized segment.
pub const SEGMENT_MIME_TYPE: &str = "audio/wav";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    #[default]
    Idle,
    Recording,
    Paused,
}

/// A finalized, immutable piece of captured audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl AudioSegment {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new(bytes, SEGMENT_MIME_TYPE)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What a stopped recording hands over for feedback generation.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRecording {
    pub segment: AudioSegment,
    pub timestamps: Vec<SlideTimestamp>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordingError {
    #[error("Microphone unavailable: {0}")]
    Device(String),
    #[error("Cannot {action} while recording is {status:?}")]
    InvalidTransition {
        action: &'static str,
        status: RecordingStatus,
    },
    #[error("Failed to finalize recording: {0}")]
    Finalize(String),
}

/// Exclusive access to a microphone.
///
/// `acquire` opens the device and starts buffering chunks. `finalize` turns the
/// buffered chunks into one immutable [`AudioSegment`]. `release` gives the
/// device back and must be safe to call more than once.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AudioCapture: Send {
    fn acquire(&mut self) -> Result<(), RecordingError>;

    fn pause(&mut self);

    fn resume(&mut self);

    async fn finalize(&mut self) -> Result<AudioSegment>;

    fn release(&mut self);
}

pub struct RecordingLifecycle {
    capture: Box<dyn AudioCapture>,
    status: RecordingStatus,
    started_at: Option<DateTime<Utc>>,
    elapsed_seconds: u64,
    segment: Option<AudioSegment>,
}

impl RecordingLifecycle {
    pub fn new(capture: Box<dyn AudioCapture>) -> Self {
        Self {
            capture,
            status: RecordingStatus::Idle,
            started_at: None,
            elapsed_seconds: 0,
            segment: None,
        }
    }

    pub fn start(&mut self) -> Result<(), RecordingError> {
        if self.status != RecordingStatus::Idle {
            return Err(self.invalid("start"));
        }
        self.capture.acquire()?;
        self.status = RecordingStatus::Recording;
        self.started_at = Some(Utc::now());
        self.elapsed_seconds = 0;
        tracing::info!("Recording started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), RecordingError> {
        if self.status != RecordingStatus::Recording {
            return Err(self.invalid("pause"));
        }
        self.capture.pause();
        self.status = RecordingStatus::Paused;
        tracing::info!("Recording paused at {}s", self.elapsed_seconds);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), RecordingError> {
        if self.status != RecordingStatus::Paused {
            return Err(self.invalid("resume"));
        }
        self.capture.resume();
        self.status = RecordingStatus::Recording;
        tracing::info!("Recording resumed at {}s", self.elapsed_seconds);
        Ok(())
    }

    /// Finalizes the captured audio and releases the microphone.
    pub async fn stop(&mut self) -> Result<AudioSegment, RecordingError> {
        if self.status == RecordingStatus::Idle {
            return Err(self.invalid("stop"));
        }
        let finalized = self.capture.finalize().await;
        self.capture.release();
        self.status = RecordingStatus::Idle;
        self.started_at = None;

        match finalized {
            Ok(segment) => {
                tracing::info!(
                    "Recording stopped after {}s ({} bytes)",
                    self.elapsed_seconds,
                    segment.len()
                );
                self.segment = Some(segment.clone());
                Ok(segment)
            }
            Err(e) => {
                tracing::error!("Failed to finalize recording: {:?}", e);
                Err(RecordingError::Finalize(e.to_string()))
            }
        }
    }

    /// Stops an active recording and returns its segment, or hands back the last
    /// known segment when nothing is recording.
    pub async fn capture_current_segment(&mut self) -> Option<AudioSegment> {
        if !self.is_active() {
            tracing::debug!("No active recording, using existing segment");
            return self.segment.clone();
        }
        match self.stop().await {
            Ok(segment) => Some(segment),
            Err(e) => {
                tracing::warn!("Could not capture current segment: {}", e);
                self.segment.clone()
            }
        }
    }

    /// Advances the elapsed counter by one second. Returns whether it advanced.
    pub fn tick(&mut self) -> bool {
        if self.status == RecordingStatus::Recording {
            self.elapsed_seconds += 1;
            true
        } else {
            false
        }
    }

    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status != RecordingStatus::Idle
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn segment(&self) -> Option<&AudioSegment> {
        self.segment.as_ref()
    }

    fn invalid(&self, action: &'static str) -> RecordingError {
        RecordingError::InvalidTransition {
            action,
            status: self.status,
        }
    }
}

impl Drop for RecordingLifecycle {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::warn!("Recording dropped while active, releasing microphone");
            self.capture.release();
        }
    }
}

/// Formats seconds as `m:ss`.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn working_capture(bytes: Vec<u8>) -> MockAudioCapture {
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture.expect_pause().return_const(());
        capture.expect_resume().return_const(());
        capture
            .expect_finalize()
            .returning(move || Ok(AudioSegment::wav(bytes.clone())));
        capture.expect_release().return_const(());
        capture
    }

    fn tick_n(recording: &mut RecordingLifecycle, n: usize) {
        for _ in 0..n {
            recording.tick();
        }
    }

    #[test]
    fn test_start_resets_elapsed_and_sets_started_at() {
        let mut recording = RecordingLifecycle::new(Box::new(working_capture(vec![])));
        recording.start().unwrap();
        assert_eq!(recording.status(), RecordingStatus::Recording);
        assert_eq!(recording.elapsed_seconds(), 0);
        assert!(recording.started_at().is_some());
    }

    #[test]
    fn test_device_error_leaves_recording_idle() {
        let mut capture = MockAudioCapture::new();
        capture
            .expect_acquire()
            .returning(|| Err(RecordingError::Device("permission denied".into())))
            .once();
        let mut recording = RecordingLifecycle::new(Box::new(capture));

        let err = recording.start().unwrap_err();
        assert!(matches!(err, RecordingError::Device(_)));
        assert_eq!(recording.status(), RecordingStatus::Idle);
        assert!(recording.started_at().is_none());
    }

    #[test]
    fn test_pause_and_resume_keep_elapsed() {
        let mut recording = RecordingLifecycle::new(Box::new(working_capture(vec![])));
        recording.start().unwrap();
        tick_n(&mut recording, 5);

        recording.pause().unwrap();
        tick_n(&mut recording, 10);
        assert_eq!(recording.elapsed_seconds(), 5);

        recording.resume().unwrap();
        tick_n(&mut recording, 3);
        assert_eq!(recording.elapsed_seconds(), 8);

        recording.pause().unwrap();
        recording.resume().unwrap();
        recording.tick();
        assert_eq!(recording.elapsed_seconds(), 9);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut recording = RecordingLifecycle::new(Box::new(working_capture(vec![])));
        assert!(recording.pause().is_err());
        assert!(recording.resume().is_err());
        recording.start().unwrap();
        assert!(recording.resume().is_err());
        assert!(matches!(
            recording.start(),
            Err(RecordingError::InvalidTransition { action: "start", .. })
        ));
    }

    #[test]
    fn test_tick_only_counts_while_recording() {
        let mut recording = RecordingLifecycle::new(Box::new(working_capture(vec![])));
        assert!(!recording.tick());
        recording.start().unwrap();
        assert!(recording.tick());
        assert_eq!(recording.elapsed_seconds(), 1);
    }

    #[tokio::test]
    async fn test_stop_finalizes_then_releases() {
        let mut seq = Sequence::new();
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture
            .expect_finalize()
            .once()
            .in_sequence(&mut seq)
            .returning(|| Ok(AudioSegment::wav(vec![1, 2, 3])));
        capture
            .expect_release()
            .once()
            .in_sequence(&mut seq)
            .return_const(());

        let mut recording = RecordingLifecycle::new(Box::new(capture));
        recording.start().unwrap();
        let segment = recording.stop().await.unwrap();

        assert_eq!(segment.bytes(), &[1, 2, 3]);
        assert_eq!(segment.mime_type(), SEGMENT_MIME_TYPE);
        assert_eq!(recording.status(), RecordingStatus::Idle);
        assert!(recording.started_at().is_none());
        assert_eq!(recording.segment(), Some(&segment));
    }

    #[tokio::test]
    async fn test_stop_from_paused_is_allowed() {
        let mut recording = RecordingLifecycle::new(Box::new(working_capture(vec![9])));
        recording.start().unwrap();
        recording.pause().unwrap();
        assert!(recording.stop().await.is_ok());
        assert!(matches!(
            recording.stop().await,
            Err(RecordingError::InvalidTransition { action: "stop", .. })
        ));
    }

    #[tokio::test]
    async fn test_finalize_failure_still_releases_device() {
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture
            .expect_finalize()
            .returning(|| Err(anyhow::anyhow!("stream closed")));
        capture.expect_release().once().return_const(());

        let mut recording = RecordingLifecycle::new(Box::new(capture));
        recording.start().unwrap();
        assert!(matches!(
            recording.stop().await,
            Err(RecordingError::Finalize(_))
        ));
        assert_eq!(recording.status(), RecordingStatus::Idle);
    }

    #[tokio::test]
    async fn test_capture_current_segment_without_recording_returns_last() {
        let mut recording = RecordingLifecycle::new(Box::new(working_capture(vec![7, 7])));
        assert_eq!(recording.capture_current_segment().await, None);

        recording.start().unwrap();
        let captured = recording.capture_current_segment().await.unwrap();
        assert_eq!(captured.bytes(), &[7, 7]);
        assert!(!recording.is_active());

        assert_eq!(recording.capture_current_segment().await, Some(captured));
    }

    #[test]
    fn test_drop_while_active_releases_device() {
        let mut capture = MockAudioCapture::new();
        capture.expect_acquire().returning(|| Ok(()));
        capture.expect_release().once().return_const(());

        let mut recording = RecordingLifecycle::new(Box::new(capture));
        recording.start().unwrap();
        drop(recording);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0:00");
        assert_eq!(format_elapsed(75), "1:15");
        assert_eq!(format_elapsed(600), "10:00");
    }
}

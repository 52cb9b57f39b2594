//! Client side of the practice backend: chat, slide extraction, feedback,
//! session logging and the professor endpoints.

use crate::{
    conversation::{ChatMessage, Role},
    feedback::{FeedbackRecord, FeedbackReport},
    intervention::SlideRange,
    recording::{AudioSegment, FinishedRecording},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use reqwest::{
    Client, Response,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{fmt, time::Duration};

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001/api";

const INTERVENTION_AUDIO_FILE: &str = "recording.wav";
const PRESENTATION_AUDIO_FILE: &str = "presentation.wav";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{endpoint} failed with status {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
}

/// Backend ids come back as numbers from some endpoints and strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub selected_assignment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
    /// Sent as a multipart `audio` file when present.
    #[serde(skip)]
    pub audio: Option<AudioSegment>,
}

#[derive(Debug, Clone)]
pub struct FeedbackRequest {
    pub messages: Vec<ChatMessage>,
    pub selected_assignment: String,
    pub pdf_session_id: Option<String>,
    pub pdf_slide_count: Option<u32>,
    pub recording: Option<FinishedRecording>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackBody<'a> {
    messages: &'a [ChatMessage],
    selected_assignment: &'a str,
    pdf_session_id: Option<&'a str>,
    pdf_slide_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub student_name: String,
    pub slide_count: Option<u32>,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session_id: RecordId,
    pub student_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationLogEntry {
    pub role: Role,
    pub content: String,
    pub slide_number: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Student {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedConversation {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub slide_number: Option<u32>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// A practice session as listed on the professor dashboard.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: RecordId,
    #[serde(default)]
    pub student: Option<Student>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub slide_count: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub feedback: Option<FeedbackRecord>,
    #[serde(default)]
    pub conversations: Vec<LoggedConversation>,
}

impl SessionRecord {
    pub fn student_name(&self) -> &str {
        self.student.as_ref().map_or("Unknown", |s| s.name.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    response: String,
}

#[derive(Debug, Deserialize)]
struct SlideContentReply {
    focused_content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct SlideRangeBody {
    start_slide: u32,
    end_slide: u32,
}

/// Everything the session controller and the professor commands need from the
/// backend. Failures are plain `anyhow` errors; the caller decides whether they
/// become an inline error message, a log line or a returned error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PresentationApi: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<String>;

    /// Text of the slides in `range` for the given assignment.
    async fn slide_content(&self, assignment: &str, range: SlideRange) -> Result<String>;

    async fn submit_feedback(&self, request: FeedbackRequest) -> Result<FeedbackReport>;

    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSession>;

    async fn log_conversation(&self, session_id: &str, entry: ConversationLogEntry)
    -> Result<()>;

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    async fn get_session(&self, id: &str) -> Result<SessionRecord>;

    async fn mark_reviewed(&self, id: &str) -> Result<()>;
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Every request shares `timeout`, so a stalled backend surfaces as an error.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(endpoint: &str, resp: Response) -> Result<T> {
        let resp = Self::check(endpoint, resp).await?;
        resp.json::<T>()
            .await
            .with_context(|| format!("Failed to decode {endpoint} response"))
    }

    async fn check(endpoint: &str, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
        };
        Err(ApiError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        }
        .into())
    }

    fn audio_part(segment: &AudioSegment, file_name: &'static str) -> Result<Part> {
        Part::bytes(segment.bytes().to_vec())
            .file_name(file_name)
            .mime_str(segment.mime_type())
            .context("Invalid audio MIME type")
    }

    fn chat_form(request: &ChatRequest, audio: &AudioSegment) -> Result<Form> {
        let mut form = Form::new()
            .text("messages", serde_json::to_string(&request.messages)?)
            .text("selectedAssignment", request.selected_assignment.clone())
            .text("timestamp", request.timestamp.to_rfc3339())
            .part("audio", Self::audio_part(audio, INTERVENTION_AUDIO_FILE)?);
        if let Some(session_id) = &request.session_id {
            form = form.text("sessionId", session_id.clone());
        }
        if let Some(slide) = request.slide_number {
            form = form.text("slideNumber", slide.to_string());
        }
        Ok(form)
    }

    fn feedback_form(request: &FeedbackRequest, recording: &FinishedRecording) -> Result<Form> {
        let mut form = Form::new()
            .text("messages", serde_json::to_string(&request.messages)?)
            .text("selectedAssignment", request.selected_assignment.clone())
            .part(
                "recording",
                Self::audio_part(&recording.segment, PRESENTATION_AUDIO_FILE)?,
            )
            .text(
                "slideTimestamps",
                serde_json::to_string(&recording.timestamps)?,
            );
        if let Some(id) = &request.pdf_session_id {
            form = form.text("pdfSessionId", id.clone());
        }
        if let Some(count) = request.pdf_slide_count {
            form = form.text("pdfSlideCount", count.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl PresentationApi for ApiClient {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let builder = self.client.post(self.url("/chat"));
        let builder = match &request.audio {
            Some(audio) => {
                tracing::debug!("Sending chat with {} bytes of audio", audio.len());
                builder.multipart(Self::chat_form(&request, audio)?)
            }
            None => builder.json(&request),
        };
        let resp = builder.send().await.context("Chat request failed")?;
        let reply: ChatReply = Self::decode("chat", resp).await?;
        Ok(reply.response)
    }

    async fn slide_content(&self, assignment: &str, range: SlideRange) -> Result<String> {
        let body = SlideRangeBody {
            start_slide: range.start,
            end_slide: range.end,
        };
        let resp = self
            .client
            .post(self.url(&format!("/assignments/{assignment}/slides")))
            .json(&body)
            .send()
            .await
            .context("Slide content request failed")?;
        let reply: SlideContentReply = Self::decode("slide content", resp).await?;
        Ok(reply.focused_content)
    }

    async fn submit_feedback(&self, request: FeedbackRequest) -> Result<FeedbackReport> {
        let builder = self.client.post(self.url("/feedback"));
        let builder = match &request.recording {
            Some(recording) => {
                tracing::info!(
                    "Submitting feedback with {} bytes of audio and {} slide timestamps",
                    recording.segment.len(),
                    recording.timestamps.len()
                );
                builder.multipart(Self::feedback_form(&request, recording)?)
            }
            None => builder.json(&FeedbackBody {
                messages: &request.messages,
                selected_assignment: &request.selected_assignment,
                pdf_session_id: request.pdf_session_id.as_deref(),
                pdf_slide_count: request.pdf_slide_count,
            }),
        };
        let resp = builder.send().await.context("Feedback request failed")?;
        Self::decode("feedback", resp).await
    }

    async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSession> {
        let resp = self
            .client
            .post(self.url("/session/create"))
            .json(&request)
            .send()
            .await
            .context("Create session request failed")?;
        Self::decode("create session", resp).await
    }

    async fn log_conversation(
        &self,
        session_id: &str,
        entry: ConversationLogEntry,
    ) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/session/{session_id}/conversations")))
            .json(&entry)
            .send()
            .await
            .context("Conversation log request failed")?;
        Self::check("log conversation", resp).await?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let resp = self
            .client
            .get(self.url("/professor/sessions"))
            .send()
            .await
            .context("List sessions request failed")?;
        Self::decode("list sessions", resp).await
    }

    async fn get_session(&self, id: &str) -> Result<SessionRecord> {
        let resp = self
            .client
            .get(self.url(&format!("/professor/session/{id}")))
            .send()
            .await
            .context("Get session request failed")?;
        Self::decode("get session", resp).await
    }

    async fn mark_reviewed(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .put(self.url(&format!("/professor/session/{id}/reviewed")))
            .send()
            .await
            .context("Mark reviewed request failed")?;
        Self::check("mark reviewed", resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chat_request_json_shape() {
        let request = ChatRequest {
            session_id: Some("42".into()),
            messages: vec![ChatMessage::user("hello")],
            selected_assignment: "deck.pdf".into(),
            slide_number: Some(3),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
            audio: Some(AudioSegment::wav(vec![1])),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sessionId"], "42");
        assert_eq!(json["selectedAssignment"], "deck.pdf");
        assert_eq!(json["slideNumber"], 3);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["timestamp"], "2025-01-02T03:04:05Z");
        assert!(json.get("audio").is_none());
    }

    #[test]
    fn test_optional_chat_fields_are_omitted() {
        let request = ChatRequest {
            session_id: None,
            messages: vec![],
            selected_assignment: "deck.pdf".into(),
            slide_number: None,
            timestamp: Utc::now(),
            audio: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("sessionId").is_none());
        assert!(json.get("slideNumber").is_none());
    }

    #[test]
    fn test_session_record_accepts_numeric_and_string_ids() {
        let numeric: SessionRecord = serde_json::from_str(
            r#"{"id": 7, "student": {"name": "Ada"}, "slideCount": 6, "status": "completed"}"#,
        )
        .unwrap();
        assert_eq!(numeric.id.to_string(), "7");
        assert_eq!(numeric.student_name(), "Ada");
        assert!(numeric.conversations.is_empty());

        let text: SessionRecord = serde_json::from_str(r#"{"id": "s-1"}"#).unwrap();
        assert_eq!(text.id, RecordId::Text("s-1".into()));
        assert_eq!(text.student_name(), "Unknown");
    }

    #[test]
    fn test_session_detail_with_feedback_and_conversations() {
        let raw = r#"{
            "id": 3,
            "createdAt": "2025-01-01T10:00:00Z",
            "feedback": {"presentationScore": 9, "overallFeedback": "Great"},
            "conversations": [{"role": "assistant", "content": "Why now?", "slideNumber": 2}]
        }"#;
        let record: SessionRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.feedback.unwrap().presentation_score, Some(9));
        assert_eq!(record.conversations[0].slide_number, Some(2));
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:5001/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:5001/api");
        assert_eq!(client.url("/chat"), "http://localhost:5001/api/chat");
    }

    #[test]
    fn test_conversation_log_entry_shape() {
        let entry = ConversationLogEntry {
            role: Role::Assistant,
            content: "Question".into(),
            slide_number: Some(4),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["slideNumber"], 4);
    }
}

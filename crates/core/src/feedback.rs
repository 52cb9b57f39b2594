use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shown when a stored feedback record has no text at all.
pub const EMPTY_FEEDBACK_TEXT: &str = "No feedback text provided.";

/// What the feedback endpoint returns. Newer backends send per-slide analysis,
/// older ones a single block of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedbackReport {
    Structured(StructuredFeedback),
    Legacy { feedback: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub slides: Vec<SlideFeedback>,
    #[serde(default)]
    pub qa_feedback: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideFeedback {
    pub slide_number: u32,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl FeedbackReport {
    /// The value persisted under the `pitchFeedback` key: legacy text as-is,
    /// structured reports as their JSON encoding.
    pub fn to_store_value(&self) -> Result<String> {
        match self {
            FeedbackReport::Legacy { feedback } => Ok(feedback.clone()),
            FeedbackReport::Structured(_) => Ok(serde_json::to_string(self)?),
        }
    }

    pub fn from_store_value(value: &str) -> Self {
        serde_json::from_str(value).unwrap_or_else(|_| FeedbackReport::Legacy {
            feedback: value.to_string(),
        })
    }

    pub fn summary(&self) -> String {
        match self {
            FeedbackReport::Legacy { feedback } => feedback.clone(),
            FeedbackReport::Structured(report) => {
                let mut summary = format!("{} slides analyzed", report.slides.len());
                if let Some(id) = &report.session_id {
                    summary.push_str(&format!(" (session {id})"));
                }
                summary
            }
        }
    }
}

/// Feedback as the professor endpoints store it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    #[serde(default)]
    pub presentation_score: Option<i64>,
    #[serde(default)]
    pub overall_feedback: Option<String>,
    #[serde(default)]
    pub slide_feedback: Option<String>,
    #[serde(default)]
    pub strengths: Option<String>,
    #[serde(default)]
    pub improvements: Option<String>,
}

impl FeedbackRecord {
    /// Renders the record as plain text, one headed section per present field.
    pub fn render_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(score) = self.presentation_score {
            parts.push(format!("Presentation Score: {score}"));
        }
        let sections = [
            ("Overall Feedback", &self.overall_feedback),
            ("Slide Feedback", &self.slide_feedback),
            ("Strengths", &self.strengths),
            ("Improvements", &self.improvements),
        ];
        for (title, body) in sections {
            if let Some(body) = body.as_deref().filter(|b| !b.is_empty()) {
                parts.push(format!("\n{title}:\n{body}"));
            }
        }
        let text = parts.join("\n");
        let text = text.trim();
        if text.is_empty() {
            EMPTY_FEEDBACK_TEXT.to_string()
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_response_parses() {
        let report: FeedbackReport =
            serde_json::from_str(r#"{"feedback":"Solid pitch."}"#).unwrap();
        assert_eq!(
            report,
            FeedbackReport::Legacy {
                feedback: "Solid pitch.".into()
            }
        );
        assert_eq!(report.to_store_value().unwrap(), "Solid pitch.");
    }

    #[test]
    fn test_structured_response_parses_and_round_trips_through_store() {
        let raw = r#"{
            "session_id": "abc",
            "slides": [{"slide_number": 1, "score": 7}],
            "qa_feedback": {"summary": "ok"},
            "metadata": {"total_slides": 1}
        }"#;
        let report: FeedbackReport = serde_json::from_str(raw).unwrap();
        let FeedbackReport::Structured(structured) = &report else {
            panic!("expected structured feedback");
        };
        assert_eq!(structured.slides[0].slide_number, 1);
        assert_eq!(structured.slides[0].details["score"], 7);
        assert_eq!(report.summary(), "1 slides analyzed (session abc)");

        let stored = report.to_store_value().unwrap();
        assert_eq!(FeedbackReport::from_store_value(&stored), report);
    }

    #[test]
    fn test_plain_stored_text_is_legacy() {
        assert_eq!(
            FeedbackReport::from_store_value("Great job"),
            FeedbackReport::Legacy {
                feedback: "Great job".into()
            }
        );
    }

    #[test]
    fn test_record_renders_sections() {
        let record = FeedbackRecord {
            presentation_score: Some(8),
            overall_feedback: Some("Clear story.".into()),
            strengths: Some("Pacing".into()),
            ..Default::default()
        };
        assert_eq!(
            record.render_text(),
            "Presentation Score: 8\n\nOverall Feedback:\nClear story.\n\nStrengths:\nPacing"
        );
    }

    #[test]
    fn test_empty_record_falls_back() {
        assert_eq!(FeedbackRecord::default().render_text(), EMPTY_FEEDBACK_TEXT);
    }
}

use anyhow::{Context, Result};
use clap::Subcommand;
use pitch_core::api::{PresentationApi, SessionRecord};

#[derive(Debug, Subcommand)]
pub enum ProfessorCommand {
    /// List every practice session
    Sessions,
    /// Show one session with its conversation and feedback
    Show { id: String },
    /// Mark a session as reviewed
    Review { id: String },
}

pub async fn run(api: &dyn PresentationApi, command: ProfessorCommand) -> Result<()> {
    match command {
        ProfessorCommand::Sessions => {
            let sessions = api.list_sessions().await.context("Failed to list sessions")?;
            println!("{}", render_session_list(&sessions));
        }
        ProfessorCommand::Show { id } => {
            let session = api
                .get_session(&id)
                .await
                .with_context(|| format!("Failed to load session {id}"))?;
            println!("{}", render_session_detail(&session));
        }
        ProfessorCommand::Review { id } => {
            api.mark_reviewed(&id)
                .await
                .with_context(|| format!("Failed to mark session {id} as reviewed"))?;
            tracing::info!("Session {} marked as reviewed", id);
            println!("Session {id} marked as reviewed.");
        }
    }
    Ok(())
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

pub fn render_session_list(sessions: &[SessionRecord]) -> String {
    if sessions.is_empty() {
        return "No sessions yet.".to_string();
    }
    let mut lines = vec![format!(
        "{:<8} {:<20} {:<26} {:>6}  {}",
        "ID", "STUDENT", "CREATED", "SLIDES", "STATUS"
    )];
    for session in sessions {
        let slides = session
            .slide_count
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        lines.push(format!(
            "{:<8} {:<20} {:<26} {:>6}  {}",
            session.id.to_string(),
            session.student_name(),
            or_dash(session.created_at.as_deref()),
            slides,
            or_dash(session.status.as_deref()),
        ));
    }
    lines.join("\n")
}

pub fn render_session_detail(session: &SessionRecord) -> String {
    let mut out = vec![
        format!("Session {}", session.id),
        format!("Student:   {}", session.student_name()),
        format!("Created:   {}", or_dash(session.created_at.as_deref())),
        format!("Completed: {}", or_dash(session.completed_at.as_deref())),
        format!("Status:    {}", or_dash(session.status.as_deref())),
    ];

    out.push(String::new());
    out.push("Conversation:".to_string());
    if session.conversations.is_empty() {
        out.push("  (none)".to_string());
    }
    for entry in &session.conversations {
        let slide = entry
            .slide_number
            .map(|n| format!(" [slide {n}]"))
            .unwrap_or_default();
        out.push(format!("  {}{}: {}", entry.role, slide, entry.content));
    }

    out.push(String::new());
    out.push("Feedback:".to_string());
    match &session.feedback {
        Some(feedback) => out.push(feedback.render_text()),
        None => out.push("  (not generated)".to_string()),
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> SessionRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(render_session_list(&[]), "No sessions yet.");
    }

    #[test]
    fn test_list_has_one_row_per_session() {
        let sessions = vec![
            record(r#"{"id":1,"student":{"name":"Ada"},"slideCount":6,"status":"completed"}"#),
            record(r#"{"id":"abc"}"#),
        ];
        let rendered = render_session_list(&sessions);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Ada"));
        assert!(lines[1].contains("completed"));
        assert!(lines[2].starts_with("abc"));
        assert!(lines[2].contains("Unknown"));
    }

    #[test]
    fn test_detail_renders_conversation_and_feedback() {
        let session = record(
            r#"{
                "id": 7,
                "student": {"name": "Ada"},
                "conversations": [
                    {"role": "assistant", "content": "Who is the customer?", "slideNumber": 3},
                    {"role": "user", "content": "Small clinics."}
                ],
                "feedback": {"presentationScore": 8, "strengths": "Clear story"}
            }"#,
        );
        let rendered = render_session_detail(&session);
        assert!(rendered.contains("Session 7"));
        assert!(rendered.contains("assistant [slide 3]: Who is the customer?"));
        assert!(rendered.contains("user: Small clinics."));
        assert!(rendered.contains("Presentation Score: 8"));
        assert!(rendered.contains("Strengths:\nClear story"));
    }

    #[test]
    fn test_detail_without_feedback() {
        let rendered = render_session_detail(&record(r#"{"id":2}"#));
        assert!(rendered.contains("(none)"));
        assert!(rendered.contains("(not generated)"));
    }
}

use serde::{Deserialize, Serialize};

/// Spoken once both questions have been answered.
pub const COMPLETION_MESSAGE: &str =
    "Thanks for those answers! You can continue with your presentation now.";

/// Number of questions asked per intervention.
pub const QUESTIONS_PER_INTERVENTION: u8 = 2;

/// The inclusive range of slides presented just before a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRange {
    pub start: u32,
    pub end: u32,
}

impl SlideRange {
    /// Ranges are consecutive pairs: a lock at 2 covers 1-2, at 4 covers 3-4, and so on.
    pub fn presented(trigger_slide: u32) -> Self {
        let end = trigger_slide.max(1);
        let start = if end == 2 { 1 } else { end.saturating_sub(1).max(1) };
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionState {
    #[default]
    Inactive,
    Questioning,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// First answer recorded; ask the follow-up question.
    AskFollowUp,
    /// Second answer recorded; the intervention is complete.
    Completed,
    /// Not questioning, the answer does not count.
    Ignored,
}

/// Two-question sub-flow that runs while the slide gate is locked.
#[derive(Debug, Clone, Default)]
pub struct InterventionSequencer {
    state: InterventionState,
    questions_asked: u8,
    slide_range: Option<SlideRange>,
    auto_unlock_ready: bool,
}

impl InterventionSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters `Questioning` for the slides leading up to `trigger_slide`.
    pub fn begin(&mut self, trigger_slide: u32) -> SlideRange {
        let range = SlideRange::presented(trigger_slide);
        self.state = InterventionState::Questioning;
        self.questions_asked = 0;
        self.slide_range = Some(range);
        self.auto_unlock_ready = false;
        range
    }

    pub fn record_answer(&mut self) -> AnswerOutcome {
        if self.state != InterventionState::Questioning {
            return AnswerOutcome::Ignored;
        }
        match self.questions_asked {
            0 => {
                self.questions_asked = 1;
                AnswerOutcome::AskFollowUp
            }
            1 => {
                self.questions_asked = QUESTIONS_PER_INTERVENTION;
                self.state = InterventionState::Complete;
                self.auto_unlock_ready = true;
                AnswerOutcome::Completed
            }
            _ => AnswerOutcome::Ignored,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> InterventionState {
        self.state
    }

    pub fn questions_asked(&self) -> u8 {
        self.questions_asked
    }

    pub fn slide_range(&self) -> Option<SlideRange> {
        self.slide_range
    }

    pub fn auto_unlock_ready(&self) -> bool {
        self.auto_unlock_ready
    }
}

/// The prompt that asks for the first question about the slides just presented.
pub fn first_question_prompt(
    assignment: &str,
    range: SlideRange,
    slide_content: &str,
    has_audio: bool,
) -> String {
    let mut prompt = format!(
        "CONTEXT FOR THIS INTERVENTION (Question 1 of {QUESTIONS_PER_INTERVENTION}):\n"
    );
    prompt.push_str(&format!("- Full pitch deck: Available ({assignment})\n"));
    prompt.push_str(&format!(
        "- Founder just presented: Slides {}-{}\n\n",
        range.start, range.end
    ));
    prompt.push_str(&format!("SLIDES CONTENT:\n{slide_content}\n\n"));
    if has_audio {
        prompt.push_str("FOUNDER'S PRESENTATION: [Audio recorded but not yet transcribed]\n\n");
    }
    prompt.push_str(&format!(
        "I just finished presenting slides {}-{} of my pitch deck. Ask me one specific VC-style question about these slides.",
        range.start, range.end
    ));
    prompt
}

pub fn follow_up_prompt(range: SlideRange) -> String {
    format!(
        "Based on my previous answer, ask me one final follow-up question about slides {}-{}. This is question {QUESTIONS_PER_INTERVENTION} of {QUESTIONS_PER_INTERVENTION}.",
        range.start, range.end
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presented_ranges_are_consecutive_pairs() {
        assert_eq!(SlideRange::presented(2), SlideRange { start: 1, end: 2 });
        assert_eq!(SlideRange::presented(4), SlideRange { start: 3, end: 4 });
        assert_eq!(SlideRange::presented(6), SlideRange { start: 5, end: 6 });
    }

    #[test]
    fn test_presented_range_for_first_slide_stays_in_bounds() {
        assert_eq!(SlideRange::presented(1), SlideRange { start: 1, end: 1 });
        assert_eq!(SlideRange::presented(0), SlideRange { start: 1, end: 1 });
    }

    #[test]
    fn test_begin_enters_questioning() {
        let mut seq = InterventionSequencer::new();
        let range = seq.begin(6);
        assert_eq!(range, SlideRange { start: 5, end: 6 });
        assert_eq!(seq.state(), InterventionState::Questioning);
        assert_eq!(seq.questions_asked(), 0);
        assert!(!seq.auto_unlock_ready());
    }

    #[test]
    fn test_two_answers_complete_and_third_is_ignored() {
        let mut seq = InterventionSequencer::new();
        seq.begin(4);
        assert_eq!(seq.record_answer(), AnswerOutcome::AskFollowUp);
        assert_eq!(seq.state(), InterventionState::Questioning);
        assert_eq!(seq.record_answer(), AnswerOutcome::Completed);
        assert_eq!(seq.state(), InterventionState::Complete);
        assert!(seq.auto_unlock_ready());
        assert_eq!(seq.record_answer(), AnswerOutcome::Ignored);
        assert_eq!(seq.questions_asked(), 2);
    }

    #[test]
    fn test_answer_while_inactive_is_ignored() {
        let mut seq = InterventionSequencer::new();
        assert_eq!(seq.record_answer(), AnswerOutcome::Ignored);
        assert_eq!(seq.questions_asked(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut seq = InterventionSequencer::new();
        seq.begin(2);
        seq.record_answer();
        seq.record_answer();
        seq.reset();
        assert_eq!(seq.state(), InterventionState::Inactive);
        assert_eq!(seq.slide_range(), None);
        assert!(!seq.auto_unlock_ready());
    }

    #[test]
    fn test_prompts_mention_the_range() {
        let range = SlideRange { start: 3, end: 4 };
        let first = first_question_prompt("deck.pdf", range, "Market size", true);
        assert!(first.contains("Slides 3-4"));
        assert!(first.contains("SLIDES CONTENT:\nMarket size"));
        assert!(first.contains("Audio recorded"));
        assert!(!first_question_prompt("deck.pdf", range, "", false).contains("Audio recorded"));
        assert!(follow_up_prompt(range).contains("slides 3-4"));
    }
}

//! Explicit discourse-context state threaded through a debate document walk.

use crate::records::ContextQuestionKind;

/// One tracked slot: the text, source element id, and speaker of the most
/// recent statement or question of a given kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextSlot {
    pub text: Option<String>,
    pub id: Option<String>,
    pub speaker: Option<String>,
}

impl ContextSlot {
    pub fn set(&mut self, text: String, id: Option<String>, speaker: Option<String>) {
        self.text = Some(text);
        self.id = id;
        self.speaker = speaker;
    }

    pub fn clear(&mut self) {
        *self = ContextSlot::default();
    }
}

/// The parser's traversal state: current headings plus the statement and
/// question slots answers cite.
///
/// This is an explicit value type so every emitted utterance can carry a
/// snapshot taken at emission time; later mutations never alias into
/// already-emitted records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextFrame {
    pub session_heading: Option<String>,
    pub department_heading: Option<String>,
    pub topic_heading: Option<String>,
    pub statement: ContextSlot,
    pub main_question: ContextSlot,
    pub context_question: ContextSlot,
    pub context_question_kind: Option<ContextQuestionKind>,
}

impl ContextFrame {
    /// A session heading starts a new sitting: everything below it resets.
    pub fn enter_session(&mut self, heading: Option<String>) {
        self.session_heading = heading;
        self.department_heading = None;
        self.topic_heading = None;
        self.reset_speech_context();
    }

    /// A department heading resets the topic and all speech context.
    pub fn enter_department(&mut self, heading: Option<String>) {
        self.department_heading = heading;
        self.topic_heading = None;
        self.reset_speech_context();
    }

    /// A topic heading resets speech context only.
    pub fn enter_topic(&mut self, heading: Option<String>) {
        self.topic_heading = heading;
        self.reset_speech_context();
    }

    /// A new statement clears every question slot.
    pub fn enter_statement(&mut self, text: String, id: Option<String>, speaker: Option<String>) {
        self.statement.set(text, id, speaker);
        self.main_question.clear();
        self.clear_context_question();
    }

    /// A new main question clears only the supplementary/intervention slot.
    pub fn enter_main_question(
        &mut self,
        text: String,
        id: Option<String>,
        speaker: Option<String>,
    ) {
        self.main_question.set(text, id, speaker);
        self.clear_context_question();
    }

    /// Supplementary questions and interventions share the context-question
    /// slot while leaving the main question intact, so answers can cite both.
    pub fn enter_context_question(
        &mut self,
        kind: ContextQuestionKind,
        text: String,
        id: Option<String>,
        speaker: Option<String>,
    ) {
        self.context_question.set(text, id, speaker);
        self.context_question_kind = Some(kind);
    }

    pub fn reset_speech_context(&mut self) {
        self.statement.clear();
        self.main_question.clear();
        self.clear_context_question();
    }

    fn clear_context_question(&mut self) {
        self.context_question.clear();
        self.context_question_kind = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_everything() -> ContextFrame {
        let mut frame = ContextFrame::default();
        frame.enter_session(Some("Oral Answers".into()));
        frame.enter_department(Some("Treasury".into()));
        frame.enter_topic(Some("Inflation".into()));
        frame.enter_statement("A statement.".into(), Some("s1".into()), Some("Minister".into()));
        frame.enter_main_question("A question?".into(), Some("q1".into()), Some("Member".into()));
        frame.enter_context_question(
            ContextQuestionKind::Supplementary,
            "A follow-up?".into(),
            Some("q2".into()),
            Some("Other Member".into()),
        );
        frame
    }

    #[test]
    fn topic_heading_resets_speech_context_only() {
        let mut frame = frame_with_everything();
        frame.enter_topic(Some("Growth".into()));
        assert_eq!(frame.session_heading.as_deref(), Some("Oral Answers"));
        assert_eq!(frame.department_heading.as_deref(), Some("Treasury"));
        assert_eq!(frame.topic_heading.as_deref(), Some("Growth"));
        assert_eq!(frame.statement, ContextSlot::default());
        assert_eq!(frame.main_question, ContextSlot::default());
        assert_eq!(frame.context_question, ContextSlot::default());
        assert!(frame.context_question_kind.is_none());
    }

    #[test]
    fn session_heading_resets_lower_headings() {
        let mut frame = frame_with_everything();
        frame.enter_session(Some("Westminster Hall".into()));
        assert!(frame.department_heading.is_none());
        assert!(frame.topic_heading.is_none());
        assert!(frame.statement.text.is_none());
    }

    #[test]
    fn statement_clears_question_slots() {
        let mut frame = frame_with_everything();
        frame.enter_statement("Another statement.".into(), None, None);
        assert!(frame.main_question.text.is_none());
        assert!(frame.context_question.text.is_none());
        assert!(frame.context_question_kind.is_none());
    }

    #[test]
    fn main_question_preserves_statement() {
        let mut frame = frame_with_everything();
        frame.enter_main_question("New question?".into(), None, None);
        assert_eq!(frame.statement.text.as_deref(), Some("A statement."));
        assert!(frame.context_question.text.is_none());
    }

    #[test]
    fn context_question_preserves_main_question() {
        let mut frame = frame_with_everything();
        frame.enter_context_question(
            ContextQuestionKind::Intervention,
            "On that point?".into(),
            None,
            None,
        );
        assert_eq!(frame.main_question.text.as_deref(), Some("A question?"));
        assert_eq!(
            frame.context_question_kind,
            Some(ContextQuestionKind::Intervention)
        );
    }

    #[test]
    fn snapshots_do_not_alias_later_mutations() {
        let mut frame = frame_with_everything();
        let snapshot = frame.clone();
        frame.enter_topic(Some("Growth".into()));
        assert_eq!(snapshot.topic_heading.as_deref(), Some("Inflation"));
        assert_eq!(snapshot.main_question.text.as_deref(), Some("A question?"));
    }
}

//! Formats utterances into the structured text representation fed to the
//! embedding model.
//!
//! Output shape: the utterance itself first with inline speaker attribution,
//! then a `---\nCONTEXT:` block carrying question/statement context (answers
//! only) and the topic/department/session/date lines. The chunker later
//! splits on that same separator, so the literal must match
//! [`crate::transforms::chunking::CONTEXT_SEPARATOR`].

use async_trait::async_trait;
use tracing::info;

use crate::records::{ContextQuestionKind, DebateRow};
use crate::tokenizer::TokenCounter;
use crate::transforms::BatchTransform;
use crate::types::RagError;

pub struct EmbeddingFormatter {
    counter: TokenCounter,
    max_seq_length: usize,
    include_statement: bool,
    include_main_question: bool,
    include_context_question: bool,
}

impl EmbeddingFormatter {
    pub fn new(counter: TokenCounter, max_seq_length: usize) -> Self {
        Self {
            counter,
            max_seq_length,
            include_statement: false,
            include_main_question: true,
            include_context_question: true,
        }
    }

    pub fn include_statement(mut self, include: bool) -> Self {
        self.include_statement = include;
        self
    }

    /// `" (LLM summary)"` when the current text has been rewritten by the
    /// summarizer, empty otherwise.
    fn summary_label(current: &str, original: Option<&str>) -> &'static str {
        match original {
            Some(original) if original != current => " (LLM summary)",
            _ => "",
        }
    }

    fn format_row(&self, row: &DebateRow) -> String {
        let mut sections: Vec<String> = Vec::new();

        let mut speaker_info = String::new();
        if let Some(name) = &row.speaker_name {
            speaker_info.push_str(name);
            if let Some(office) = &row.speaker_office {
                speaker_info.push_str(&format!(" ({office})"));
            }
        }

        if !row.utterance.is_empty() {
            if speaker_info.is_empty() {
                sections.push(row.utterance.clone());
            } else {
                sections.push(format!("{speaker_info}: {}", row.utterance));
            }
        }

        let mut context_parts: Vec<String> = Vec::new();

        // Question/statement context matters only for answers.
        if row.is_answer {
            if self.include_context_question {
                if let Some(text) = &row.context_question_text {
                    let speaker = row.context_question_speaker.as_deref().unwrap_or("Unknown");
                    let label = Self::summary_label(
                        text,
                        row.original_context_question_text.as_deref(),
                    );
                    let prefix = match row.context_question_kind {
                        Some(ContextQuestionKind::Intervention) => {
                            "Responding to intervention from"
                        }
                        _ => "Responding to",
                    };
                    context_parts.push(format!("{prefix} {speaker}{label}: {text}"));
                }
            }
            if self.include_main_question {
                if let Some(text) = &row.question_text {
                    let speaker = row.question_speaker.as_deref().unwrap_or("Unknown");
                    let label =
                        Self::summary_label(text, row.original_question_text.as_deref());
                    context_parts
                        .push(format!("Main parliamentary question from {speaker}{label}: {text}"));
                }
            }
            if self.include_statement {
                if let Some(text) = &row.statement_text {
                    let speaker = row.statement_speaker.as_deref().unwrap_or("Unknown");
                    let label =
                        Self::summary_label(text, row.original_statement_text.as_deref());
                    context_parts.push(format!("Statement from {speaker}{label}: {text}"));
                }
            }
        }

        if let Some(topic) = &row.topic_heading {
            context_parts.push(format!("Topic: {topic}"));
        }
        if let Some(department) = &row.department_heading {
            context_parts.push(format!("Department: {department}"));
        }
        if let Some(session) = &row.session_heading {
            context_parts.push(format!("Session: {session}"));
        }
        context_parts.push(format!("Date: {}", row.date.format("%Y-%m-%d")));

        if !context_parts.is_empty() {
            sections.push(format!("---\nCONTEXT:\n{}", context_parts.join("\n")));
        }

        sections.join("\n\n")
    }
}

#[async_trait]
impl BatchTransform for EmbeddingFormatter {
    fn name(&self) -> &'static str {
        "embedding_formatter"
    }

    async fn apply(&self, mut rows: Vec<DebateRow>) -> Result<Vec<DebateRow>, RagError> {
        let total = rows.len();
        let mut truncated = 0usize;

        for row in &mut rows {
            let formatted = self.format_row(row);
            row.token_count = self.counter.count(&formatted);
            row.is_truncated = row.token_count > self.max_seq_length;
            if row.is_truncated {
                truncated += 1;
            }
            row.utterance = formatted.clone();
            row.embedding_text = formatted;
        }

        let ratio = if total > 0 {
            truncated as f64 / total as f64
        } else {
            0.0
        };
        info!(
            truncated,
            total,
            ratio = format!("{:.2}%", ratio * 100.0),
            limit = self.max_seq_length,
            "truncation report"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn answer_row() -> DebateRow {
        DebateRow {
            date: NaiveDate::from_ymd_opt(2025, 9, 16).unwrap(),
            speaker_name: Some("Bob Minister".into()),
            speaker_office: Some("Chancellor of the Exchequer".into()),
            is_answer: true,
            utterance: "We are taking action.".into(),
            original_utterance: "We are taking action.".into(),
            question_text: Some("What is the plan?".into()),
            question_speaker: Some("Alice Member".into()),
            original_question_text: Some("What is the plan?".into()),
            topic_heading: Some("Inflation".into()),
            department_heading: Some("Treasury".into()),
            session_heading: Some("Oral Answers".into()),
            ..DebateRow::default()
        }
    }

    fn formatter() -> EmbeddingFormatter {
        EmbeddingFormatter::new(TokenCounter::new().unwrap(), 512)
    }

    #[tokio::test]
    async fn answers_carry_question_context_and_headings() {
        let rows = formatter().apply(vec![answer_row()]).await.unwrap();
        let text = &rows[0].embedding_text;

        assert!(text.starts_with(
            "Bob Minister (Chancellor of the Exchequer): We are taking action."
        ));
        assert!(text.contains("---\nCONTEXT:\n"));
        assert!(text
            .contains("Main parliamentary question from Alice Member: What is the plan?"));
        assert!(text.contains("Topic: Inflation"));
        assert!(text.contains("Department: Treasury"));
        assert!(text.contains("Session: Oral Answers"));
        assert!(text.contains("Date: 2025-09-16"));
        assert!(rows[0].token_count > 0);
        assert!(!rows[0].is_truncated);
    }

    #[tokio::test]
    async fn non_answers_omit_question_context() {
        let mut row = answer_row();
        row.is_answer = false;
        let rows = formatter().apply(vec![row]).await.unwrap();
        assert!(!rows[0].embedding_text.contains("Main parliamentary question"));
        assert!(rows[0].embedding_text.contains("Topic: Inflation"));
    }

    #[tokio::test]
    async fn summarized_context_is_labelled() {
        let mut row = answer_row();
        row.question_text = Some("Short summary of the question.".into());
        let rows = formatter().apply(vec![row]).await.unwrap();
        assert!(rows[0].embedding_text.contains(
            "Main parliamentary question from Alice Member (LLM summary): Short summary of the question."
        ));
    }

    #[tokio::test]
    async fn intervention_context_uses_intervention_prefix() {
        let mut row = answer_row();
        row.context_question_text = Some("Will he give way?".into());
        row.context_question_speaker = Some("Carol Member".into());
        row.original_context_question_text = Some("Will he give way?".into());
        row.context_question_kind = Some(ContextQuestionKind::Intervention);
        let rows = formatter().apply(vec![row]).await.unwrap();
        assert!(rows[0]
            .embedding_text
            .contains("Responding to intervention from Carol Member: Will he give way?"));
    }
}

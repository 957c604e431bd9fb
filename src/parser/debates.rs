//! Loader and context-tracking parser for transcribed debate documents.
//!
//! Documents are flat streams of heading and speech elements. The parser
//! replays that stream through a [`ContextFrame`], emitting one [`DebateRow`]
//! per speech with a by-value snapshot of the surrounding discourse context.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, error, info};

use crate::parser::context::ContextFrame;
use crate::records::{ContextQuestionKind, DebateRow};
use crate::types::RagError;

const TYPE_STATEMENT: &str = "Start Statement";
const TYPE_MAIN_QUESTION: &str = "Start Question";
const TYPE_SUPPLEMENTARY: &str = "Start SupplementaryQuestion";
const TYPE_INTERVENTION: &str = "Start Intervention";
const TYPE_CONTINUATION: &str = "Continuation Speech";

/// Extracts the numeric person id from an opaque identifier string by taking
/// the trailing path segment (e.g. `uk.org.publicwhip/person/10001`).
pub fn extract_person_id(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.rsplit('/').next())
        .and_then(|segment| segment.parse::<i64>().ok())
}

/// Extracts the embedded `YYYY-MM-DD` date from a file name.
pub fn extract_date(file_name: &str) -> Result<NaiveDate, RagError> {
    let pattern = Regex::new(r"(\d{4}-\d{2}-\d{2})").expect("valid date regex");
    let captured = pattern
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| {
            RagError::InvalidDocument(format!("no date in file name '{file_name}'"))
        })?;
    NaiveDate::parse_from_str(captured.as_str(), "%Y-%m-%d")
        .map_err(|err| RagError::InvalidDocument(format!("bad date in '{file_name}': {err}")))
}

/// Keeps only the highest version-letter suffix per embedded date. Files
/// without a suffix compete with an empty suffix, so a lone versionless file
/// for a date is always kept.
fn filter_latest_versions(files: Vec<String>) -> Result<Vec<String>, RagError> {
    let suffix_pattern =
        Regex::new(r"\d{4}-\d{2}-\d{2}([a-z])?\.xml$").expect("valid suffix regex");
    let mut best: HashMap<NaiveDate, (String, String)> = HashMap::new();

    for file in files {
        let date = extract_date(&file)?;
        let suffix = suffix_pattern
            .captures(&file)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        match best.get(&date) {
            Some((current, _)) if *current >= suffix => {}
            _ => {
                best.insert(date, (suffix, file));
            }
        }
    }

    Ok(best.into_values().map(|(_, file)| file).collect())
}

/// Discovers debate files and parses them in fixed-size batches.
pub struct DebateLoader {
    source_dir: PathBuf,
    files: Vec<String>,
}

impl DebateLoader {
    /// Lists `*.xml` files under `source_dir`, keeping only the latest
    /// version per date and, optionally, only files dated on/after
    /// `start_date`. Files are ordered by embedded date.
    pub fn new(source_dir: impl Into<PathBuf>, start_date: Option<NaiveDate>) -> Result<Self, RagError> {
        let source_dir = source_dir.into();
        let mut files = Vec::new();
        for entry in fs::read_dir(&source_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".xml") {
                files.push(name);
            }
        }

        let mut files = filter_latest_versions(files)?;
        if let Some(start) = start_date {
            files.retain(|file| matches!(extract_date(file), Ok(date) if date >= start));
        }
        files.sort_by_key(|file| (extract_date(file).ok(), file.clone()));

        info!(
            files = files.len(),
            dir = %source_dir.display(),
            "discovered debate files"
        );
        Ok(Self { source_dir, files })
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// File names making up one batch; empty past the final file.
    pub fn batch_files(&self, batch_number: usize, batch_size: usize) -> &[String] {
        let start = batch_number * batch_size;
        if start >= self.files.len() {
            return &[];
        }
        let end = (start + batch_size).min(self.files.len());
        &self.files[start..end]
    }

    /// Parses one batch of files into rows. A parse failure in one document
    /// is logged and that document skipped; sibling documents still load.
    /// Returns an empty vector once `batch_number` is past the final file.
    pub fn load_batch(
        &self,
        batch_number: usize,
        batch_size: usize,
    ) -> Result<Vec<DebateRow>, RagError> {
        let start = batch_number * batch_size;
        if start >= self.files.len() {
            return Ok(Vec::new());
        }
        let end = (start + batch_size).min(self.files.len());

        let mut rows = Vec::new();
        for file in &self.files[start..end] {
            let path = self.source_dir.join(file);
            match self.load_file(&path) {
                Ok(mut parsed) => rows.append(&mut parsed),
                Err(err) => error!(file = %path.display(), %err, "failed to parse document"),
            }
        }
        Ok(rows)
    }

    fn load_file(&self, path: &Path) -> Result<Vec<DebateRow>, RagError> {
        let markup = fs::read_to_string(path)?;
        let source_path = path.to_string_lossy().to_string();
        let parsed = parse_document(&source_path, &markup)?.collect::<Vec<_>>();
        debug!(file = %path.display(), utterances = parsed.len(), "parsed document");
        Ok(parsed)
    }
}

/// Flattened view of one markup element, extracted up front so the emitting
/// iterator owns its input.
enum DocEvent {
    Session(Option<String>),
    Department(Option<String>),
    Topic(Option<String>),
    Speech(SpeechElement),
}

struct SpeechElement {
    speech_type: String,
    id: Option<String>,
    speaker_name: Option<String>,
    speaker_office: Option<String>,
    person_id_raw: Option<String>,
    column: Option<i64>,
    url: Option<String>,
    time: Option<String>,
    oral_qnum: Option<String>,
    no_speaker: bool,
    paragraphs: Vec<String>,
}

/// Parses one document into a lazy, finite sequence of utterance rows in
/// document order. The sequence is not restartable; collect it if more than
/// one pass is needed.
pub fn parse_document(
    source_path: &str,
    markup: &str,
) -> Result<UtteranceIter, RagError> {
    let date = extract_date(source_path)?;
    let document = Html::parse_document(markup);
    let selector = Selector::parse("oral-heading, major-heading, minor-heading, speech")
        .map_err(|err| RagError::InvalidDocument(err.to_string()))?;
    let paragraph_selector =
        Selector::parse("p").map_err(|err| RagError::InvalidDocument(err.to_string()))?;

    let mut events = Vec::new();
    for element in document.select(&selector) {
        match element.value().name() {
            "oral-heading" => events.push(DocEvent::Session(heading_text(&element))),
            "major-heading" => events.push(DocEvent::Department(heading_text(&element))),
            "minor-heading" => events.push(DocEvent::Topic(heading_text(&element))),
            "speech" => {
                let paragraphs: Vec<String> = element
                    .select(&paragraph_selector)
                    .filter_map(|p| normalize_whitespace(&p.text().collect::<String>()))
                    .collect();
                events.push(DocEvent::Speech(SpeechElement {
                    speech_type: element.value().attr("type").unwrap_or_default().to_string(),
                    id: attr(&element, "id"),
                    speaker_name: attr(&element, "speakername"),
                    speaker_office: attr(&element, "speakeroffice"),
                    person_id_raw: attr(&element, "person_id"),
                    column: attr(&element, "colnum").and_then(|c| c.parse().ok()),
                    url: attr(&element, "url"),
                    time: attr(&element, "time"),
                    oral_qnum: attr(&element, "oral-qnum"),
                    no_speaker: element.value().attr("nospeaker") == Some("true"),
                    paragraphs,
                }));
            }
            _ => {}
        }
    }

    Ok(UtteranceIter {
        source_path: source_path.to_string(),
        date,
        events: events.into_iter(),
        frame: ContextFrame::default(),
    })
}

fn attr(element: &ElementRef<'_>, name: &str) -> Option<String> {
    element.value().attr(name).map(|value| value.to_string())
}

fn heading_text(element: &ElementRef<'_>) -> Option<String> {
    normalize_whitespace(&element.text().collect::<String>())
}

fn normalize_whitespace(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Iterator over a single document's utterances.
///
/// Heading events mutate the context frame silently; speech events emit a row
/// carrying a snapshot of the frame. Elements flagged as having no speaker
/// are still replayed through the frame for their side effects, then dropped
/// from the output.
pub struct UtteranceIter {
    source_path: String,
    date: NaiveDate,
    events: std::vec::IntoIter<DocEvent>,
    frame: ContextFrame,
}

impl Iterator for UtteranceIter {
    type Item = DebateRow;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.events.next()? {
                DocEvent::Session(heading) => self.frame.enter_session(heading),
                DocEvent::Department(heading) => self.frame.enter_department(heading),
                DocEvent::Topic(heading) => self.frame.enter_topic(heading),
                DocEvent::Speech(speech) => {
                    if let Some(row) = self.emit(speech) {
                        return Some(row);
                    }
                }
            }
        }
    }
}

impl UtteranceIter {
    fn emit(&mut self, speech: SpeechElement) -> Option<DebateRow> {
        let text = speech.paragraphs.join(" ");
        let speech_type = speech.speech_type.as_str();

        let is_statement = speech_type == TYPE_STATEMENT;
        let is_main_question = speech_type == TYPE_MAIN_QUESTION;
        let is_supplementary_question = speech_type == TYPE_SUPPLEMENTARY;
        let is_intervention = speech_type == TYPE_INTERVENTION;
        let is_question = is_main_question || is_supplementary_question || is_intervention;
        // A continuation straight after an intervention is the interrupted
        // speaker answering it.
        let is_continuation_after_intervention = speech_type == TYPE_CONTINUATION
            && self.frame.context_question_kind == Some(ContextQuestionKind::Intervention);
        let is_answer = speech_type.contains("Answer") || is_continuation_after_intervention;

        if is_statement {
            self.frame
                .enter_statement(text.clone(), speech.id.clone(), speech.speaker_name.clone());
        } else if is_main_question {
            self.frame.enter_main_question(
                text.clone(),
                speech.id.clone(),
                speech.speaker_name.clone(),
            );
        } else if is_supplementary_question {
            self.frame.enter_context_question(
                ContextQuestionKind::Supplementary,
                text.clone(),
                speech.id.clone(),
                speech.speaker_name.clone(),
            );
        } else if is_intervention {
            self.frame.enter_context_question(
                ContextQuestionKind::Intervention,
                text.clone(),
                speech.id.clone(),
                speech.speaker_name.clone(),
            );
        }

        // Snapshot after the update: a question's own row cites itself.
        let frame = self.frame.clone();

        if speech.no_speaker {
            return None;
        }

        Some(DebateRow {
            source_path: self.source_path.clone(),
            date: self.date,
            speech_id: speech.id,
            speaker_name: speech.speaker_name,
            speaker_office: speech.speaker_office,
            person_id: extract_person_id(speech.person_id_raw.as_deref()),
            speech_type: speech.speech_type,
            column: speech.column,
            url: speech.url,
            time: speech.time,
            oral_qnum: speech.oral_qnum,
            party_at_time: None,
            is_statement,
            is_question,
            is_main_question,
            is_supplementary_question,
            is_intervention,
            is_answer,
            statement_text: frame.statement.text.clone(),
            statement_speaker: frame.statement.speaker.clone(),
            original_statement_text: frame.statement.text,
            question_text: frame.main_question.text.clone(),
            question_speaker: frame.main_question.speaker.clone(),
            original_question_text: frame.main_question.text,
            context_question_text: frame.context_question.text.clone(),
            context_question_speaker: frame.context_question.speaker.clone(),
            context_question_kind: frame.context_question_kind,
            original_context_question_text: frame.context_question.text,
            session_heading: frame.session_heading,
            department_heading: frame.department_heading,
            topic_heading: frame.topic_heading,
            utterance: text.clone(),
            original_utterance: text,
            num_paragraphs: speech.paragraphs.len(),
            embedding_text: String::new(),
            token_count: 0,
            is_truncated: false,
            chunk: None,
            embedding: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(markup: &str) -> Vec<DebateRow> {
        parse_document("debates2025-09-16a.xml", markup)
            .unwrap()
            .collect()
    }

    fn speech(ty: &str, id: &str, speaker: &str, text: &str) -> String {
        format!(
            r#"<speech type="{ty}" id="uk.d/{id}" speakername="{speaker}" person_id="uk.org/person/1{id}"><p>{text}</p></speech>"#
        )
    }

    #[test]
    fn statement_after_topic_heading_has_no_question_context() {
        let markup = format!(
            "<publicwhip><oral-heading>Oral Answers</oral-heading>\
             <major-heading>Treasury</major-heading>\
             {}\
             <minor-heading>Inflation</minor-heading>\
             {}</publicwhip>",
            speech("Start Question", "q1", "Alice Member", "Will the minister act?"),
            speech("Start Statement", "s1", "Bob Minister", "I rise to make a statement."),
        );
        let rows = parse_all(&markup);
        let statement = rows.last().unwrap();
        assert!(statement.is_statement);
        assert!(statement.question_text.is_none());
        assert!(statement.context_question_text.is_none());
        assert_eq!(statement.topic_heading.as_deref(), Some("Inflation"));
    }

    #[test]
    fn answer_cites_main_and_supplementary_questions() {
        let markup = format!(
            "<publicwhip><major-heading>Health</major-heading>{}{}{}</publicwhip>",
            speech("Start Question", "q1", "Alice Member", "What about waiting lists?"),
            speech(
                "Start SupplementaryQuestion",
                "q2",
                "Carol Member",
                "And in rural areas?"
            ),
            speech("Start Answer", "a1", "Bob Minister", "We are investing."),
        );
        let rows = parse_all(&markup);
        let answer = rows.last().unwrap();
        assert!(answer.is_answer);
        assert_eq!(
            answer.question_text.as_deref(),
            Some("What about waiting lists?")
        );
        assert_eq!(
            answer.context_question_text.as_deref(),
            Some("And in rural areas?")
        );
        assert_eq!(
            answer.context_question_kind,
            Some(ContextQuestionKind::Supplementary)
        );
    }

    #[test]
    fn continuation_after_intervention_is_an_answer() {
        let markup = format!(
            "<publicwhip>{}{}{}</publicwhip>",
            speech("Start Statement", "s1", "Bob Minister", "Let me set out the plan."),
            speech("Start Intervention", "i1", "Alice Member", "Will he give way?"),
            speech("Continuation Speech", "c1", "Bob Minister", "I will make progress."),
        );
        let rows = parse_all(&markup);
        let continuation = rows.last().unwrap();
        assert!(continuation.is_answer);
        assert_eq!(
            continuation.context_question_kind,
            Some(ContextQuestionKind::Intervention)
        );
        assert_eq!(
            continuation.context_question_text.as_deref(),
            Some("Will he give way?")
        );
    }

    #[test]
    fn no_speaker_rows_update_context_but_are_dropped() {
        let markup = format!(
            r#"<publicwhip>
               <speech type="Start Question" id="q1" nospeaker="true"><p>A procedural question?</p></speech>
               {}</publicwhip>"#,
            speech("Start Answer", "a1", "Bob Minister", "Indeed."),
        );
        let rows = parse_all(&markup);
        assert_eq!(rows.len(), 1);
        let answer = &rows[0];
        assert_eq!(
            answer.question_text.as_deref(),
            Some("A procedural question?")
        );
    }

    #[test]
    fn speech_time_and_question_number_are_carried() {
        let markup = r#"<publicwhip>
            <speech type="Start Question" id="q1" speakername="Alice Member"
                    time="11:32:00" oral-qnum="3" colnum="142"><p>Question three?</p></speech>
            <speech type="Start Answer" id="a1" speakername="Bob Minister"><p>An answer.</p></speech>
            </publicwhip>"#;
        let rows = parse_all(markup);
        assert_eq!(rows[0].time.as_deref(), Some("11:32:00"));
        assert_eq!(rows[0].oral_qnum.as_deref(), Some("3"));
        assert_eq!(rows[0].column, Some(142));
        assert!(rows[1].time.is_none());
        assert!(rows[1].oral_qnum.is_none());
    }

    #[test]
    fn person_ids_parse_from_trailing_segment() {
        assert_eq!(extract_person_id(Some("uk.org.publicwhip/person/10001")), Some(10001));
        assert_eq!(extract_person_id(Some("not-a-number")), None);
        assert_eq!(extract_person_id(None), None);
    }

    #[test]
    fn latest_version_suffix_wins_per_date() {
        let files = vec![
            "debates2025-09-16a.xml".to_string(),
            "debates2025-09-16b.xml".to_string(),
            "debates2025-09-17.xml".to_string(),
        ];
        let mut kept = filter_latest_versions(files).unwrap();
        kept.sort();
        assert_eq!(
            kept,
            vec!["debates2025-09-16b.xml", "debates2025-09-17.xml"]
        );
    }

    #[test]
    fn paragraphs_join_with_normalized_whitespace() {
        let markup = r#"<publicwhip><speech type="Start Statement" id="s1" speakername="Bob">
            <p>First   paragraph
            across lines.</p><p>Second paragraph.</p></speech></publicwhip>"#;
        let rows = parse_all(markup);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].original_utterance,
            "First paragraph across lines. Second paragraph."
        );
        assert_eq!(rows[0].num_paragraphs, 2);
    }
}

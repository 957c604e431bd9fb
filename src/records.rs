//! Core record types shared by the parser, transforms, stores, and retrieval.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::RagError;

/// Kind of the most recent "context question" (the slot answers cite in
/// addition to the main question).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextQuestionKind {
    Supplementary,
    Intervention,
}

impl ContextQuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextQuestionKind::Supplementary => "supplementary",
            ContextQuestionKind::Intervention => "intervention",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "supplementary" => Some(ContextQuestionKind::Supplementary),
            "intervention" => Some(ContextQuestionKind::Intervention),
            _ => None,
        }
    }
}

/// A sub-span of one utterance prepared for embedding.
///
/// For multi-chunk utterances the `[start_char, end_char)` offsets are a
/// proportional approximation over the original text (chunk `i` of `n` spans
/// `[i*len/n, (i+1)*len/n)`, last chunk extended to `len`). Downstream
/// consumers rely on that arithmetic, so it must not be replaced with an
/// exact-match search.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub chunk_index: usize,
    pub chunk_text: String,
    /// Chunk text plus the serialized context block, as fed to the embedder.
    pub embedding_text: String,
    pub start_char: usize,
    pub end_char: usize,
}

/// One row of the ingestion batch: a single utterance with its parent context,
/// progressively enriched by the transform chain (summaries, formatted
/// embedding text, chunk span, embedding vector).
///
/// The `original_*` fields are immutable once the parser emits the row; only
/// the "current" variants may be rewritten by later transforms.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DebateRow {
    // File metadata.
    pub source_path: String,
    pub date: NaiveDate,

    // Speech attributes.
    pub speech_id: Option<String>,
    pub speaker_name: Option<String>,
    pub speaker_office: Option<String>,
    pub person_id: Option<i64>,
    pub speech_type: String,
    pub column: Option<i64>,
    pub url: Option<String>,
    /// Wall-clock timestamp of the speech as recorded in the markup.
    pub time: Option<String>,
    /// Order-paper question number, present on oral questions only.
    pub oral_qnum: Option<String>,
    /// Party affiliation at the utterance date. Left empty at parse time and
    /// backfilled from membership intervals once metadata is loaded.
    pub party_at_time: Option<String>,

    // Statement / question / answer tracking.
    pub is_statement: bool,
    pub is_question: bool,
    pub is_main_question: bool,
    pub is_supplementary_question: bool,
    pub is_intervention: bool,
    pub is_answer: bool,
    pub statement_text: Option<String>,
    pub statement_speaker: Option<String>,
    pub original_statement_text: Option<String>,
    pub question_text: Option<String>,
    pub question_speaker: Option<String>,
    pub original_question_text: Option<String>,
    pub context_question_text: Option<String>,
    pub context_question_speaker: Option<String>,
    pub context_question_kind: Option<ContextQuestionKind>,
    pub original_context_question_text: Option<String>,

    // Parent headings.
    pub session_heading: Option<String>,
    pub department_heading: Option<String>,
    pub topic_heading: Option<String>,

    // Speech content. `utterance` is rewritten to the formatted embedding
    // representation by the formatter transform; `original_utterance` never
    // changes after parsing.
    pub utterance: String,
    pub original_utterance: String,
    pub num_paragraphs: usize,

    // Formatter outputs.
    pub embedding_text: String,
    pub token_count: usize,
    pub is_truncated: bool,

    // Chunking / embedding outputs.
    pub chunk: Option<ChunkSpan>,
    pub embedding: Option<Vec<f32>>,
}

impl DebateRow {
    /// Chunk span, or an error if the chunking transform has not run.
    pub fn chunk(&self) -> Result<&ChunkSpan, RagError> {
        self.chunk
            .as_ref()
            .ok_or_else(|| RagError::Chunking("row has no chunk span".into()))
    }
}

/// A person appearing in the people/memberships metadata document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Person {
    pub id: i64,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub display_name: String,
}

/// A continuous membership interval (party + seat) for a person.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Membership {
    pub membership_id: String,
    pub person_id: i64,
    pub party: Option<String>,
    pub post_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_reason: Option<String>,
    pub end_reason: Option<String>,
    pub historichansard_id: Option<String>,
}

/// A recorded vote event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Division {
    pub division_key: String,
    pub vote_date: NaiveDate,
    pub description: String,
}

/// Outcome of one person's participation in a division.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    Aye,
    No,
    Abstain,
    Absent,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::Aye => "aye",
            VoteChoice::No => "no",
            VoteChoice::Abstain => "abstain",
            VoteChoice::Absent => "absent",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, RagError> {
        match raw {
            "aye" => Ok(VoteChoice::Aye),
            "no" => Ok(VoteChoice::No),
            "abstain" => Ok(VoteChoice::Abstain),
            "absent" => Ok(VoteChoice::Absent),
            other => Err(RagError::Validation(format!("unknown vote '{other}'"))),
        }
    }
}

/// One person's vote in one division.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    pub division_key: String,
    pub person_id: i64,
    pub membership_id: String,
    pub vote: VoteChoice,
}

/// Precomputed per (person, policy, period) vote aggregates.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PolicySummary {
    pub person_id: i64,
    pub policy_id: i64,
    pub period_id: Option<i64>,
    pub name: Option<String>,
    pub policy_description: Option<String>,
    pub context_description: Option<String>,
    pub distance_score: f64,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub num_votes_same: i64,
    pub num_strong_votes_same: i64,
    pub num_votes_different: i64,
    pub num_strong_votes_different: i64,
    pub num_votes_absent: i64,
    pub num_strong_votes_absent: i64,
    pub num_votes_abstain: i64,
    pub num_strong_votes_abstain: i64,
}

impl PolicySummary {
    /// Alignment score derived from vote counts: the fraction of aligned
    /// votes among all aligned/opposed votes (strong votes included).
    /// `None` when the person cast no aligned/opposed votes at all.
    pub fn alignment_score(&self) -> Option<f64> {
        let aligned = self.num_votes_same + self.num_strong_votes_same;
        let opposed = self.num_votes_different + self.num_strong_votes_different;
        let total = aligned + opposed;
        if total == 0 {
            None
        } else {
            Some(aligned as f64 / total as f64)
        }
    }
}

/// Human-readable stance bucket derived from an alignment score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StanceLabel {
    ConsistentlyFor,
    AlmostAlwaysFor,
    GenerallyFor,
    Mixed,
    GenerallyAgainst,
    AlmostAlwaysAgainst,
    ConsistentlyAgainst,
    NoEvidence,
}

impl StanceLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StanceLabel::ConsistentlyFor => "consistently voted for",
            StanceLabel::AlmostAlwaysFor => "almost always voted for",
            StanceLabel::GenerallyFor => "generally voted for",
            StanceLabel::Mixed => "voted a mixture of for and against",
            StanceLabel::GenerallyAgainst => "generally voted against",
            StanceLabel::AlmostAlwaysAgainst => "almost always voted against",
            StanceLabel::ConsistentlyAgainst => "consistently voted against",
            StanceLabel::NoEvidence => "no voting evidence",
        }
    }

    /// Total mapping from alignment score to stance band.
    ///
    /// `None` means "no evidence"; any score outside `[0, 1]` is a hard
    /// validation failure rather than a silently wrong label.
    pub fn from_score(score: Option<f64>) -> Result<Self, RagError> {
        let Some(score) = score else {
            return Ok(StanceLabel::NoEvidence);
        };
        if !(0.0..=1.0).contains(&score) || score.is_nan() {
            return Err(RagError::Validation(format!(
                "alignment score {score} outside [0, 1]"
            )));
        }
        Ok(match score {
            s if s >= 0.95 => StanceLabel::ConsistentlyFor,
            s if s >= 0.85 => StanceLabel::AlmostAlwaysFor,
            s if s >= 0.60 => StanceLabel::GenerallyFor,
            s if s >= 0.40 => StanceLabel::Mixed,
            s if s >= 0.15 => StanceLabel::GenerallyAgainst,
            s if s >= 0.05 => StanceLabel::AlmostAlwaysAgainst,
            _ => StanceLabel::ConsistentlyAgainst,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stance_bands_cover_the_unit_interval() {
        assert_eq!(
            StanceLabel::from_score(Some(1.0)).unwrap(),
            StanceLabel::ConsistentlyFor
        );
        assert_eq!(
            StanceLabel::from_score(Some(0.9)).unwrap(),
            StanceLabel::AlmostAlwaysFor
        );
        assert_eq!(
            StanceLabel::from_score(Some(0.7)).unwrap(),
            StanceLabel::GenerallyFor
        );
        assert_eq!(StanceLabel::from_score(Some(0.5)).unwrap(), StanceLabel::Mixed);
        assert_eq!(
            StanceLabel::from_score(Some(0.2)).unwrap(),
            StanceLabel::GenerallyAgainst
        );
        assert_eq!(
            StanceLabel::from_score(Some(0.1)).unwrap(),
            StanceLabel::AlmostAlwaysAgainst
        );
        assert_eq!(
            StanceLabel::from_score(Some(0.0)).unwrap(),
            StanceLabel::ConsistentlyAgainst
        );
    }

    #[test]
    fn stance_is_no_evidence_without_a_score() {
        assert_eq!(
            StanceLabel::from_score(None).unwrap(),
            StanceLabel::NoEvidence
        );
    }

    #[test]
    fn out_of_band_scores_are_rejected() {
        assert!(StanceLabel::from_score(Some(-0.1)).is_err());
        assert!(StanceLabel::from_score(Some(1.5)).is_err());
        assert!(StanceLabel::from_score(Some(f64::NAN)).is_err());
    }

    #[test]
    fn alignment_score_from_counts() {
        let summary = PolicySummary {
            num_votes_same: 8,
            num_votes_different: 2,
            ..Default::default()
        };
        assert_eq!(summary.alignment_score(), Some(0.8));

        let empty = PolicySummary::default();
        assert_eq!(empty.alignment_score(), None);
    }
}

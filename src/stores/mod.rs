//! Persistence for utterances, chunks, vectors, and metadata.
//!
//! The [`DebateStore`] trait is the contract consumed by the ingestion
//! pipeline and the retrieval engine; [`sqlite::SqliteDebateStore`] is the
//! SQLite implementation (sqlite-vec for ANN, FTS5 for lexical ranking).

pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::records::{DebateRow, Division, Membership, Person, PolicySummary, Vote};
use crate::types::RagError;

pub use sqlite::SqliteDebateStore;

/// Optional filters shared by vector and lexical search.
#[derive(Clone, Debug, Default)]
pub struct SearchFilters {
    /// Case-insensitive exact party match against `party_at_time`.
    pub party: Option<String>,
    pub person_id: Option<i64>,
    /// Inclusive lower date bound.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub date_to: Option<NaiveDate>,
}

/// Parent-utterance fields needed to format a search result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UtteranceRecord {
    pub speech_id: Option<String>,
    pub date: NaiveDate,
    pub speaker_name: Option<String>,
    pub speaker_office: Option<String>,
    pub person_id: Option<i64>,
    pub party_at_time: Option<String>,
    pub original_utterance: String,
    pub question_speaker: Option<String>,
    pub original_question_text: Option<String>,
    pub context_question_speaker: Option<String>,
    pub original_context_question_text: Option<String>,
    pub session_heading: Option<String>,
    pub department_heading: Option<String>,
    pub topic_heading: Option<String>,
}

/// One deduplicated search hit: the parent utterance with its best
/// (minimum) chunk score.
#[derive(Clone, Debug)]
pub struct ScoredUtterance {
    pub utterance: UtteranceRecord,
    pub score: f64,
}

/// Row counts for observability and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub utterances: usize,
    pub chunks: usize,
    pub embeddings: usize,
}

/// A person hit from the people directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersonHit {
    pub person_id: i64,
    pub display_name: String,
    pub current_party: Option<String>,
}

/// Storage contract for debate ingestion and retrieval.
///
/// Scores follow one convention throughout: lower is better, negative where
/// the backing metric allows it. Vector scores are negated cosine similarity
/// (`vec_distance_cosine − 1`); lexical scores are FTS5 `bm25()`.
#[async_trait]
pub trait DebateStore: Send + Sync {
    /// Persists a batch of chunk rows. Rows sharing a `speech_id` within the
    /// batch attach to one utterance; rows whose `speech_id` is already
    /// persisted are skipped entirely, so re-inserting a batch is a no-op.
    /// Returns the number of chunks written.
    async fn insert_debate_rows(
        &self,
        rows: Vec<DebateRow>,
        model: &str,
    ) -> Result<usize, RagError>;

    /// Vector search: per-chunk negated-cosine scores, `MIN` per utterance,
    /// filters, optional `best_score <= max_score` threshold, ascending
    /// score, `limit`.
    async fn search_vector(
        &self,
        query: Vec<f32>,
        filters: SearchFilters,
        limit: usize,
        max_score: Option<f64>,
    ) -> Result<Vec<ScoredUtterance>, RagError>;

    /// Lexical search over chunk text with FTS5 `bm25()`. `query` must
    /// already be valid MATCH syntax; no score threshold applies.
    async fn search_lexical(
        &self,
        query: String,
        filters: SearchFilters,
        limit: usize,
    ) -> Result<Vec<ScoredUtterance>, RagError>;

    /// Case-insensitive substring match on display names; current party is
    /// taken from the most recent membership by start date.
    async fn list_people(&self, name_substring: String) -> Result<Vec<PersonHit>, RagError>;

    /// Policy summaries for one person matching `term` (case-insensitive
    /// substring on policy name), restricted to the latest period present
    /// within that filtered subset.
    async fn voting_record(
        &self,
        person_id: i64,
        term: String,
    ) -> Result<Vec<PolicySummary>, RagError>;

    async fn insert_people(
        &self,
        persons: Vec<Person>,
        memberships: Vec<Membership>,
    ) -> Result<(), RagError>;

    async fn insert_divisions(
        &self,
        divisions: Vec<Division>,
        votes: Vec<Vote>,
    ) -> Result<(), RagError>;

    async fn insert_policy_summaries(
        &self,
        summaries: Vec<PolicySummary>,
    ) -> Result<(), RagError>;

    /// Empties all metadata tables ahead of a full reload.
    async fn truncate_metadata(&self) -> Result<(), RagError>;

    /// Sets `party_at_time` on every utterance whose date falls inside a
    /// membership interval of its speaker. Returns the number of utterances
    /// updated.
    async fn backfill_party_at_time(&self) -> Result<usize, RagError>;

    async fn counts(&self) -> Result<StoreCounts, RagError>;

    /// Deletes all persisted debate rows (utterances, chunks, vectors, FTS).
    /// Metadata tables are left intact.
    async fn reset(&self) -> Result<(), RagError>;
}

//! Hybrid retrieval over the debate store: vector search with a similarity
//! threshold, lexical `bm25()` search, the people directory, and voting
//! records.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::records::{PolicySummary, StanceLabel};
use crate::stores::{DebateStore, PersonHit, SearchFilters, UtteranceRecord};
use crate::types::RagError;

/// Flattened, serializable view of one search hit.
#[derive(Clone, Debug, Serialize)]
pub struct SearchResult {
    pub date: String,
    /// The verbatim utterance, never the formatted embedding text.
    pub text: String,
    pub speaker: SpeakerInfo,
    pub party: Option<String>,
    pub speech_id: Option<String>,
    pub context: ResultContext,
}

#[derive(Clone, Debug, Serialize)]
pub struct SpeakerInfo {
    pub name: Option<String>,
    pub office: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResultContext {
    pub topic: Option<String>,
    pub department: Option<String>,
    pub session: Option<String>,
    /// Present only when the source utterance had a main question on record.
    pub main_question: Option<QuestionRef>,
    /// Present only when a supplementary/intervention was on record.
    pub context_question: Option<QuestionRef>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuestionRef {
    pub speaker: Option<String>,
    pub text: String,
}

/// One policy entry of a voting record, with all derived figures computed.
#[derive(Clone, Debug, Serialize)]
pub struct VotingRecordEntry {
    pub person_id: i64,
    pub policy_name: Option<String>,
    pub policy_description: Option<String>,
    pub context_description: Option<String>,
    pub stance_label: String,
    pub alignment_score: Option<f64>,
    pub num_votes_same: i64,
    pub num_strong_votes_same: i64,
    pub num_votes_different: i64,
    pub num_strong_votes_different: i64,
    pub num_votes_absent: i64,
    pub num_strong_votes_absent: i64,
    pub num_votes_abstain: i64,
    pub num_strong_votes_abstain: i64,
    pub total_votes: i64,
    pub total_opportunities: i64,
    pub percent_aligned: f64,
    pub percent_opposed: f64,
    pub percent_absent: f64,
    pub percent_abstain: f64,
}

/// Retrieval facade over a [`DebateStore`] and an [`EmbeddingProvider`].
pub struct DebateRetriever {
    store: Arc<dyn DebateStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    /// Default cosine-similarity floor for vector search; per-call values
    /// override it.
    min_similarity: Option<f32>,
}

impl DebateRetriever {
    pub fn new(
        store: Arc<dyn DebateStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        top_k: usize,
        min_similarity: Option<f32>,
    ) -> Self {
        Self {
            store,
            embedder,
            top_k,
            min_similarity,
        }
    }

    /// Semantic search: embeds the query, scores chunks by negated cosine
    /// similarity, and returns at most `top_k` distinct utterances. A
    /// similarity floor of `s` excludes anything below cosine similarity `s`.
    pub async fn fetch(
        &self,
        query: &str,
        filters: SearchFilters,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SearchResult>, RagError> {
        let mut vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let embedding = vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("no embedding for query".into()))?;

        let effective = min_similarity.or(self.min_similarity);
        // Scores are negated similarity, so the floor becomes a ceiling.
        let max_score = effective.map(|s| -f64::from(s));

        let hits = self
            .store
            .search_vector(embedding, filters, self.top_k, max_score)
            .await?;
        debug!(hits = hits.len(), query, "vector search");
        Ok(hits
            .into_iter()
            .map(|hit| format_result(&hit.utterance))
            .collect())
    }

    /// Keyword search over chunk text using FTS5 `bm25()` ranking. No score
    /// threshold applies; query terms are quoted so punctuation and bare
    /// operators cannot surface as MATCH syntax faults.
    pub async fn fetch_lexical(
        &self,
        query: &str,
        filters: SearchFilters,
    ) -> Result<Vec<SearchResult>, RagError> {
        let match_query = quote_match_terms(query);
        if match_query.is_empty() {
            return Ok(Vec::new());
        }

        let hits = self
            .store
            .search_lexical(match_query, filters, self.top_k)
            .await?;
        debug!(hits = hits.len(), query, "lexical search");
        Ok(hits
            .into_iter()
            .map(|hit| format_result(&hit.utterance))
            .collect())
    }

    /// People whose display name contains `name` (case-insensitive), with
    /// their current party.
    pub async fn list_people(&self, name: &str) -> Result<Vec<PersonHit>, RagError> {
        self.store.list_people(name.to_string()).await
    }

    /// Voting record on policies matching `term`, restricted to the latest
    /// period in that subset, ordered by alignment then participation,
    /// truncated to `limit`.
    pub async fn voting_record(
        &self,
        person_id: i64,
        term: &str,
        limit: usize,
    ) -> Result<Vec<VotingRecordEntry>, RagError> {
        let summaries = self.store.voting_record(person_id, term.to_string()).await?;

        let mut entries = summaries
            .into_iter()
            .map(voting_entry)
            .collect::<Result<Vec<_>, _>>()?;

        entries.sort_by(|a, b| {
            let align = b
                .alignment_score
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.alignment_score.unwrap_or(f64::NEG_INFINITY));
            align.then_with(|| b.total_votes.cmp(&a.total_votes))
        });
        // Summaries can share a policy name within the period; keep only the
        // best-aligned entry per name.
        let mut seen: HashSet<Option<String>> = HashSet::new();
        entries.retain(|entry| seen.insert(entry.policy_name.clone()));
        entries.truncate(limit);
        Ok(entries)
    }
}

/// Wraps every whitespace-separated term in double quotes so the string is
/// always valid FTS5 MATCH syntax. Embedded quotes are doubled per SQL
/// conventions.
fn quote_match_terms(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_result(utterance: &UtteranceRecord) -> SearchResult {
    SearchResult {
        date: utterance.date.to_string(),
        text: utterance.original_utterance.clone(),
        speaker: SpeakerInfo {
            name: utterance.speaker_name.clone(),
            office: utterance.speaker_office.clone(),
        },
        party: utterance.party_at_time.clone(),
        speech_id: utterance.speech_id.clone(),
        context: ResultContext {
            topic: utterance.topic_heading.clone(),
            department: utterance.department_heading.clone(),
            session: utterance.session_heading.clone(),
            main_question: utterance.original_question_text.clone().map(|text| {
                QuestionRef {
                    speaker: utterance.question_speaker.clone(),
                    text,
                }
            }),
            context_question: utterance
                .original_context_question_text
                .clone()
                .map(|text| QuestionRef {
                    speaker: utterance.context_question_speaker.clone(),
                    text,
                }),
        },
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn voting_entry(summary: PolicySummary) -> Result<VotingRecordEntry, RagError> {
    let alignment_score = summary.alignment_score();
    let stance = StanceLabel::from_score(alignment_score)?;

    let same = summary.num_votes_same;
    let different = summary.num_votes_different;
    let absent = summary.num_votes_absent;
    let abstain = summary.num_votes_abstain;
    let total_votes = same + different;
    let total_opportunities = total_votes + absent + abstain;

    let percent = |count: i64, denominator: i64| {
        if denominator > 0 {
            round1(count as f64 / denominator as f64 * 100.0)
        } else {
            0.0
        }
    };

    Ok(VotingRecordEntry {
        person_id: summary.person_id,
        policy_name: summary.name,
        policy_description: summary.policy_description,
        context_description: summary.context_description,
        stance_label: stance.as_str().to_string(),
        alignment_score,
        num_votes_same: same,
        num_strong_votes_same: summary.num_strong_votes_same,
        num_votes_different: different,
        num_strong_votes_different: summary.num_strong_votes_different,
        num_votes_absent: absent,
        num_strong_votes_absent: summary.num_strong_votes_absent,
        num_votes_abstain: abstain,
        num_strong_votes_abstain: summary.num_strong_votes_abstain,
        total_votes,
        total_opportunities,
        percent_aligned: percent(same, total_votes),
        percent_opposed: percent(different, total_votes),
        percent_absent: percent(absent, total_opportunities),
        percent_abstain: percent(abstain, total_opportunities),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn match_terms_are_quoted() {
        assert_eq!(quote_match_terms("spending review"), "\"spending\" \"review\"");
        assert_eq!(quote_match_terms("NEAR hello-world"), "\"NEAR\" \"hello-world\"");
        assert_eq!(quote_match_terms("say \"this\""), "\"say\" \"\"\"this\"\"\"");
        assert_eq!(quote_match_terms("   "), "");
    }

    #[test]
    fn results_omit_absent_question_context() {
        let record = UtteranceRecord {
            speech_id: Some("uk.d/s1".into()),
            date: NaiveDate::from_ymd_opt(2025, 9, 16).unwrap(),
            speaker_name: Some("Bob Minister".into()),
            speaker_office: None,
            person_id: Some(1),
            party_at_time: Some("Independent".into()),
            original_utterance: "A statement.".into(),
            question_speaker: None,
            original_question_text: None,
            context_question_speaker: None,
            original_context_question_text: None,
            session_heading: None,
            department_heading: Some("Treasury".into()),
            topic_heading: None,
        };
        let result = format_result(&record);
        assert!(result.context.main_question.is_none());
        assert!(result.context.context_question.is_none());
        assert_eq!(result.text, "A statement.");
        assert_eq!(result.context.department.as_deref(), Some("Treasury"));
    }

    #[test]
    fn voting_entry_derives_percentages_and_stance() {
        let summary = PolicySummary {
            person_id: 7,
            name: Some("Welfare".into()),
            num_votes_same: 8,
            num_votes_different: 2,
            num_votes_absent: 5,
            num_votes_abstain: 0,
            ..PolicySummary::default()
        };
        let entry = voting_entry(summary).unwrap();
        assert_eq!(entry.percent_aligned, 80.0);
        assert_eq!(entry.percent_opposed, 20.0);
        assert_eq!(entry.total_votes, 10);
        assert_eq!(entry.total_opportunities, 15);
        assert_eq!(entry.percent_absent, 33.3);
        assert_eq!(entry.alignment_score, Some(0.8));
        assert_eq!(entry.stance_label, "generally voted for");
    }

    #[test]
    fn no_votes_yields_zero_percentages_and_no_evidence() {
        let entry = voting_entry(PolicySummary::default()).unwrap();
        assert_eq!(entry.percent_aligned, 0.0);
        assert_eq!(entry.percent_opposed, 0.0);
        assert_eq!(entry.alignment_score, None);
        assert_eq!(entry.stance_label, "no voting evidence");
    }
}

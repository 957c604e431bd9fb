//! SQLite-backed [`DebateStore`].
//!
//! One database file holds the relational model (utterance, chunk,
//! embedding, metadata tables), a `vec0` virtual table for vector scoring,
//! and an FTS5 table for `bm25()` lexical scoring. The sqlite-vec extension
//! is registered process-wide via `sqlite3_auto_extension` before the first
//! connection opens.

use std::collections::HashSet;
use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio_rusqlite::{ffi, params_from_iter, types::Value, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{
    DebateStore, PersonHit, ScoredUtterance, SearchFilters, StoreCounts, UtteranceRecord,
};
use crate::records::{DebateRow, Division, Membership, Person, PolicySummary, Vote};
use crate::types::RagError;

const UTTERANCE_COLUMNS: &str = "u.speech_id, u.date, u.speaker_name, u.speaker_office, \
     u.person_id, u.party_at_time, u.original_utterance, u.question_speaker, \
     u.original_question_text, u.context_question_speaker, \
     u.original_context_question_text, u.session_heading, u.department_heading, \
     u.topic_heading";

#[derive(Clone)]
pub struct SqliteDebateStore {
    conn: Connection,
}

impl SqliteDebateStore {
    /// Opens (or creates) the database and initializes the schema.
    pub async fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await
        .map_err(|err: tokio_rusqlite::Error| {
            RagError::Storage(format!("sqlite-vec unavailable: {err}"))
        })?;

        let store = Self { conn };
        store.init_schema(dimensions).await?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub async fn open_in_memory(dimensions: usize) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        let store = Self { conn };
        store.init_schema(dimensions).await?;
        Ok(store)
    }

    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::Storage)
    }

    async fn init_schema(&self, dimensions: usize) -> Result<(), RagError> {
        let schema = format!(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS utterance (
                id INTEGER PRIMARY KEY,
                speech_id TEXT UNIQUE,
                source_path TEXT NOT NULL,
                date TEXT NOT NULL,
                speaker_name TEXT,
                speaker_office TEXT,
                person_id INTEGER,
                speech_type TEXT NOT NULL,
                column_number INTEGER,
                url TEXT,
                time TEXT,
                oral_qnum TEXT,
                party_at_time TEXT,
                is_statement INTEGER NOT NULL,
                is_question INTEGER NOT NULL,
                is_main_question INTEGER NOT NULL,
                is_supplementary_question INTEGER NOT NULL,
                is_intervention INTEGER NOT NULL,
                is_answer INTEGER NOT NULL,
                statement_text TEXT,
                statement_speaker TEXT,
                original_statement_text TEXT,
                question_text TEXT,
                question_speaker TEXT,
                original_question_text TEXT,
                context_question_text TEXT,
                context_question_speaker TEXT,
                context_question_kind TEXT,
                original_context_question_text TEXT,
                session_heading TEXT,
                department_heading TEXT,
                topic_heading TEXT,
                utterance TEXT NOT NULL,
                original_utterance TEXT NOT NULL,
                num_paragraphs INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                is_truncated INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_utterance_person ON utterance(person_id);
            CREATE INDEX IF NOT EXISTS idx_utterance_date ON utterance(date);

            CREATE TABLE IF NOT EXISTS chunk (
                id INTEGER PRIMARY KEY,
                utterance_id INTEGER NOT NULL
                    REFERENCES utterance(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                chunk_text TEXT NOT NULL,
                embedding_text TEXT NOT NULL,
                start_char INTEGER NOT NULL,
                end_char INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunk_utterance ON chunk(utterance_id);

            CREATE TABLE IF NOT EXISTS embedding (
                id INTEGER PRIMARY KEY,
                chunk_id INTEGER NOT NULL REFERENCES chunk(id) ON DELETE CASCADE,
                model TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vectors
                USING vec0(embedding float[{dimensions}]);

            CREATE VIRTUAL TABLE IF NOT EXISTS chunk_fts USING fts5(chunk_text);

            CREATE TABLE IF NOT EXISTS person (
                id INTEGER PRIMARY KEY,
                given_name TEXT,
                family_name TEXT,
                display_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS membership (
                membership_id TEXT PRIMARY KEY,
                person_id INTEGER NOT NULL,
                party TEXT,
                post_id TEXT,
                start_date TEXT,
                end_date TEXT,
                start_reason TEXT,
                end_reason TEXT,
                historichansard_id TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_membership_person ON membership(person_id);

            CREATE TABLE IF NOT EXISTS division (
                division_key TEXT PRIMARY KEY,
                vote_date TEXT NOT NULL,
                description TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vote (
                division_key TEXT NOT NULL,
                person_id INTEGER NOT NULL,
                membership_id TEXT NOT NULL,
                vote TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_vote_person ON vote(person_id);

            CREATE TABLE IF NOT EXISTS policy_summary (
                person_id INTEGER NOT NULL,
                policy_id INTEGER NOT NULL,
                period_id INTEGER,
                name TEXT,
                policy_description TEXT,
                context_description TEXT,
                distance_score REAL NOT NULL,
                start_year INTEGER,
                end_year INTEGER,
                num_votes_same INTEGER NOT NULL,
                num_strong_votes_same INTEGER NOT NULL,
                num_votes_different INTEGER NOT NULL,
                num_strong_votes_different INTEGER NOT NULL,
                num_votes_absent INTEGER NOT NULL,
                num_strong_votes_absent INTEGER NOT NULL,
                num_votes_abstain INTEGER NOT NULL,
                num_strong_votes_abstain INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_policy_summary_person
                ON policy_summary(person_id);
            "#
        );

        self.conn
            .call(move |conn| {
                conn.execute_batch(&schema)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Builds the shared filter clause and its parameters.
    fn filter_clause(filters: &SearchFilters, sql: &mut String, params: &mut Vec<Value>) {
        if let Some(party) = &filters.party {
            sql.push_str(" AND lower(u.party_at_time) = lower(?)");
            params.push(Value::Text(party.clone()));
        }
        if let Some(person_id) = filters.person_id {
            sql.push_str(" AND u.person_id = ?");
            params.push(Value::Integer(person_id));
        }
        if let Some(from) = filters.date_from {
            sql.push_str(" AND u.date >= ?");
            params.push(Value::Text(from.to_string()));
        }
        if let Some(to) = filters.date_to {
            sql.push_str(" AND u.date <= ?");
            params.push(Value::Text(to.to_string()));
        }
    }

    async fn scored_query(
        &self,
        sql: String,
        params: Vec<Value>,
    ) -> Result<Vec<ScoredUtterance>, RagError> {
        let raw = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(params), |row| {
                    Ok(RawScoredRow {
                        speech_id: row.get(0)?,
                        date: row.get(1)?,
                        speaker_name: row.get(2)?,
                        speaker_office: row.get(3)?,
                        person_id: row.get(4)?,
                        party_at_time: row.get(5)?,
                        original_utterance: row.get(6)?,
                        question_speaker: row.get(7)?,
                        original_question_text: row.get(8)?,
                        context_question_speaker: row.get(9)?,
                        original_context_question_text: row.get(10)?,
                        session_heading: row.get(11)?,
                        department_heading: row.get(12)?,
                        topic_heading: row.get(13)?,
                        score: row.get(14)?,
                    })
                })?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await?;

        raw.into_iter().map(RawScoredRow::into_scored).collect()
    }
}

/// Row image before the date column is parsed.
struct RawScoredRow {
    speech_id: Option<String>,
    date: String,
    speaker_name: Option<String>,
    speaker_office: Option<String>,
    person_id: Option<i64>,
    party_at_time: Option<String>,
    original_utterance: String,
    question_speaker: Option<String>,
    original_question_text: Option<String>,
    context_question_speaker: Option<String>,
    original_context_question_text: Option<String>,
    session_heading: Option<String>,
    department_heading: Option<String>,
    topic_heading: Option<String>,
    score: f64,
}

impl RawScoredRow {
    fn into_scored(self) -> Result<ScoredUtterance, RagError> {
        let date = parse_stored_date(&self.date)?;
        Ok(ScoredUtterance {
            utterance: UtteranceRecord {
                speech_id: self.speech_id,
                date,
                speaker_name: self.speaker_name,
                speaker_office: self.speaker_office,
                person_id: self.person_id,
                party_at_time: self.party_at_time,
                original_utterance: self.original_utterance,
                question_speaker: self.question_speaker,
                original_question_text: self.original_question_text,
                context_question_speaker: self.context_question_speaker,
                original_context_question_text: self.original_context_question_text,
                session_heading: self.session_heading,
                department_heading: self.department_heading,
                topic_heading: self.topic_heading,
            },
            score: self.score,
        })
    }
}

fn parse_stored_date(raw: &str) -> Result<NaiveDate, RagError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| RagError::Storage(format!("bad stored date '{raw}': {err}")))
}

fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}

fn opt_int(value: Option<i64>) -> Value {
    match value {
        Some(v) => Value::Integer(v),
        None => Value::Null,
    }
}

fn flag(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

/// One chunk ready for insertion, with the vector pre-serialized.
struct ChunkInsert {
    chunk_index: i64,
    chunk_text: String,
    embedding_text: String,
    start_char: i64,
    end_char: i64,
    embedding_json: Option<String>,
}

/// One utterance with its chunk rows, grouped before entering the write
/// transaction.
struct UtteranceGroup {
    speech_id: Option<String>,
    values: Vec<Value>,
    chunks: Vec<ChunkInsert>,
}

fn utterance_values(row: &DebateRow) -> Vec<Value> {
    vec![
        opt_text(row.speech_id.as_deref()),
        Value::Text(row.source_path.clone()),
        Value::Text(row.date.to_string()),
        opt_text(row.speaker_name.as_deref()),
        opt_text(row.speaker_office.as_deref()),
        opt_int(row.person_id),
        Value::Text(row.speech_type.clone()),
        opt_int(row.column),
        opt_text(row.url.as_deref()),
        opt_text(row.time.as_deref()),
        opt_text(row.oral_qnum.as_deref()),
        opt_text(row.party_at_time.as_deref()),
        flag(row.is_statement),
        flag(row.is_question),
        flag(row.is_main_question),
        flag(row.is_supplementary_question),
        flag(row.is_intervention),
        flag(row.is_answer),
        opt_text(row.statement_text.as_deref()),
        opt_text(row.statement_speaker.as_deref()),
        opt_text(row.original_statement_text.as_deref()),
        opt_text(row.question_text.as_deref()),
        opt_text(row.question_speaker.as_deref()),
        opt_text(row.original_question_text.as_deref()),
        opt_text(row.context_question_text.as_deref()),
        opt_text(row.context_question_speaker.as_deref()),
        opt_text(row.context_question_kind.map(|k| k.as_str())),
        opt_text(row.original_context_question_text.as_deref()),
        opt_text(row.session_heading.as_deref()),
        opt_text(row.department_heading.as_deref()),
        opt_text(row.topic_heading.as_deref()),
        Value::Text(row.utterance.clone()),
        Value::Text(row.original_utterance.clone()),
        Value::Integer(row.num_paragraphs as i64),
        Value::Integer(row.token_count as i64),
        flag(row.is_truncated),
    ]
}

const INSERT_UTTERANCE: &str = "INSERT INTO utterance (
        speech_id, source_path, date, speaker_name, speaker_office, person_id,
        speech_type, column_number, url, time, oral_qnum, party_at_time,
        is_statement, is_question, is_main_question, is_supplementary_question,
        is_intervention, is_answer,
        statement_text, statement_speaker, original_statement_text,
        question_text, question_speaker, original_question_text,
        context_question_text, context_question_speaker, context_question_kind,
        original_context_question_text,
        session_heading, department_heading, topic_heading,
        utterance, original_utterance, num_paragraphs, token_count, is_truncated
    ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)";

/// Groups chunk rows into utterances. A new group starts at chunk index 0;
/// the chunker emits siblings adjacently in ascending index order.
fn group_rows(rows: Vec<DebateRow>) -> Result<Vec<UtteranceGroup>, RagError> {
    let mut groups: Vec<UtteranceGroup> = Vec::new();
    for row in rows {
        let chunk = row.chunk()?;
        let insert = ChunkInsert {
            chunk_index: chunk.chunk_index as i64,
            chunk_text: chunk.chunk_text.clone(),
            embedding_text: chunk.embedding_text.clone(),
            start_char: chunk.start_char as i64,
            end_char: chunk.end_char as i64,
            embedding_json: row
                .embedding
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        };
        if chunk.chunk_index == 0 || groups.is_empty() {
            groups.push(UtteranceGroup {
                speech_id: row.speech_id.clone(),
                values: utterance_values(&row),
                chunks: vec![insert],
            });
        } else {
            let group = groups.last_mut().ok_or_else(|| {
                RagError::Storage("chunk row without a leading utterance".into())
            })?;
            group.chunks.push(insert);
        }
    }
    Ok(groups)
}

#[async_trait]
impl DebateStore for SqliteDebateStore {
    async fn insert_debate_rows(
        &self,
        rows: Vec<DebateRow>,
        model: &str,
    ) -> Result<usize, RagError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let groups = group_rows(rows)?;
        let model = model.to_string();

        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted_chunks = 0usize;
                let mut seen: HashSet<String> = HashSet::new();

                for group in groups {
                    // Utterances already persisted (or repeated within the
                    // batch) are skipped wholesale, so re-inserts are no-ops.
                    if let Some(speech_id) = &group.speech_id {
                        if !seen.insert(speech_id.clone()) {
                            continue;
                        }
                        let existing: Option<i64> = tx
                            .query_row(
                                "SELECT id FROM utterance WHERE speech_id = ?",
                                [speech_id],
                                |row| row.get(0),
                            )
                            .optional()?;
                        if existing.is_some() {
                            continue;
                        }
                    }

                    tx.execute(INSERT_UTTERANCE, params_from_iter(group.values))?;
                    let utterance_id = tx.last_insert_rowid();

                    for chunk in group.chunks {
                        tx.execute(
                            "INSERT INTO chunk (utterance_id, chunk_index, chunk_text, \
                             embedding_text, start_char, end_char) VALUES (?,?,?,?,?,?)",
                            params_from_iter(vec![
                                Value::Integer(utterance_id),
                                Value::Integer(chunk.chunk_index),
                                Value::Text(chunk.chunk_text.clone()),
                                Value::Text(chunk.embedding_text),
                                Value::Integer(chunk.start_char),
                                Value::Integer(chunk.end_char),
                            ]),
                        )?;
                        let chunk_id = tx.last_insert_rowid();

                        tx.execute(
                            "INSERT INTO chunk_fts (rowid, chunk_text) VALUES (?,?)",
                            params_from_iter(vec![
                                Value::Integer(chunk_id),
                                Value::Text(chunk.chunk_text),
                            ]),
                        )?;

                        if let Some(embedding_json) = chunk.embedding_json {
                            tx.execute(
                                "INSERT INTO embedding (chunk_id, model) VALUES (?,?)",
                                params_from_iter(vec![
                                    Value::Integer(chunk_id),
                                    Value::Text(model.clone()),
                                ]),
                            )?;
                            let embedding_id = tx.last_insert_rowid();
                            tx.execute(
                                "INSERT INTO chunk_vectors (rowid, embedding) \
                                 VALUES (?, vec_f32(?))",
                                params_from_iter(vec![
                                    Value::Integer(embedding_id),
                                    Value::Text(embedding_json),
                                ]),
                            )?;
                        }
                        inserted_chunks += 1;
                    }
                }

                tx.commit()?;
                Ok(inserted_chunks)
            })
            .await?;

        debug!(chunks = inserted, "persisted debate rows");
        Ok(inserted)
    }

    async fn search_vector(
        &self,
        query: Vec<f32>,
        filters: SearchFilters,
        limit: usize,
        max_score: Option<f64>,
    ) -> Result<Vec<ScoredUtterance>, RagError> {
        let query_json = serde_json::to_string(&query)?;

        let mut sql = format!(
            "SELECT {UTTERANCE_COLUMNS}, best.best_score FROM ( \
                 SELECT c.utterance_id AS utterance_id, \
                        MIN(vec_distance_cosine(v.embedding, vec_f32(?)) - 1.0) AS best_score \
                 FROM chunk c \
                 JOIN embedding e ON e.chunk_id = c.id \
                 JOIN chunk_vectors v ON v.rowid = e.id \
                 GROUP BY c.utterance_id \
             ) best \
             JOIN utterance u ON u.id = best.utterance_id \
             WHERE 1=1"
        );
        let mut params = vec![Value::Text(query_json)];
        Self::filter_clause(&filters, &mut sql, &mut params);
        if let Some(max_score) = max_score {
            sql.push_str(" AND best.best_score <= ?");
            params.push(Value::Real(max_score));
        }
        sql.push_str(" ORDER BY best.best_score ASC LIMIT ?");
        params.push(Value::Integer(limit as i64));

        self.scored_query(sql, params).await
    }

    async fn search_lexical(
        &self,
        query: String,
        filters: SearchFilters,
        limit: usize,
    ) -> Result<Vec<ScoredUtterance>, RagError> {
        let mut sql = format!(
            "SELECT {UTTERANCE_COLUMNS}, best.best_score FROM ( \
                 SELECT c.utterance_id AS utterance_id, \
                        MIN(bm25(chunk_fts)) AS best_score \
                 FROM chunk_fts \
                 JOIN chunk c ON c.id = chunk_fts.rowid \
                 WHERE chunk_fts MATCH ? \
                 GROUP BY c.utterance_id \
             ) best \
             JOIN utterance u ON u.id = best.utterance_id \
             WHERE 1=1"
        );
        let mut params = vec![Value::Text(query)];
        Self::filter_clause(&filters, &mut sql, &mut params);
        sql.push_str(" ORDER BY best.best_score ASC LIMIT ?");
        params.push(Value::Integer(limit as i64));

        self.scored_query(sql, params).await
    }

    async fn list_people(&self, name_substring: String) -> Result<Vec<PersonHit>, RagError> {
        let hits = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.display_name, ( \
                         SELECT m.party FROM membership m \
                         WHERE m.person_id = p.id \
                         ORDER BY m.start_date DESC LIMIT 1 \
                     ) AS current_party \
                     FROM person p \
                     WHERE lower(p.display_name) LIKE '%' || lower(?) || '%' \
                     ORDER BY p.id",
                )?;
                let rows = stmt.query_map([&name_substring], |row| {
                    Ok(PersonHit {
                        person_id: row.get(0)?,
                        display_name: row.get(1)?,
                        current_party: row.get(2)?,
                    })
                })?;
                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await?;
        Ok(hits)
    }

    async fn voting_record(
        &self,
        person_id: i64,
        term: String,
    ) -> Result<Vec<PolicySummary>, RagError> {
        let summaries = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT person_id, policy_id, period_id, name, policy_description, \
                            context_description, distance_score, start_year, end_year, \
                            num_votes_same, num_strong_votes_same, \
                            num_votes_different, num_strong_votes_different, \
                            num_votes_absent, num_strong_votes_absent, \
                            num_votes_abstain, num_strong_votes_abstain \
                     FROM policy_summary \
                     WHERE person_id = ?1 \
                       AND lower(name) LIKE '%' || lower(?2) || '%' \
                       AND period_id IS NOT NULL \
                       AND period_id = ( \
                           SELECT MAX(period_id) FROM policy_summary \
                           WHERE person_id = ?1 \
                             AND lower(name) LIKE '%' || lower(?2) || '%' \
                             AND period_id IS NOT NULL \
                       )",
                )?;
                let rows = stmt.query_map(
                    params_from_iter(vec![Value::Integer(person_id), Value::Text(term)]),
                    |row| {
                        Ok(PolicySummary {
                            person_id: row.get(0)?,
                            policy_id: row.get(1)?,
                            period_id: row.get(2)?,
                            name: row.get(3)?,
                            policy_description: row.get(4)?,
                            context_description: row.get(5)?,
                            distance_score: row.get(6)?,
                            start_year: row.get(7)?,
                            end_year: row.get(8)?,
                            num_votes_same: row.get(9)?,
                            num_strong_votes_same: row.get(10)?,
                            num_votes_different: row.get(11)?,
                            num_strong_votes_different: row.get(12)?,
                            num_votes_absent: row.get(13)?,
                            num_strong_votes_absent: row.get(14)?,
                            num_votes_abstain: row.get(15)?,
                            num_strong_votes_abstain: row.get(16)?,
                        })
                    },
                )?;
                let mut summaries = Vec::new();
                for row in rows {
                    summaries.push(row?);
                }
                Ok(summaries)
            })
            .await?;
        Ok(summaries)
    }

    async fn insert_people(
        &self,
        persons: Vec<Person>,
        memberships: Vec<Membership>,
    ) -> Result<(), RagError> {
        let count = (persons.len(), memberships.len());
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for person in persons {
                    tx.execute(
                        "INSERT OR REPLACE INTO person \
                         (id, given_name, family_name, display_name) VALUES (?,?,?,?)",
                        params_from_iter(vec![
                            Value::Integer(person.id),
                            opt_text(person.given_name.as_deref()),
                            opt_text(person.family_name.as_deref()),
                            Value::Text(person.display_name),
                        ]),
                    )?;
                }
                for membership in memberships {
                    tx.execute(
                        "INSERT OR REPLACE INTO membership \
                         (membership_id, person_id, party, post_id, start_date, end_date, \
                          start_reason, end_reason, historichansard_id) \
                         VALUES (?,?,?,?,?,?,?,?,?)",
                        params_from_iter(vec![
                            Value::Text(membership.membership_id),
                            Value::Integer(membership.person_id),
                            opt_text(membership.party.as_deref()),
                            opt_text(membership.post_id.as_deref()),
                            opt_text(membership.start_date.map(|d| d.to_string()).as_deref()),
                            opt_text(membership.end_date.map(|d| d.to_string()).as_deref()),
                            opt_text(membership.start_reason.as_deref()),
                            opt_text(membership.end_reason.as_deref()),
                            opt_text(membership.historichansard_id.as_deref()),
                        ]),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        info!(
            persons = count.0,
            memberships = count.1,
            "inserted people metadata"
        );
        Ok(())
    }

    async fn insert_divisions(
        &self,
        divisions: Vec<Division>,
        votes: Vec<Vote>,
    ) -> Result<(), RagError> {
        let count = (divisions.len(), votes.len());
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for division in divisions {
                    tx.execute(
                        "INSERT OR REPLACE INTO division \
                         (division_key, vote_date, description) VALUES (?,?,?)",
                        params_from_iter(vec![
                            Value::Text(division.division_key),
                            Value::Text(division.vote_date.to_string()),
                            Value::Text(division.description),
                        ]),
                    )?;
                }
                for vote in votes {
                    tx.execute(
                        "INSERT INTO vote (division_key, person_id, membership_id, vote) \
                         VALUES (?,?,?,?)",
                        params_from_iter(vec![
                            Value::Text(vote.division_key),
                            Value::Integer(vote.person_id),
                            Value::Text(vote.membership_id),
                            Value::Text(vote.vote.as_str().to_string()),
                        ]),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        info!(divisions = count.0, votes = count.1, "inserted vote metadata");
        Ok(())
    }

    async fn insert_policy_summaries(
        &self,
        summaries: Vec<PolicySummary>,
    ) -> Result<(), RagError> {
        let count = summaries.len();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for summary in summaries {
                    tx.execute(
                        "INSERT INTO policy_summary \
                         (person_id, policy_id, period_id, name, policy_description, \
                          context_description, distance_score, start_year, end_year, \
                          num_votes_same, num_strong_votes_same, \
                          num_votes_different, num_strong_votes_different, \
                          num_votes_absent, num_strong_votes_absent, \
                          num_votes_abstain, num_strong_votes_abstain) \
                         VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
                        params_from_iter(vec![
                            Value::Integer(summary.person_id),
                            Value::Integer(summary.policy_id),
                            opt_int(summary.period_id),
                            opt_text(summary.name.as_deref()),
                            opt_text(summary.policy_description.as_deref()),
                            opt_text(summary.context_description.as_deref()),
                            Value::Real(summary.distance_score),
                            opt_int(summary.start_year.map(i64::from)),
                            opt_int(summary.end_year.map(i64::from)),
                            Value::Integer(summary.num_votes_same),
                            Value::Integer(summary.num_strong_votes_same),
                            Value::Integer(summary.num_votes_different),
                            Value::Integer(summary.num_strong_votes_different),
                            Value::Integer(summary.num_votes_absent),
                            Value::Integer(summary.num_strong_votes_absent),
                            Value::Integer(summary.num_votes_abstain),
                            Value::Integer(summary.num_strong_votes_abstain),
                        ]),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        info!(summaries = count, "inserted policy summaries");
        Ok(())
    }

    async fn truncate_metadata(&self) -> Result<(), RagError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "DELETE FROM vote; \
                     DELETE FROM division; \
                     DELETE FROM membership; \
                     DELETE FROM person; \
                     DELETE FROM policy_summary;",
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn backfill_party_at_time(&self) -> Result<usize, RagError> {
        let updated = self
            .conn
            .call(|conn| {
                let updated = conn.execute(
                    "UPDATE utterance SET party_at_time = ( \
                         SELECT m.party FROM membership m \
                         WHERE m.person_id = utterance.person_id \
                           AND (m.start_date IS NULL OR m.start_date <= utterance.date) \
                           AND (m.end_date IS NULL OR m.end_date >= utterance.date) \
                         ORDER BY m.start_date DESC LIMIT 1 \
                     ) \
                     WHERE utterance.person_id IS NOT NULL \
                       AND EXISTS ( \
                           SELECT 1 FROM membership m \
                           WHERE m.person_id = utterance.person_id \
                             AND (m.start_date IS NULL OR m.start_date <= utterance.date) \
                             AND (m.end_date IS NULL OR m.end_date >= utterance.date) \
                       )",
                    [],
                )?;
                Ok(updated)
            })
            .await?;
        info!(updated, "backfilled party_at_time");
        Ok(updated)
    }

    async fn counts(&self) -> Result<StoreCounts, RagError> {
        let counts = self
            .conn
            .call(|conn| {
                let utterances: i64 =
                    conn.query_row("SELECT COUNT(*) FROM utterance", [], |row| row.get(0))?;
                let chunks: i64 =
                    conn.query_row("SELECT COUNT(*) FROM chunk", [], |row| row.get(0))?;
                let embeddings: i64 =
                    conn.query_row("SELECT COUNT(*) FROM embedding", [], |row| row.get(0))?;
                Ok(StoreCounts {
                    utterances: utterances as usize,
                    chunks: chunks as usize,
                    embeddings: embeddings as usize,
                })
            })
            .await?;
        Ok(counts)
    }

    async fn reset(&self) -> Result<(), RagError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "DELETE FROM chunk_vectors; \
                     DELETE FROM chunk_fts; \
                     DELETE FROM embedding; \
                     DELETE FROM chunk; \
                     DELETE FROM utterance;",
                )?;
                Ok(())
            })
            .await?;
        info!("cleared persisted debate rows");
        Ok(())
    }
}

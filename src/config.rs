//! Environment-driven configuration.
//!
//! Mirrors the `.env` conventions used elsewhere in the stack: call
//! [`Settings::from_env`] once at startup, after `dotenvy::dotenv()` has had a
//! chance to populate the process environment.

use std::env;
use std::path::PathBuf;

use crate::types::RagError;

/// Runtime settings for ingestion and retrieval.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory containing debate markup files.
    pub debates_dir: PathBuf,
    /// Directory containing metadata inputs (people.json, divisions.csv, ...).
    pub metadata_dir: PathBuf,
    /// SQLite database path.
    pub database_path: PathBuf,
    /// Checkpoint file recording fully-processed documents.
    pub checkpoint_path: PathBuf,
    /// Summary cache file (content hash -> summary).
    pub summary_cache_path: PathBuf,

    /// Identity tag recorded against every persisted vector.
    pub embedding_model_name: String,
    pub embedding_dimensions: usize,
    /// Maximum input length of the embedding model, in tokens.
    pub max_seq_length: usize,
    /// Target tokens per chunk when an utterance must be split.
    pub chunk_size: usize,
    /// Token overlap carried between consecutive chunks.
    pub chunk_overlap: usize,

    /// Debate files per pipeline batch.
    pub batch_size: usize,
    /// Texts per embedding sub-batch.
    pub embed_batch_size: usize,
    pub max_batches: Option<usize>,
    /// Only ingest files dated on/after this date (YYYY-MM-DD).
    pub start_date: Option<String>,

    pub summarizer_model: String,
    /// Summarize context texts longer than this many tokens.
    pub summary_token_threshold: usize,
    pub summary_target_tokens: usize,
    pub summary_max_concurrent: usize,
    pub api_base_url: String,
    pub api_key: Option<String>,

    pub top_k: usize,
    pub min_similarity: Option<f32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debates_dir: PathBuf::from("data/debates"),
            metadata_dir: PathBuf::from("data/metadata"),
            database_path: PathBuf::from("debatesmith.sqlite"),
            checkpoint_path: PathBuf::from("data/processed/.debate_pipeline_checkpoint.json"),
            summary_cache_path: PathBuf::from("data/processed/.statement_summaries_cache.json"),
            embedding_model_name: "multi-qa-MiniLM-L6-cos-v1".to_string(),
            embedding_dimensions: 384,
            max_seq_length: 512,
            chunk_size: 400,
            chunk_overlap: 100,
            batch_size: 50,
            embed_batch_size: 8,
            max_batches: None,
            start_date: None,
            summarizer_model: "gpt-4o-mini".to_string(),
            summary_token_threshold: 100,
            summary_target_tokens: 50,
            summary_max_concurrent: 10,
            api_base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            top_k: 20,
            min_similarity: None,
        }
    }
}

impl Settings {
    /// Builds settings from environment variables, falling back to defaults.
    ///
    /// Numeric variables that are present but unparsable are a configuration
    /// error rather than a silent fallback.
    pub fn from_env() -> Result<Self, RagError> {
        let mut settings = Settings::default();

        if let Ok(dir) = env::var("DEBATES_DIR") {
            settings.debates_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("METADATA_DIR") {
            settings.metadata_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("DATABASE_PATH") {
            settings.database_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("CHECKPOINT_PATH") {
            settings.checkpoint_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("SUMMARY_CACHE_PATH") {
            settings.summary_cache_path = PathBuf::from(path);
        }
        if let Ok(name) = env::var("EMBEDDING_MODEL_NAME") {
            settings.embedding_model_name = name;
        }
        if let Ok(model) = env::var("SUMMARIZER_MODEL") {
            settings.summarizer_model = model;
        }
        if let Ok(url) = env::var("LLM_API_BASE_URL") {
            settings.api_base_url = url;
        }
        settings.api_key = env::var("OPENAI_API_KEY").ok();
        settings.start_date = env::var("INGEST_START_DATE").ok();

        settings.embedding_dimensions =
            parse_var("EMBEDDING_DIMENSIONS", settings.embedding_dimensions)?;
        settings.max_seq_length = parse_var("MAX_SEQ_LENGTH", settings.max_seq_length)?;
        settings.chunk_size = parse_var("CHUNK_SIZE", settings.chunk_size)?;
        settings.chunk_overlap = parse_var("CHUNK_OVERLAP", settings.chunk_overlap)?;
        settings.batch_size = parse_var("BATCH_SIZE", settings.batch_size)?;
        settings.embed_batch_size = parse_var("EMBED_BATCH_SIZE", settings.embed_batch_size)?;
        settings.summary_token_threshold =
            parse_var("SUMMARY_TOKEN_THRESHOLD", settings.summary_token_threshold)?;
        settings.summary_target_tokens =
            parse_var("SUMMARY_TARGET_TOKENS", settings.summary_target_tokens)?;
        settings.summary_max_concurrent =
            parse_var("SUMMARY_MAX_CONCURRENT", settings.summary_max_concurrent)?;
        settings.top_k = parse_var("RETRIEVAL_TOP_K", settings.top_k)?;

        if let Ok(raw) = env::var("MAX_BATCHES") {
            let value = raw
                .parse::<usize>()
                .map_err(|err| RagError::Config(format!("MAX_BATCHES: {err}")))?;
            settings.max_batches = Some(value);
        }
        if let Ok(raw) = env::var("MIN_SIMILARITY") {
            let value = raw
                .parse::<f32>()
                .map_err(|err| RagError::Config(format!("MIN_SIMILARITY: {err}")))?;
            settings.min_similarity = Some(value);
        }

        Ok(settings)
    }
}

fn parse_var(name: &str, default: usize) -> Result<usize, RagError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<usize>()
            .map_err(|err| RagError::Config(format!("{name}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert!(settings.chunk_size <= settings.max_seq_length);
        assert!(settings.chunk_overlap < settings.chunk_size);
        assert_eq!(settings.embedding_dimensions, 384);
    }
}

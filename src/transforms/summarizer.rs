//! Summarizes long context texts through an OpenAI-compatible chat endpoint.
//!
//! Only the mutable `statement_text` / `question_text` /
//! `context_question_text` fields are rewritten; their `original_*`
//! counterparts are left untouched so downstream formatting can tell a
//! summary from verbatim text. Summaries are cached by content hash and the
//! cache is flushed after each field pass so a crash mid-run loses at most
//! one pass of API spend.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use crate::ingestion::cache::{content_hash, SummaryStore};
use crate::records::DebateRow;
use crate::tokenizer::TokenCounter;
use crate::transforms::BatchTransform;
use crate::types::RagError;

const MAX_COMPLETION_TOKENS: usize = 120;

#[derive(Clone, Copy)]
enum Field {
    Statement,
    MainQuestion,
    ContextQuestion,
}

impl Field {
    fn kind(&self) -> &'static str {
        match self {
            Field::Statement => "statement",
            Field::MainQuestion | Field::ContextQuestion => "question",
        }
    }

    fn get(&self, row: &DebateRow) -> Option<String> {
        match self {
            Field::Statement => row.statement_text.clone(),
            Field::MainQuestion => row.question_text.clone(),
            Field::ContextQuestion => row.context_question_text.clone(),
        }
    }

    fn set(&self, row: &mut DebateRow, value: Option<String>) {
        match self {
            Field::Statement => row.statement_text = value,
            Field::MainQuestion => row.question_text = value,
            Field::ContextQuestion => row.context_question_text = value,
        }
    }
}

#[derive(Clone)]
pub struct StatementSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    counter: TokenCounter,
    token_threshold: usize,
    target_tokens: usize,
    cache: Arc<dyn SummaryStore>,
    semaphore: Arc<Semaphore>,
    include_statement: bool,
    include_main_question: bool,
    include_context_question: bool,
}

impl StatementSummarizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        counter: TokenCounter,
        token_threshold: usize,
        target_tokens: usize,
        max_concurrent: usize,
        cache: Arc<dyn SummaryStore>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            counter,
            token_threshold,
            target_tokens,
            cache,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            include_statement: false,
            include_main_question: true,
            include_context_question: true,
        }
    }

    pub fn include_statement(mut self, include: bool) -> Self {
        self.include_statement = include;
        self
    }

    fn enabled_fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.include_statement {
            fields.push(Field::Statement);
        }
        if self.include_main_question {
            fields.push(Field::MainQuestion);
        }
        if self.include_context_question {
            fields.push(Field::ContextQuestion);
        }
        fields
    }

    async fn process_text(&self, text: String, kind: &'static str) -> Result<String, RagError> {
        if text.is_empty() || self.counter.count(&text) <= self.token_threshold {
            return Ok(text);
        }

        let key = content_hash(&text);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let summary = {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|err| RagError::Summarize(err.to_string()))?;
            self.summarize(&text, kind).await?
        };
        self.cache.set(key, summary.clone()).await;
        Ok(summary)
    }

    async fn summarize(&self, text: &str, kind: &'static str) -> Result<String, RagError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Summarize this parliamentary {kind} in 1-2 sentences (at most \
                         about {} tokens), preserving key facts and positions.",
                        self.target_tokens
                    ),
                },
                {"role": "user", "content": text},
            ],
            "max_tokens": MAX_COMPLETION_TOKENS,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::Summarize("empty completion".into()))
    }

    async fn process_field(
        &self,
        rows: &mut [DebateRow],
        field: Field,
    ) -> Result<(), RagError> {
        let mut set: JoinSet<Result<(usize, Option<String>), RagError>> = JoinSet::new();
        for (idx, row) in rows.iter().enumerate() {
            let text = field.get(row);
            let this = self.clone();
            set.spawn(async move {
                let out = match text {
                    Some(text) => Some(this.process_text(text, field.kind()).await?),
                    None => None,
                };
                Ok((idx, out))
            });
        }

        while let Some(joined) = set.join_next().await {
            let (idx, out) = joined.map_err(|err| RagError::Summarize(err.to_string()))??;
            field.set(&mut rows[idx], out);
        }

        // Flush once per field pass for crash safety.
        self.cache.flush().await
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl BatchTransform for StatementSummarizer {
    fn name(&self) -> &'static str {
        "statement_summarizer"
    }

    async fn apply(&self, mut rows: Vec<DebateRow>) -> Result<Vec<DebateRow>, RagError> {
        for field in self.enabled_fields() {
            self.process_field(&mut rows, field).await?;
        }
        info!(rows = rows.len(), model = %self.model, "summarization pass complete");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::cache::MemoryCache;

    fn long_question() -> String {
        "Will the Chancellor set out in detail the departmental spending plans? "
            .repeat(20)
            .trim()
            .to_string()
    }

    fn summarizer(server: &httpmock::MockServer, cache: Arc<MemoryCache>) -> StatementSummarizer {
        StatementSummarizer::new(
            server.url("/v1"),
            None,
            "test-model",
            TokenCounter::new().unwrap(),
            100,
            50,
            4,
            cache,
        )
    }

    fn chat_mock(server: &httpmock::MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(200).json_body(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "A short summary."}},
                ],
            }));
        })
    }

    #[tokio::test]
    async fn long_fields_are_summarized_and_originals_kept() {
        let server = httpmock::MockServer::start();
        let mock = chat_mock(&server);
        let cache = MemoryCache::new();

        let question = long_question();
        let row = DebateRow {
            question_text: Some(question.clone()),
            original_question_text: Some(question.clone()),
            ..DebateRow::default()
        };
        let rows = summarizer(&server, cache.clone())
            .apply(vec![row])
            .await
            .unwrap();

        mock.assert();
        assert_eq!(rows[0].question_text.as_deref(), Some("A short summary."));
        assert_eq!(rows[0].original_question_text.as_deref(), Some(question.as_str()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn short_fields_are_left_alone() {
        let server = httpmock::MockServer::start();
        let mock = chat_mock(&server);
        let cache = MemoryCache::new();

        let row = DebateRow {
            question_text: Some("A short question?".into()),
            ..DebateRow::default()
        };
        let rows = summarizer(&server, cache.clone())
            .apply(vec![row])
            .await
            .unwrap();

        mock.assert_hits(0);
        assert_eq!(rows[0].question_text.as_deref(), Some("A short question?"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn repeated_texts_hit_the_cache() {
        let server = httpmock::MockServer::start();
        let mock = chat_mock(&server);
        let cache = MemoryCache::new();

        let question = long_question();
        let make_row = || DebateRow {
            question_text: Some(question.clone()),
            ..DebateRow::default()
        };

        let this = summarizer(&server, cache.clone());
        this.apply(vec![make_row()]).await.unwrap();
        this.apply(vec![make_row()]).await.unwrap();

        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn api_failures_propagate() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method(httpmock::Method::POST)
                .path("/v1/chat/completions");
            then.status(500);
        });

        let row = DebateRow {
            question_text: Some(long_question()),
            ..DebateRow::default()
        };
        let result = summarizer(&server, MemoryCache::new()).apply(vec![row]).await;
        assert!(result.is_err());
    }
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use docbot_index::{IndexArtifact, VectorIndex};
use docbot_provider::{EmbeddingProvider, GenerationConfig, TextGenerator};
use docbot_schema::QueryResult;
use tokio::sync::OnceCell;

const ANSWER_PREFIXES: &[&str] = &["ANSWER:", "Answer:"];

#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("index not initialized, run `docbot initialize` first ({0})")]
    IndexUnavailable(String),
    #[error("no relevant information found for the query")]
    NoMatch,
    #[error("query took longer than {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RagError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::IndexUnavailable(_) => 400,
            Self::NoMatch => 404,
            Self::Timeout(_) => 504,
            Self::Internal(_) => 500,
        }
    }
}

/// Anything that can turn a question into a [`QueryResult`].
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, query: &str) -> QueryResult;
}

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub timeout: Duration,
    pub top_k: usize,
    /// Characters of retrieved context passed to the model.
    pub context_chars: usize,
    pub generation: GenerationConfig,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            top_k: 1,
            context_chars: 3000,
            generation: GenerationConfig::default(),
        }
    }
}

/// Retrieval-augmented answering over the published index.
///
/// The index is loaded on the first query and kept for the life of the
/// process. A failed load is not remembered, so the next query tries again.
pub struct RagPipeline {
    artifact: IndexArtifact,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    settings: RagSettings,
    index: OnceCell<VectorIndex>,
}

impl RagPipeline {
    pub fn new(
        artifact: IndexArtifact,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
        settings: RagSettings,
    ) -> Self {
        Self {
            artifact,
            embedder,
            generator,
            settings,
            index: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &RagSettings {
        &self.settings
    }

    pub fn is_loaded(&self) -> bool {
        self.index.initialized()
    }

    async fn index(&self) -> Result<&VectorIndex, RagError> {
        self.index
            .get_or_try_init(|| async {
                let path = self
                    .artifact
                    .fetch()
                    .await
                    .map_err(|e| RagError::IndexUnavailable(format!("{e:#}")))?;
                let index = VectorIndex::open(&path)
                    .map_err(|e| RagError::IndexUnavailable(format!("{e:#}")))?;
                tracing::info!(path = %path.display(), "index loaded");
                Ok::<VectorIndex, RagError>(index)
            })
            .await
    }

    async fn run(&self, query: &str) -> Result<(String, String), RagError> {
        let index = self.index().await?;

        let search_started = Instant::now();
        let embedded = self.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = embedded
            .embeddings
            .first()
            .ok_or_else(|| anyhow::anyhow!("embedding provider returned no vector"))?;
        let hits = index.search(query_embedding, self.settings.top_k).await?;
        tracing::debug!(
            hits = hits.len(),
            elapsed_ms = search_started.elapsed().as_millis() as u64,
            "similarity search finished"
        );

        let hit = hits.into_iter().next().ok_or(RagError::NoMatch)?;
        let context = truncate_chars(&hit.chunk.text, self.settings.context_chars);
        let prompt = build_prompt(query, context);

        let generated = self
            .generator
            .generate(&prompt, &self.settings.generation)
            .await?;
        let answer = format!(
            "{}\n\nSource: {}",
            strip_answer_prefix(&generated),
            hit.chunk.source_key
        );
        Ok((answer, hit.chunk.source_key))
    }
}

#[async_trait]
impl Answerer for RagPipeline {
    async fn answer(&self, query: &str) -> QueryResult {
        let started = Instant::now();
        tracing::info!(query, "rag query started");

        let outcome = match tokio::time::timeout(self.settings.timeout, self.run(query)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout(self.settings.timeout)),
        };
        let duration = started.elapsed().as_secs_f64();

        match outcome {
            Ok((answer, source)) => {
                tracing::info!(source = %source, duration, "rag query answered");
                QueryResult::answered(answer, source, duration)
            }
            Err(e) => {
                let status = e.status_code();
                if status == 500 {
                    tracing::error!(error = %format!("{e:#}"), duration, "rag query failed");
                } else {
                    tracing::warn!(status, error = %e, duration, "rag query not answered");
                }
                QueryResult::failed(status, e.to_string(), duration)
            }
        }
    }
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on this legal context, answer directly and objectively:\n\nQUESTION: {query}\n\nCONTEXT:\n{context}\n\nANSWER:"
    )
}

/// Removes a leading `ANSWER:` echo the model sometimes produces.
pub fn strip_answer_prefix(generated: &str) -> &str {
    let mut text = generated.trim();
    for prefix in ANSWER_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim();
        }
    }
    text
}

/// The first `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

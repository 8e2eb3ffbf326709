use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use docbot_provider::EmbeddingProvider;
use docbot_schema::{BuildReport, DocumentChunk};

use crate::artifact::IndexArtifact;
use crate::chunker::{chunk_words, DEFAULT_CHUNK_WORDS};
use crate::extractor::DocumentExtractor;
use crate::normalizer::normalize;
use crate::vector_index::{VectorIndex, DEFAULT_COLLECTION};

/// Chunks embedded per provider call.
const EMBED_BATCH: usize = 16;

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub collection: String,
    pub normalize_text: bool,
    pub chunk_words: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            normalize_text: true,
            chunk_words: DEFAULT_CHUNK_WORDS,
        }
    }
}

/// Turns source documents into a published vector index.
pub struct IndexBuilder {
    extractor: DocumentExtractor,
    embedder: Arc<dyn EmbeddingProvider>,
    artifact: IndexArtifact,
    settings: BuildSettings,
}

impl IndexBuilder {
    pub fn new(
        extractor: DocumentExtractor,
        embedder: Arc<dyn EmbeddingProvider>,
        artifact: IndexArtifact,
        settings: BuildSettings,
    ) -> Self {
        Self {
            extractor,
            embedder,
            artifact,
            settings,
        }
    }

    /// Runs a full build. Never fails: errors end up in the report.
    pub async fn build(&self) -> BuildReport {
        match self.try_build().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "index build failed");
                BuildReport::failed(format!("{e:#}"))
            }
        }
    }

    async fn try_build(&self) -> Result<BuildReport> {
        let documents = self.extractor.extract().await;
        if documents.is_empty() {
            tracing::warn!("no text extracted from documents");
            return Ok(BuildReport::failed("no text extracted"));
        }

        let index_path = self.artifact.local_path();
        let index = VectorIndex::create(&index_path, &self.settings.collection)?;

        let mut total_chunks = 0usize;
        for document in &documents {
            let text = if self.settings.normalize_text {
                normalize(&document.text)
            } else {
                document.text.clone()
            };
            let chunks: Vec<DocumentChunk> = chunk_words(&text, self.settings.chunk_words)
                .into_iter()
                .enumerate()
                .map(|(i, part)| DocumentChunk::new(document.source_key.clone(), i as u32, part))
                .collect();
            tracing::info!(source = %document.source_key, chunks = chunks.len(), "document chunked");

            for batch in chunks.chunks(EMBED_BATCH) {
                let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
                let embedded = self.embedder.embed(&texts).await?;
                if embedded.embeddings.len() != batch.len() {
                    return Err(anyhow!(
                        "embedding count mismatch: expected {}, got {}",
                        batch.len(),
                        embedded.embeddings.len()
                    ));
                }
                for (chunk, embedding) in batch.iter().zip(embedded.embeddings.iter()) {
                    index.upsert(chunk, embedding, &embedded.model).await?;
                }
            }
            total_chunks += chunks.len();
        }

        if total_chunks == 0 {
            return Ok(BuildReport::failed("no text extracted"));
        }
        drop(index);
        tracing::info!(chunks = total_chunks, path = %index_path.display(), "index built");

        let (published, message) = match self.artifact.publish(&index_path).await {
            Ok(true) => (
                true,
                format!("index built and published: {total_chunks} chunks indexed"),
            ),
            Ok(false) => (
                false,
                format!(
                    "index built locally ({total_chunks} chunks) but no index bucket is configured for upload"
                ),
            ),
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "index upload failed");
                (
                    false,
                    format!("index built locally ({total_chunks} chunks) but upload failed: {e:#}"),
                )
            }
        };

        Ok(BuildReport {
            status: true,
            chunks_indexed: Some(total_chunks),
            documents: documents.len(),
            published,
            message,
            error: None,
            finished_at: Utc::now(),
        })
    }
}

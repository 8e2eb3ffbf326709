use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    BedrockRuntime, EmbeddingProvider, EmbeddingResult, GenerationConfig, TextGenerator,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_TEXT_MODEL,
};

/// Titan v2 accepts 256, 512 or 1024.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1024;

#[derive(Debug, Clone)]
pub struct TitanEmbeddingProvider {
    runtime: BedrockRuntime,
    model: String,
    dimensions: usize,
}

impl TitanEmbeddingProvider {
    pub fn new(runtime: BedrockRuntime) -> Self {
        Self::with_model(runtime, DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_DIMENSIONS)
    }

    pub fn with_model(runtime: BedrockRuntime, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            runtime,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TitanEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        // Titan embeds a single input per invocation.
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let request = TitanEmbeddingRequest {
                input_text: text,
                dimensions: self.dimensions,
                normalize: true,
            };
            let response: TitanEmbeddingResponse =
                self.runtime.invoke(&self.model, &request).await?;
            if response.embedding.len() != self.dimensions {
                return Err(anyhow!(
                    "embedding dimensions mismatch: expected {}, got {}",
                    self.dimensions,
                    response.embedding.len()
                ));
            }
            embeddings.push(response.embedding);
        }

        Ok(EmbeddingResult {
            embeddings,
            model: self.model.clone(),
            dimensions: self.dimensions,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Debug, Clone)]
pub struct TitanTextGenerator {
    runtime: BedrockRuntime,
    model: String,
}

impl TitanTextGenerator {
    pub fn new(runtime: BedrockRuntime) -> Self {
        Self::with_model(runtime, DEFAULT_TEXT_MODEL)
    }

    pub fn with_model(runtime: BedrockRuntime, model: impl Into<String>) -> Self {
        Self {
            runtime,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for TitanTextGenerator {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let request = TitanTextRequest {
            input_text: prompt,
            text_generation_config: config,
        };
        let response: TitanTextResponse = self.runtime.invoke(&self.model, &request).await?;
        let first = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("bedrock returned no results for {}", self.model))?;
        tracing::debug!(
            model = %self.model,
            tokens = first.token_count,
            completion = first.completion_reason.as_deref().unwrap_or("unknown"),
            "text generated"
        );
        Ok(first.output_text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TitanEmbeddingRequest<'a> {
    pub input_text: &'a str,
    pub dimensions: usize,
    pub normalize: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TitanEmbeddingResponse {
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TitanTextRequest<'a> {
    pub input_text: &'a str,
    pub text_generation_config: &'a GenerationConfig,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TitanTextResponse {
    #[serde(default)]
    pub results: Vec<TitanTextResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TitanTextResult {
    pub output_text: String,
    #[serde(default)]
    pub token_count: Option<u32>,
    #[serde(default)]
    pub completion_reason: Option<String>,
}

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::{EmbeddingProvider, EmbeddingResult, GenerationConfig, TextGenerator};

/// Deterministic hash-based vectors, for tests and offline runs.
#[derive(Debug, Clone)]
pub struct StubEmbeddingProvider {
    dims: usize,
}

impl StubEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn hash_to_unit_range(text: &str, index: usize) -> f32 {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(index.to_le_bytes());
        let hash = hasher.finalize();
        let value = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]);
        (value as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let embeddings = texts
            .iter()
            .map(|text| {
                (0..self.dims)
                    .map(|index| Self::hash_to_unit_range(text, index))
                    .collect::<Vec<f32>>()
            })
            .collect::<Vec<Vec<f32>>>();

        Ok(EmbeddingResult {
            embeddings,
            model: "stub".to_string(),
            dimensions: self.dims,
        })
    }

    fn model_id(&self) -> &str {
        "stub"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn is_semantic(&self) -> bool {
        false
    }
}

/// Echoes the prompt length back, prefixed the way Titan sometimes does.
#[derive(Debug, Clone, Default)]
pub struct StubTextGenerator;

#[async_trait]
impl TextGenerator for StubTextGenerator {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        Ok(format!(
            "Answer: [stub] prompt of {} chars (max {} tokens)",
            prompt.chars().count(),
            config.max_token_count
        ))
    }

    fn model_id(&self) -> &str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_embeddings_are_deterministic() {
        let provider = StubEmbeddingProvider::new(6);
        let inputs = vec!["same input".to_string()];
        let a = provider.embed(&inputs).await.unwrap();
        let b = provider.embed(&inputs).await.unwrap();
        assert_eq!(a.embeddings, b.embeddings);
        assert_eq!(a.embeddings[0].len(), 6);
        assert!(a.embeddings[0].iter().all(|v| (-1.0..=1.0).contains(v)));
        assert!(!provider.is_semantic());
    }

    #[tokio::test]
    async fn stub_generator_reports_prompt_size() {
        let out = StubTextGenerator
            .generate("abc", &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(out, "Answer: [stub] prompt of 3 chars (max 400 tokens)");
    }
}

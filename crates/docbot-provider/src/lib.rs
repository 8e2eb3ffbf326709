pub mod bedrock;
pub mod stub;
pub mod titan;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use bedrock::BedrockRuntime;
pub use stub::{StubEmbeddingProvider, StubTextGenerator};
pub use titan::{TitanEmbeddingProvider, TitanTextGenerator};

pub const DEFAULT_EMBEDDING_MODEL: &str = "amazon.titan-embed-text-v2:0";
pub const DEFAULT_TEXT_MODEL: &str = "amazon.titan-text-express-v1";

#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
    pub dimensions: usize,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult>;
    fn model_id(&self) -> &str;
    fn dimensions(&self) -> usize;
    /// False for stub providers whose vectors carry no meaning.
    fn is_semantic(&self) -> bool {
        true
    }
}

/// Sampling parameters sent with every text generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub max_token_count: u32,
    pub temperature: f32,
    pub top_p: f32,
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_token_count: 400,
            temperature: 0.1,
            top_p: 0.9,
            stop_sequences: Vec::new(),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_config_serializes_camel_case() {
        let value = serde_json::to_value(GenerationConfig::default()).unwrap();
        assert_eq!(value["maxTokenCount"], 400);
        assert_eq!(value["stopSequences"], serde_json::json!([]));
        assert!((value["topP"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!((value["temperature"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }
}

use std::sync::Arc;

use anyhow::Result;
use docbot_auth::AwsCredentials;
use docbot_channels::TelegramMessenger;
use docbot_core::{
    AppConfig, DebugInfo, DispatchSettings, Dispatcher, ModelBackend, RagPipeline, RagSettings,
    StoreBackend, SystemBootstrap,
};
use docbot_index::{BuildSettings, DocumentExtractor, ExtractorSettings, IndexArtifact, IndexBuilder};
use docbot_provider::{
    BedrockRuntime, EmbeddingProvider, GenerationConfig, StubEmbeddingProvider, StubTextGenerator,
    TextGenerator, TitanEmbeddingProvider, TitanTextGenerator,
};
use docbot_storage::{FsObjectStore, ObjectStore, S3ObjectStore};

/// Long-lived collaborators built once from the configuration.
pub struct Components {
    pub config: AppConfig,
    pub store: Arc<dyn ObjectStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn TextGenerator>,
}

impl Components {
    pub fn from_config(config: AppConfig) -> Self {
        let credentials = match AwsCredentials::from_env() {
            Ok(creds) => Some(creds),
            Err(e) => {
                tracing::debug!(error = %e, "aws credentials unavailable");
                None
            }
        };

        let store: Arc<dyn ObjectStore> = match config.storage.backend {
            StoreBackend::S3 => Arc::new(S3ObjectStore::new(
                config.aws.region.clone(),
                config.aws.s3_endpoint.clone(),
                credentials.clone(),
            )),
            StoreBackend::Fs => Arc::new(FsObjectStore::new(config.storage.root.clone())),
        };

        let (embedder, generator): (Arc<dyn EmbeddingProvider>, Arc<dyn TextGenerator>) =
            match config.models.backend {
                ModelBackend::Bedrock => {
                    let runtime = BedrockRuntime::new(
                        config.aws.region.clone(),
                        config.aws.bedrock_endpoint.clone(),
                        credentials,
                    );
                    (
                        Arc::new(TitanEmbeddingProvider::with_model(
                            runtime.clone(),
                            config.models.embedding_model.clone(),
                            config.models.embedding_dimensions,
                        )),
                        Arc::new(TitanTextGenerator::with_model(
                            runtime,
                            config.models.text_model.clone(),
                        )),
                    )
                }
                ModelBackend::Stub => {
                    tracing::warn!("using stub models, answers will not be meaningful");
                    (
                        Arc::new(StubEmbeddingProvider::new(config.models.embedding_dimensions)),
                        Arc::new(StubTextGenerator),
                    )
                }
            };

        tracing::info!(
            store = %store.describe(),
            embedding_model = embedder.model_id(),
            text_model = generator.model_id(),
            "components ready"
        );

        Self {
            config,
            store,
            embedder,
            generator,
        }
    }

    pub fn artifact(&self) -> IndexArtifact {
        IndexArtifact::new(
            Arc::clone(&self.store),
            self.config.storage.embedding_bucket.clone(),
            self.config.storage.embeddings_key.clone(),
            self.config.index.cache_dir.clone(),
        )
    }

    pub fn index_builder(&self) -> IndexBuilder {
        let index = &self.config.index;
        let extractor = DocumentExtractor::new(
            Arc::clone(&self.store),
            ExtractorSettings {
                bucket: self.config.storage.pdf_bucket.clone(),
                folder: self.config.storage.pdf_folder.clone(),
                local_dataset_dir: index.local_dataset_dir.clone(),
                scratch_dir: index.cache_dir.join("documents"),
                max_documents: index.max_documents,
            },
        );
        IndexBuilder::new(
            extractor,
            Arc::clone(&self.embedder),
            self.artifact(),
            BuildSettings {
                collection: index.collection.clone(),
                normalize_text: index.normalize_text,
                chunk_words: index.chunk_words,
            },
        )
    }

    pub fn rag_pipeline(&self) -> RagPipeline {
        RagPipeline::new(
            self.artifact(),
            Arc::clone(&self.embedder),
            Arc::clone(&self.generator),
            RagSettings {
                timeout: self.config.rag.timeout(),
                top_k: 1,
                context_chars: self.config.rag.context_chars,
                generation: GenerationConfig::default(),
            },
        )
    }

    pub fn buckets(&self) -> Vec<String> {
        let storage = &self.config.storage;
        [storage.pdf_bucket.clone(), storage.embedding_bucket.clone()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn bootstrap(&self) -> SystemBootstrap {
        SystemBootstrap::new(
            Arc::clone(&self.store),
            self.buckets(),
            self.index_builder(),
            Arc::new(self.rag_pipeline()),
        )
    }

    pub fn dispatcher(&self) -> Result<Dispatcher> {
        let telegram = &self.config.telegram;
        if telegram.bot_token.trim().is_empty() {
            tracing::warn!("TELEGRAM_BOT_TOKEN is not set, replies will fail");
        }
        let mut messenger = TelegramMessenger::new(telegram.bot_token.clone());
        if let Some(url) = telegram.api_url.as_deref() {
            messenger = messenger.with_api_url(url)?;
        }

        Ok(Dispatcher::new(
            Arc::new(messenger),
            Arc::new(self.rag_pipeline()),
            DispatchSettings {
                processing_timeout: self.config.rag.processing_timeout(),
                debug_info: DebugInfo {
                    pdf_bucket: self.config.storage.pdf_bucket.clone(),
                    embedding_bucket: self.config.storage.embedding_bucket.clone(),
                    region: self.config.aws.region.clone(),
                    cache_dir: self.config.index.cache_dir.clone(),
                    store: self.store.describe(),
                },
            },
        ))
    }
}

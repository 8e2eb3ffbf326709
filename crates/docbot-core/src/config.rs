use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docbot_provider::{DEFAULT_EMBEDDING_MODEL, DEFAULT_TEXT_MODEL};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    S3,
    Fs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    Bedrock,
    Stub,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_pdf_folder() -> String {
    "dataset/documents/".to_string()
}

fn default_embeddings_key() -> String {
    "embeddings/index".to_string()
}

fn default_store_root() -> PathBuf {
    PathBuf::from("/tmp/docbot/store")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/docbot")
}

fn default_local_dataset_dir() -> PathBuf {
    PathBuf::from("dataset")
}

fn default_true() -> bool {
    true
}

fn default_max_documents() -> usize {
    5
}

fn default_chunk_words() -> usize {
    800
}

fn default_collection() -> String {
    "legal_documents".to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_text_model() -> String {
    DEFAULT_TEXT_MODEL.to_string()
}

fn default_embedding_dimensions() -> usize {
    1024
}

fn default_rag_timeout_secs() -> u64 {
    10
}

fn default_processing_timeout_secs() -> u64 {
    15
}

fn default_context_chars() -> usize {
    3000
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub bedrock_endpoint: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            s3_endpoint: None,
            bedrock_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,
    /// Root directory of the filesystem backend.
    #[serde(default = "default_store_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub pdf_bucket: Option<String>,
    #[serde(default = "default_pdf_folder")]
    pub pdf_folder: String,
    #[serde(default)]
    pub embedding_bucket: Option<String>,
    #[serde(default = "default_embeddings_key")]
    pub embeddings_key: String,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::S3
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            root: default_store_root(),
            pdf_bucket: None,
            pdf_folder: default_pdf_folder(),
            embedding_bucket: None,
            embeddings_key: default_embeddings_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_local_dataset_dir")]
    pub local_dataset_dir: PathBuf,
    #[serde(default = "default_true")]
    pub normalize_text: bool,
    #[serde(default = "default_max_documents")]
    pub max_documents: usize,
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            local_dataset_dir: default_local_dataset_dir(),
            normalize_text: true,
            max_documents: default_max_documents(),
            chunk_words: default_chunk_words(),
            collection: default_collection(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model_backend")]
    pub backend: ModelBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: usize,
    #[serde(default = "default_text_model")]
    pub text_model: String,
}

fn default_model_backend() -> ModelBackend {
    ModelBackend::Bedrock
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            backend: default_model_backend(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            text_model: default_text_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_rag_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_rag_timeout_secs(),
            processing_timeout_secs: default_processing_timeout_secs(),
            context_chars: default_context_chars(),
        }
    }
}

impl RagConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "BIND_ADDR",
                value: self.bind_addr.clone(),
            })
    }
}

/// Complete runtime configuration. Every section has defaults so an empty
/// file (or no file at all) is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Loads the optional YAML file, resolves `${VAR}` placeholders and
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let env = |key: &str| std::env::var(key).ok();
        config.resolve_placeholders(&env);
        config.apply_overrides(env)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Expands `${VAR}` and `${VAR:-fallback}` in string fields read from the file.
    pub fn resolve_placeholders<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for field in [
            &mut self.telegram.bot_token,
            &mut self.aws.region,
            &mut self.storage.pdf_folder,
            &mut self.storage.embeddings_key,
            &mut self.models.embedding_model,
            &mut self.models.text_model,
            &mut self.server.bind_addr,
        ] {
            *field = expand_placeholders(field.as_str(), lookup);
        }
        for field in [
            &mut self.telegram.api_url,
            &mut self.aws.s3_endpoint,
            &mut self.aws.bedrock_endpoint,
            &mut self.storage.pdf_bucket,
            &mut self.storage.embedding_bucket,
        ] {
            expand_optional(field, lookup);
        }
    }

    /// Environment variables win over file values. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("TELEGRAM_API_URL") {
            self.telegram.api_url = Some(v);
        }
        if let Some(v) = get("AWS_DEFAULT_REGION") {
            self.aws.region = v;
        }
        if let Some(v) = get("S3_ENDPOINT") {
            self.aws.s3_endpoint = Some(v);
        }
        if let Some(v) = get("BEDROCK_ENDPOINT") {
            self.aws.bedrock_endpoint = Some(v);
        }
        if let Some(v) = get("STORE_BACKEND") {
            self.storage.backend = match v.to_ascii_lowercase().as_str() {
                "s3" => StoreBackend::S3,
                "fs" => StoreBackend::Fs,
                _ => return Err(ConfigError::InvalidValue { key: "STORE_BACKEND", value: v }),
            };
        }
        if let Some(v) = get("STORE_ROOT") {
            self.storage.root = PathBuf::from(v);
        }
        if let Some(v) = get("PDF_BUCKET_NAME") {
            self.storage.pdf_bucket = Some(v);
        }
        if let Some(v) = get("PDF_FOLDER") {
            self.storage.pdf_folder = v;
        }
        if let Some(v) = get("EMBEDDING_BUCKET_NAME") {
            self.storage.embedding_bucket = Some(v);
        }
        if let Some(v) = get("EMBEDDINGS_KEY") {
            self.storage.embeddings_key = v;
        }
        if let Some(v) = get("CACHE_DIR") {
            self.index.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = get("LOCAL_DATASET_DIR") {
            self.index.local_dataset_dir = PathBuf::from(v);
        }
        if let Some(v) = get("NORMALIZE_TEXT") {
            self.index.normalize_text = parse_bool("NORMALIZE_TEXT", v)?;
        }
        if let Some(v) = get("MODEL_BACKEND") {
            self.models.backend = match v.to_ascii_lowercase().as_str() {
                "bedrock" => ModelBackend::Bedrock,
                "stub" => ModelBackend::Stub,
                _ => return Err(ConfigError::InvalidValue { key: "MODEL_BACKEND", value: v }),
            };
        }
        if let Some(v) = get("EMBEDDING_MODEL_ID") {
            self.models.embedding_model = v;
        }
        if let Some(v) = get("TEXT_MODEL_ID") {
            self.models.text_model = v;
        }
        if let Some(v) = get("RAG_TIMEOUT") {
            self.rag.timeout_secs = parse_secs("RAG_TIMEOUT", v)?;
        }
        if let Some(v) = get("PROCESSING_TIMEOUT") {
            self.rag.processing_timeout_secs = parse_secs("PROCESSING_TIMEOUT", v)?;
        }
        if let Some(v) = get("BIND_ADDR") {
            self.server.bind_addr = v;
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

fn parse_secs(key: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

/// Blank after expansion means unset.
fn expand_optional<F>(value: &mut Option<String>, lookup: &F)
where
    F: Fn(&str) -> Option<String>,
{
    *value = value
        .take()
        .map(|raw| expand_placeholders(&raw, lookup))
        .filter(|v| !v.trim().is_empty());
}

/// Unset variables without a fallback expand to nothing; an unterminated
/// `${` is kept verbatim.
pub fn expand_placeholders<F>(raw: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(raw.len());
    let mut remaining = raw;

    while let Some(open) = remaining.find("${") {
        let (before, after_open) = remaining.split_at(open);
        expanded.push_str(before);

        let Some((expr, after_close)) = after_open[2..].split_once('}') else {
            expanded.push_str(after_open);
            return expanded;
        };
        let (name, fallback) = match expr.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (expr, None),
        };
        match lookup(name.trim()).filter(|v| !v.is_empty()) {
            Some(value) => expanded.push_str(&value),
            None => expanded.push_str(fallback.unwrap_or_default()),
        }
        remaining = after_close;
    }

    expanded.push_str(remaining);
    expanded
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.aws.region, "us-east-1");
        assert_eq!(config.storage.pdf_folder, "dataset/documents/");
        assert_eq!(config.storage.embeddings_key, "embeddings/index");
        assert_eq!(config.index.cache_dir, PathBuf::from("/tmp/docbot"));
        assert_eq!(config.rag.timeout(), Duration::from_secs(10));
        assert_eq!(config.rag.processing_timeout(), Duration::from_secs(15));
        assert_eq!(config.models.text_model, "amazon.titan-text-express-v1");
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert!(config.index.normalize_text);
    }

    #[test]
    fn empty_yaml_is_default() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config.index.collection, "legal_documents");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = AppConfig::from_yaml(
            "storage:\n  backend: fs\n  pdf_bucket: docs\nrag:\n  timeout_secs: 3\n",
        )
        .unwrap();
        assert_eq!(config.storage.backend, StoreBackend::Fs);
        assert_eq!(config.storage.pdf_bucket.as_deref(), Some("docs"));
        assert_eq!(config.rag.timeout_secs, 3);
        assert_eq!(config.rag.processing_timeout_secs, 15);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AppConfig::from_yaml("aws:\n  region: eu-west-1\n").unwrap();
        config
            .apply_overrides(lookup_from(&[
                ("AWS_DEFAULT_REGION", "sa-east-1"),
                ("PDF_BUCKET_NAME", "pdfs"),
                ("EMBEDDING_BUCKET_NAME", "emb"),
                ("RAG_TIMEOUT", "4"),
                ("NORMALIZE_TEXT", "false"),
                ("STORE_BACKEND", "FS"),
                ("MODEL_BACKEND", "stub"),
                ("CACHE_DIR", ""),
            ]))
            .unwrap();
        assert_eq!(config.aws.region, "sa-east-1");
        assert_eq!(config.storage.pdf_bucket.as_deref(), Some("pdfs"));
        assert_eq!(config.storage.embedding_bucket.as_deref(), Some("emb"));
        assert_eq!(config.rag.timeout_secs, 4);
        assert!(!config.index.normalize_text);
        assert_eq!(config.storage.backend, StoreBackend::Fs);
        assert_eq!(config.models.backend, ModelBackend::Stub);
        assert_eq!(config.index.cache_dir, PathBuf::from("/tmp/docbot"));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup_from(&[("RAG_TIMEOUT", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("RAG_TIMEOUT"));

        let err = config
            .apply_overrides(lookup_from(&[("STORE_BACKEND", "gcs")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "STORE_BACKEND", .. }));
    }

    #[test]
    fn bind_addr_must_parse() {
        let mut config = AppConfig::default();
        assert!(config.server.socket_addr().is_ok());
        config.server.bind_addr = "nowhere".into();
        assert!(config.server.socket_addr().is_err());
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = AppConfig::from_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn file_with_bad_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docbot.yaml");
        std::fs::write(&path, "rag: [unclosed").unwrap();
        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn placeholders_expand_from_lookup() {
        let lookup = lookup_from(&[("BOT_TOKEN", "123:abc")]);
        assert_eq!(expand_placeholders("${BOT_TOKEN}", &lookup), "123:abc");
        assert_eq!(expand_placeholders("t=${ BOT_TOKEN }!", &lookup), "t=123:abc!");
    }

    #[test]
    fn placeholder_fallback_applies_when_unset() {
        let lookup = lookup_from(&[]);
        assert_eq!(
            expand_placeholders("${AWS_REGION:-us-east-1}", &lookup),
            "us-east-1"
        );
        assert_eq!(expand_placeholders("val=${MISSING}", &lookup), "val=");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        let lookup = lookup_from(&[("UNCLOSED", "x")]);
        assert_eq!(
            expand_placeholders("prefix_${UNCLOSED", &lookup),
            "prefix_${UNCLOSED"
        );
    }

    #[test]
    fn unresolved_optional_placeholder_becomes_none() {
        let mut value = Some("${DOCBOT_NONEXISTENT_VAR_XYZ}".to_string());
        expand_optional(&mut value, &lookup_from(&[]));
        assert!(value.is_none());
    }

    #[test]
    fn file_placeholders_use_the_same_lookup_as_overrides() {
        let mut config = AppConfig::from_yaml(
            "telegram:\n  bot_token: \"${TG_TOKEN}\"\nstorage:\n  embedding_bucket: \"${EMB_BUCKET:-}\"\n",
        )
        .unwrap();
        config.resolve_placeholders(&lookup_from(&[("TG_TOKEN", "42:xyz")]));
        assert_eq!(config.telegram.bot_token, "42:xyz");
        assert!(config.storage.embedding_bucket.is_none());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use docbot_storage::ObjectStore;
use tokio::task;

pub const DEFAULT_MAX_DOCUMENTS: usize = 5;
const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Bucket holding source documents. Without one only the local dataset is read.
    pub bucket: Option<String>,
    pub folder: String,
    pub local_dataset_dir: PathBuf,
    /// Downloads land here and are removed after extraction.
    pub scratch_dir: PathBuf,
    pub max_documents: usize,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            folder: "dataset/documents/".to_string(),
            local_dataset_dir: PathBuf::from("dataset"),
            scratch_dir: std::env::temp_dir().join("docbot-docs"),
            max_documents: DEFAULT_MAX_DOCUMENTS,
        }
    }
}

/// Plain text pulled out of one source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub source_key: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    Remote(String),
    Local(PathBuf),
}

pub struct DocumentExtractor {
    store: Arc<dyn ObjectStore>,
    settings: ExtractorSettings,
}

impl DocumentExtractor {
    pub fn new(store: Arc<dyn ObjectStore>, settings: ExtractorSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Extracts up to `max_documents` documents. Individual failures are
    /// logged and skipped; an empty result means nothing was readable.
    pub async fn extract(&self) -> Vec<ExtractedDocument> {
        let candidates = self.discover().await;
        if candidates.is_empty() {
            tracing::warn!("no documents found to extract");
            return Vec::new();
        }

        let mut documents = Vec::new();
        for candidate in candidates.into_iter().take(self.settings.max_documents) {
            let source_key = match &candidate {
                Candidate::Remote(key) => key.clone(),
                Candidate::Local(path) => path.to_string_lossy().into_owned(),
            };
            match self.extract_one(&candidate).await {
                Ok(text) if text.trim().is_empty() => {
                    tracing::warn!(source = %source_key, "document yielded no text");
                }
                Ok(text) => {
                    tracing::info!(source = %source_key, chars = text.len(), "document extracted");
                    documents.push(ExtractedDocument { source_key, text });
                }
                Err(e) => {
                    tracing::error!(source = %source_key, error = %format!("{e:#}"), "failed to extract document");
                }
            }
        }
        documents
    }

    async fn discover(&self) -> Vec<Candidate> {
        if let Some(bucket) = self.settings.bucket.as_deref() {
            match self.store.list(bucket, &self.settings.folder).await {
                Ok(keys) => {
                    let remote: Vec<Candidate> = keys
                        .into_iter()
                        .filter(|k| is_supported(Path::new(k)))
                        .map(Candidate::Remote)
                        .collect();
                    tracing::info!(bucket, count = remote.len(), "documents listed in store");
                    if !remote.is_empty() {
                        return remote;
                    }
                }
                Err(e) => tracing::error!(bucket, error = %e, "failed to list documents"),
            }
        }

        match walk_local(&self.settings.local_dataset_dir).await {
            Ok(paths) => {
                tracing::info!(
                    dir = %self.settings.local_dataset_dir.display(),
                    count = paths.len(),
                    "using local dataset"
                );
                paths.into_iter().map(Candidate::Local).collect()
            }
            Err(e) => {
                tracing::debug!(error = %e, "local dataset unavailable");
                Vec::new()
            }
        }
    }

    async fn extract_one(&self, candidate: &Candidate) -> Result<String> {
        match candidate {
            Candidate::Local(path) => extract_file_blocking(path.clone()).await,
            Candidate::Remote(key) => {
                let bucket = self
                    .settings
                    .bucket
                    .as_deref()
                    .ok_or_else(|| anyhow!("remote document without a bucket"))?;
                let file_name = Path::new(key)
                    .file_name()
                    .ok_or_else(|| anyhow!("object key has no file name: {key}"))?;
                let local = self.settings.scratch_dir.join(file_name);

                self.store.download(bucket, key, &local).await?;
                let result = extract_file_blocking(local.clone()).await;
                if let Err(e) = tokio::fs::remove_file(&local).await {
                    tracing::debug!(path = %local.display(), error = %e, "failed to remove scratch file");
                }
                result
            }
        }
    }
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

async fn extract_file_blocking(path: PathBuf) -> Result<String> {
    task::spawn_blocking(move || extract_file(&path)).await?
}

/// Reads the text of a PDF, `.txt` or `.md` file.
pub fn extract_file(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => extract_pdf_text(path),
        "txt" | "md" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        other => Err(anyhow!("unsupported document type '{other}': {}", path.display())),
    }
}

fn extract_pdf_text(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("failed to load PDF {}", path.display()))?;

    let mut text = String::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), page = page_number, error = %e, "skipping unreadable page");
            }
        }
    }
    Ok(text)
}

async fn walk_local(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("failed to read {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if is_supported(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use docbot_storage::FsObjectStore;

    use super::*;

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported(Path::new("a/B.PDF")));
        assert!(is_supported(Path::new("notes.md")));
        assert!(!is_supported(Path::new("image.png")));
        assert!(!is_supported(Path::new("folder/")));
    }

    #[tokio::test]
    async fn reads_from_store_and_cleans_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsObjectStore::new(dir.path().join("store")));
        let doc = dir.path().join("doc1.txt");
        tokio::fs::write(&doc, "texto do documento").await.unwrap();
        store.upload(&doc, "pdfs", "dataset/documents/doc1.txt").await.unwrap();

        let scratch = dir.path().join("scratch");
        let extractor = DocumentExtractor::new(
            store,
            ExtractorSettings {
                bucket: Some("pdfs".into()),
                local_dataset_dir: dir.path().join("nope"),
                scratch_dir: scratch.clone(),
                ..ExtractorSettings::default()
            },
        );

        let docs = extractor.extract().await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_key, "dataset/documents/doc1.txt");
        assert_eq!(docs[0].text, "texto do documento");
        assert!(!scratch.join("doc1.txt").exists());
    }

    #[tokio::test]
    async fn falls_back_to_local_dataset_and_caps_count() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dataset").join("sub");
        tokio::fs::create_dir_all(&dataset).await.unwrap();
        for i in 0..7 {
            tokio::fs::write(dataset.join(format!("doc{i}.txt")), format!("conteúdo {i}"))
                .await
                .unwrap();
        }
        tokio::fs::write(dataset.join("skip.png"), b"png").await.unwrap();

        let extractor = DocumentExtractor::new(
            Arc::new(FsObjectStore::new(dir.path().join("store"))),
            ExtractorSettings {
                bucket: Some("empty-bucket".into()),
                local_dataset_dir: dir.path().join("dataset"),
                scratch_dir: dir.path().join("scratch"),
                ..ExtractorSettings::default()
            },
        );

        let docs = extractor.extract().await;
        assert_eq!(docs.len(), DEFAULT_MAX_DOCUMENTS);
        assert!(docs[0].source_key.ends_with("doc0.txt"));
    }

    #[tokio::test]
    async fn blank_documents_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dataset");
        tokio::fs::create_dir_all(&dataset).await.unwrap();
        tokio::fs::write(dataset.join("blank.txt"), "   \n").await.unwrap();

        let extractor = DocumentExtractor::new(
            Arc::new(FsObjectStore::new(dir.path().join("store"))),
            ExtractorSettings {
                local_dataset_dir: dataset,
                ..ExtractorSettings::default()
            },
        );
        assert!(extractor.extract().await.is_empty());
    }

    #[test]
    fn unsupported_file_is_an_error() {
        assert!(extract_file(Path::new("x.docx")).is_err());
    }
}

use std::path::Path;
use std::sync::Arc;

use docbot_core::{RagPipeline, RagSettings, SystemBootstrap};
use docbot_index::{BuildSettings, DocumentExtractor, ExtractorSettings, IndexArtifact, IndexBuilder};
use docbot_provider::{StubEmbeddingProvider, StubTextGenerator};
use docbot_storage::{FsObjectStore, ObjectStore};

const PROSE: &str = "O recurso especial discute a competência da justiça federal para julgar o caso. \
A turma entendeu que a matéria exige reexame de provas e não pode ser conhecida.";

fn bootstrap(root: &Path, buckets: Vec<String>) -> SystemBootstrap {
    let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(root.join("store")));
    let artifact = IndexArtifact::new(
        Arc::clone(&store),
        Some("emb".into()),
        "embeddings/index",
        root.join("cache"),
    );
    let extractor = DocumentExtractor::new(
        Arc::clone(&store),
        ExtractorSettings {
            bucket: Some("pdfs".into()),
            local_dataset_dir: root.join("dataset"),
            scratch_dir: root.join("scratch"),
            ..ExtractorSettings::default()
        },
    );
    let embedder = Arc::new(StubEmbeddingProvider::new(8));
    let builder = IndexBuilder::new(
        extractor,
        embedder.clone(),
        artifact.clone(),
        BuildSettings::default(),
    );
    let pipeline = RagPipeline::new(
        artifact,
        embedder,
        Arc::new(StubTextGenerator),
        RagSettings::default(),
    );
    SystemBootstrap::new(store, buckets, builder, Arc::new(pipeline))
}

#[tokio::test]
async fn initialize_builds_index_and_runs_smoke_query() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = dir.path().join("dataset");
    std::fs::create_dir_all(&dataset).unwrap();
    std::fs::write(dataset.join("doc1.txt"), PROSE).unwrap();

    let report = bootstrap(dir.path(), vec!["pdfs".into(), "emb".into()])
        .run()
        .await;

    assert!(report.success, "{report:?}");
    assert_eq!(report.buckets.get("pdfs"), Some(&true));
    assert_eq!(report.buckets.get("emb"), Some(&true));
    assert!(report.build.published);
    let smoke = report.smoke_test.unwrap();
    assert_eq!(smoke.status_code, 200);
    assert!(dir.path().join("store/emb/embeddings/index/index.sqlite3").exists());
}

#[tokio::test]
async fn initialize_without_documents_skips_smoke_query() {
    let dir = tempfile::tempdir().unwrap();

    let report = bootstrap(dir.path(), vec!["pdfs".into()]).run().await;

    assert!(!report.success);
    assert!(!report.build.status);
    assert!(report.smoke_test.is_none());
    assert_eq!(report.message, "system initialization finished with errors");
}

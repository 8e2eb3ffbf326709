use std::collections::BTreeMap;
use std::sync::Arc;

use docbot_index::IndexBuilder;
use docbot_schema::{BuildReport, QueryResult};
use docbot_storage::ObjectStore;
use serde::Serialize;

use crate::pipeline::Answerer;

/// Question used to check the freshly built index end to end.
pub const SMOKE_QUERY: &str = "O que é um recurso especial?";

/// Outcome of `docbot initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub success: bool,
    pub message: String,
    /// Bucket name to whether it exists (or could be created).
    pub buckets: BTreeMap<String, bool>,
    pub build: BuildReport,
    pub smoke_test: Option<QueryResult>,
}

/// One-shot maintenance flow: buckets, index build, smoke query.
pub struct SystemBootstrap {
    store: Arc<dyn ObjectStore>,
    buckets: Vec<String>,
    builder: IndexBuilder,
    answerer: Arc<dyn Answerer>,
}

impl SystemBootstrap {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        buckets: Vec<String>,
        builder: IndexBuilder,
        answerer: Arc<dyn Answerer>,
    ) -> Self {
        Self {
            store,
            buckets,
            builder,
            answerer,
        }
    }

    pub async fn ensure_buckets(&self) -> BTreeMap<String, bool> {
        let mut status = BTreeMap::new();
        for bucket in &self.buckets {
            let ok = self.store.bucket_exists_or_create(bucket).await;
            if ok {
                tracing::info!(bucket = %bucket, "bucket ready");
            } else {
                tracing::error!(bucket = %bucket, "bucket unavailable");
            }
            status.insert(bucket.clone(), ok);
        }
        status
    }

    pub async fn run(&self) -> InitReport {
        tracing::info!("starting system initialization");

        let buckets = self.ensure_buckets().await;
        let build = self.builder.build().await;

        let smoke_test = if build.status {
            let result = self.answerer.answer(SMOKE_QUERY).await;
            if result.is_success() {
                tracing::info!(duration = result.duration, "smoke query answered");
            } else {
                tracing::warn!(status = result.status_code, "smoke query failed");
            }
            Some(result)
        } else {
            None
        };

        let success = buckets.values().all(|ok| *ok)
            && build.status
            && smoke_test.as_ref().is_some_and(QueryResult::is_success);
        let message = if success {
            "system initialization finished".to_string()
        } else {
            "system initialization finished with errors".to_string()
        };
        tracing::info!(success, "{message}");

        InitReport {
            success,
            message,
            buckets,
            build,
            smoke_test,
        }
    }
}

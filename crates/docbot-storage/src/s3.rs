use std::path::Path;

use async_trait::async_trait;
use docbot_auth::{AwsCredentials, RequestSigner, SigningProfile};
use reqwest::{Method, StatusCode};

use crate::staging::persist_verified;
use crate::{ObjectStore, RetryPolicy, StoreError};

/// S3 REST client, path-style addressing, SigV4 signed when credentials exist.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: reqwest::Client,
    endpoint: String,
    region: String,
    signer: Option<RequestSigner>,
    retry: RetryPolicy,
}

impl S3ObjectStore {
    pub fn new(
        region: impl Into<String>,
        endpoint: Option<String>,
        credentials: Option<AwsCredentials>,
    ) -> Self {
        let region = region.into();
        let endpoint = endpoint
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));
        let signer = credentials
            .map(|creds| RequestSigner::new(creds, region.clone(), SigningProfile::S3));
        if signer.is_none() {
            tracing::warn!("no AWS credentials found, S3 requests will be unsigned");
        }
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region,
            signer,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.endpoint, urlencoding::encode(bucket))
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.bucket_url(bucket), encoded_key)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, StoreError> {
        let mut request = self.client.request(method.clone(), url);
        if let Some(signer) = &self.signer {
            let signed = signer
                .sign(method.as_str(), url, &[], &body)
                .map_err(|e| StoreError::Signing(format!("{e:#}")))?;
            for (name, value) in signed {
                request = request.header(name, value);
            }
        }
        if !body.is_empty() {
            request = request.body(body);
        }
        Ok(request.send().await?)
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let mut url = format!(
            "{}?list-type=2&prefix={}",
            self.bucket_url(bucket),
            urlencoding::encode(prefix)
        );
        if let Some(token) = token {
            url.push_str("&continuation-token=");
            url.push_str(&urlencoding::encode(&token));
        }

        let resp = self.send(Method::GET, &url, Vec::new()).await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(http_error("list", status, text));
        }
        Ok(ListPage::parse(&text))
    }

    async fn download_once(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StoreError> {
        let resp = self
            .send(Method::GET, &self.object_url(bucket, key), Vec::new())
            .await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(http_error("download", status, text));
        }
        let bytes = resp.bytes().await?;
        persist_verified(local_path, bytes.to_vec()).await
    }

    async fn upload_once(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StoreError> {
        let body = tokio::fs::read(local_path).await?;
        let url = self.object_url(bucket, key);

        let resp = self.send(Method::PUT, &url, body).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(http_error("upload", status, text));
        }

        let head = self.send(Method::HEAD, &url, Vec::new()).await?;
        if !head.status().is_success() {
            return Err(StoreError::Verification(format!(
                "uploaded object {bucket}/{key} not visible (HEAD returned {})",
                head.status()
            )));
        }
        Ok(())
    }

    async fn create_bucket_once(&self, bucket: &str) -> Result<(), StoreError> {
        let body = if self.region == "us-east-1" {
            Vec::new()
        } else {
            format!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.region
            )
            .into_bytes()
        };
        let resp = self.send(Method::PUT, &self.bucket_url(bucket), body).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(http_error("create_bucket", status, text));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let current = token.clone();
            let page = self
                .retry
                .run("list", move || self.list_page(bucket, prefix, current.clone()))
                .await?;
            keys.extend(page.keys.into_iter().filter(|k| !k.ends_with('/')));
            match page.next_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }
        tracing::debug!(bucket, prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    async fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        self.retry
            .run("download", move || self.download_once(bucket, key, local_path))
            .await?;
        tracing::info!(bucket, key, path = %local_path.display(), "downloaded object");
        Ok(())
    }

    async fn upload(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StoreError> {
        if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(StoreError::LocalFileMissing(local_path.to_path_buf()));
        }
        self.retry
            .run("upload", move || self.upload_once(local_path, bucket, key))
            .await?;
        tracing::info!(bucket, key, path = %local_path.display(), "uploaded object");
        Ok(())
    }

    async fn bucket_exists_or_create(&self, bucket: &str) -> bool {
        match self.send(Method::HEAD, &self.bucket_url(bucket), Vec::new()).await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(bucket, "bucket exists");
                return true;
            }
            Ok(resp) => tracing::info!(bucket, status = %resp.status(), "bucket not found, creating"),
            Err(e) => tracing::info!(bucket, error = %e, "bucket check failed, creating"),
        }

        match self
            .retry
            .run("create_bucket", move || self.create_bucket_once(bucket))
            .await
        {
            Ok(()) => {
                tracing::info!(bucket, region = %self.region, "bucket created");
                true
            }
            Err(e) => {
                tracing::error!(bucket, error = %e, "failed to create bucket");
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("s3 ({}, region {})", self.endpoint, self.region)
    }
}

fn http_error(op: &'static str, status: StatusCode, body: String) -> StoreError {
    StoreError::Http {
        op,
        status: status.as_u16(),
        body,
    }
}

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    keys: Vec<String>,
    is_truncated: bool,
    next_token: Option<String>,
}

impl ListPage {
    fn parse(xml: &str) -> Self {
        let keys = tag_values(xml, "Key").into_iter().map(unescape_xml).collect();
        let is_truncated = tag_values(xml, "IsTruncated")
            .first()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        let next_token = tag_values(xml, "NextContinuationToken")
            .first()
            .map(|v| unescape_xml(v));
        Self {
            keys,
            is_truncated,
            next_token,
        }
    }
}

fn tag_values<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        values.push(&after[..end]);
        rest = &after[end + close.len()..];
    }
    values
}

fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>docs</Name>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>dataset/documents/</Key></Contents>
  <Contents><Key>dataset/documents/a&amp;b.pdf</Key></Contents>
  <NextContinuationToken>tok=1</NextContinuationToken>
</ListBucketResult>"#;
        let page = ListPage::parse(xml);
        assert_eq!(page.keys, vec!["dataset/documents/", "dataset/documents/a&b.pdf"]);
        assert!(page.is_truncated);
        assert_eq!(page.next_token.as_deref(), Some("tok=1"));
    }

    #[test]
    fn empty_listing_parses() {
        let page = ListPage::parse("<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>");
        assert_eq!(page, ListPage::default());
    }

    #[test]
    fn object_url_encodes_segments_but_keeps_slashes() {
        let store = S3ObjectStore::new("us-east-1", Some("http://localhost:9000/".into()), None);
        assert_eq!(
            store.object_url("docs", "dataset/my file.pdf"),
            "http://localhost:9000/docs/dataset/my%20file.pdf"
        );
    }

    #[test]
    fn default_endpoint_follows_region() {
        let store = S3ObjectStore::new("sa-east-1", None, None);
        assert_eq!(store.endpoint(), "https://s3.sa-east-1.amazonaws.com");
    }
}

use std::time::Duration;

use anyhow::{anyhow, Result};
use docbot_auth::{AwsCredentials, RequestSigner, SigningProfile};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProviderErrorKind {
    Throttled,
    ServerError,
    Timeout,
    AuthError,
    InvalidRequest,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            429 => Self::Throttled,
            401 | 403 => Self::AuthError,
            400 | 404 | 422 => Self::InvalidRequest,
            408 => Self::Timeout,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::ServerError | Self::Timeout)
    }
}

/// Minimal Bedrock runtime client: `POST /model/{id}/invoke` with a JSON body.
#[derive(Debug, Clone)]
pub struct BedrockRuntime {
    client: reqwest::Client,
    endpoint: String,
    signer: Option<RequestSigner>,
    backoff: Duration,
}

impl BedrockRuntime {
    pub fn new(
        region: impl Into<String>,
        endpoint: Option<String>,
        credentials: Option<AwsCredentials>,
    ) -> Self {
        let region = region.into();
        let endpoint = endpoint
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            signer: credentials.map(|creds| {
                RequestSigner::new(creds, region, SigningProfile::Standard("bedrock"))
            }),
            backoff: BASE_BACKOFF,
        }
    }

    /// Base delay between retries of throttled or failed invocations.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub(crate) fn invoke_url(&self, model_id: &str) -> String {
        format!(
            "{}/model/{}/invoke",
            self.endpoint,
            urlencoding::encode(model_id)
        )
    }

    /// Invokes the model, retrying up to `MAX_RETRIES` times on errors marked `[retryable]`.
    pub async fn invoke<Req, Resp>(&self, model_id: &str, payload: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(payload)?;
        let mut attempts = 0;
        loop {
            match self.invoke_once(model_id, body.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    let err_str = err.to_string();
                    if err_str.contains("[retryable]") && attempts < MAX_RETRIES {
                        attempts += 1;
                        let backoff = self.backoff * (1 << (attempts - 1));
                        tracing::warn!(
                            model_id,
                            attempt = attempts,
                            backoff_ms = backoff.as_millis() as u64,
                            "bedrock retryable error: {err_str}"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn invoke_once<Resp>(&self, model_id: &str, body: Vec<u8>) -> Result<Resp>
    where
        Resp: DeserializeOwned,
    {
        let url = self.invoke_url(model_id);

        let mut req = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(signer) = &self.signer {
            let headers = vec![
                ("content-type".to_string(), "application/json".to_string()),
                ("accept".to_string(), "application/json".to_string()),
            ];
            for (name, value) in signer.sign("POST", &url, &headers, &body)? {
                req = req.header(name, value);
            }
        }

        let resp = match req.body(body).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(anyhow!(
                    "bedrock api error (timeout) [retryable]: {model_id} timed out after 60s"
                ));
            }
            Err(e) if e.is_connect() => {
                return Err(anyhow!("bedrock api error (connect) [retryable]: {e}"));
            }
            Err(e) => return Err(e.into()),
        };

        let status = resp.status();
        if status != StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<ApiError>(&text).ok();
            return Err(format_api_error(model_id, status, parsed));
        }

        Ok(resp.json::<Resp>().await?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiError {
    #[serde(alias = "Message")]
    pub message: String,
}

fn format_api_error(model_id: &str, status: StatusCode, parsed: Option<ApiError>) -> anyhow::Error {
    let retryable = if ProviderErrorKind::from_status(status).is_retryable() {
        " [retryable]"
    } else {
        ""
    };
    match parsed {
        Some(err) => anyhow!(
            "bedrock api error ({status}){retryable}: {model_id}: {}",
            err.message
        ),
        None => anyhow!("bedrock api error ({status}){retryable}: {model_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_url_encodes_model_id() {
        let runtime = BedrockRuntime::new("us-east-1", None, None);
        assert_eq!(
            runtime.invoke_url("amazon.titan-embed-text-v2:0"),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/amazon.titan-embed-text-v2%3A0/invoke"
        );
    }

    #[test]
    fn endpoint_override_trims_slash() {
        let runtime = BedrockRuntime::new("us-east-1", Some("http://localhost:4000/".into()), None);
        assert_eq!(runtime.endpoint(), "http://localhost:4000");
    }

    #[test]
    fn format_api_error_marks_throttling_retryable() {
        let err = format_api_error(
            "m",
            StatusCode::TOO_MANY_REQUESTS,
            Some(ApiError {
                message: "Too many requests".into(),
            }),
        );
        let text = err.to_string();
        assert!(text.contains("429"));
        assert!(text.contains("[retryable]"));
        assert!(text.contains("Too many requests"));
    }

    #[test]
    fn format_api_error_validation_not_retryable() {
        let err = format_api_error("m", StatusCode::BAD_REQUEST, None);
        assert!(!err.to_string().contains("[retryable]"));
    }
}

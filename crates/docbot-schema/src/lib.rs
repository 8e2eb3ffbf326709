use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Update id reserved for manual smoke tests. Never deduplicated.
pub const TEST_EVENT_ID: i64 = 123_456_789;

// ============================================================
// Telegram wire types
// ============================================================

/// The subset of a Telegram `Update` the bot reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramMessage {
    #[serde(default)]
    pub chat: Option<TelegramChat>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramChat {
    #[serde(default)]
    pub id: Option<i64>,
}

/// Why an update could not be turned into an [`InboundEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRejection {
    NoMessage,
    NoChatId,
}

impl TelegramUpdate {
    pub fn is_test_event(&self) -> bool {
        self.update_id == TEST_EVENT_ID
    }

    pub fn into_event(self) -> Result<InboundEvent, EventRejection> {
        let message = self.message.ok_or(EventRejection::NoMessage)?;
        let chat_id = message
            .chat
            .and_then(|chat| chat.id)
            .ok_or(EventRejection::NoChatId)?;

        Ok(InboundEvent {
            trace_id: Uuid::new_v4(),
            event_id: self.update_id,
            chat_id,
            text: message.text,
            at: Utc::now(),
        })
    }
}

/// A chat message accepted by the dispatch layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub trace_id: Uuid,
    pub event_id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    pub at: DateTime<Utc>,
}

// ============================================================
// Webhook envelope and response
// ============================================================

/// API-Gateway style proxy event: the raw body plus its encoding flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, rename = "isBase64Encoded")]
    pub is_base64_encoded: bool,
}

impl WebhookEnvelope {
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            is_base64_encoded: false,
        }
    }
}

/// Diagnostic outcome reported back to the webhook caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Processed,
    AlreadyProcessed,
    NoBody,
    InvalidEncoding,
    InvalidJson,
    NoMessage,
    NoChatId,
    NonText,
    Error,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::AlreadyProcessed => "already_processed",
            Self::NoBody => "no_body",
            Self::InvalidEncoding => "invalid_encoding",
            Self::InvalidJson => "invalid_json",
            Self::NoMessage => "no_message",
            Self::NoChatId => "no_chat_id",
            Self::NonText => "non_text",
            Self::Error => "error",
        }
    }
}

impl From<EventRejection> for WebhookStatus {
    fn from(value: EventRejection) -> Self {
        match value {
            EventRejection::NoMessage => Self::NoMessage,
            EventRejection::NoChatId => Self::NoChatId,
        }
    }
}

/// Webhook reply. `status_code` is always 200 so the provider never redelivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    #[serde(skip)]
    pub status_code: u16,
    pub status: WebhookStatus,
}

impl WebhookResponse {
    pub fn ok(status: WebhookStatus) -> Self {
        Self {
            status_code: 200,
            status,
        }
    }
}

// ============================================================
// Documents and retrieval
// ============================================================

/// A fixed-size slice of a source document, addressable by `(source_key, chunk_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub source_key: String,
    pub chunk_index: u32,
    pub text: String,
}

impl DocumentChunk {
    pub fn new(source_key: impl Into<String>, chunk_index: u32, text: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            chunk_index,
            text: text.into(),
        }
    }

    pub fn chunk_id(&self) -> String {
        format!("{}#{}", self.source_key, self.chunk_index)
    }
}

/// Outcome of one retrieval-augmented query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub status_code: u16,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Wall-clock seconds spent on the query.
    pub duration: f64,
    #[serde(default)]
    pub message: Option<String>,
}

impl QueryResult {
    pub fn answered(answer_text: String, source: String, duration: f64) -> Self {
        Self {
            status_code: 200,
            answer_text: Some(answer_text),
            source: Some(source),
            duration,
            message: None,
        }
    }

    pub fn failed(status_code: u16, message: impl Into<String>, duration: f64) -> Self {
        Self {
            status_code,
            answer_text: None,
            source: None,
            duration,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Summary of one index build run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub status: bool,
    #[serde(default)]
    pub chunks_indexed: Option<usize>,
    pub documents: usize,
    pub published: bool,
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl BuildReport {
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            status: false,
            chunks_indexed: None,
            documents: 0,
            published: false,
            message: error.clone(),
            error: Some(error),
            finished_at: Utc::now(),
        }
    }
}

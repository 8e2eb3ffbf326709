//! Webhook dispatch: decoding, deduplication and routing of Telegram updates.
//!
//! Every outcome maps to an HTTP 200 so the provider never redelivers an
//! update; the [`WebhookStatus`] in the body says what actually happened.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use docbot_channels::Messenger;
use docbot_schema::{QueryResult, TelegramUpdate, WebhookEnvelope, WebhookResponse, WebhookStatus};
use tracing::Instrument;

use crate::pipeline::Answerer;

/// Recently handled update ids kept for deduplication.
pub const SEEN_EVENTS_CAPACITY: usize = 1000;

pub const PROCESSING_ACK: &str = "🔍 Processing your question, please wait a moment...";
pub const NON_TEXT_REPLY: &str =
    "For now I can only process text messages. Please send your question as text.";
pub const UNKNOWN_COMMAND_REPLY: &str = "Command not recognised. Use /help to see the available commands.";
pub const TIMEOUT_REPLY: &str = "⏱️ The query took too long to process. Please try a simpler question or try again later.";
pub const NOT_INITIALIZED_REPLY: &str = "😔 The document index has not been initialized yet.\n\nPlease wait while the administrator runs `docbot initialize` to build it.";
pub const NOTHING_RELEVANT_REPLY: &str =
    "😔 I could not find relevant information for your question in the available knowledge base.";
pub const INTERNAL_ERROR_REPLY: &str = "😔 An internal error occurred. Please try again later.";

const WELCOME_MESSAGE: &str = "👋 Welcome to the document RAG bot\n\n\
I am ready to answer your questions about the indexed documents. \
Just send your question and I will use RAG (Retrieval-Augmented Generation) \
to find the best answer.\n\n\
Available commands:\n\
• /start - Show this welcome message\n\
• /help - Show help information\n\n\
Type your question at any time!";

const HELP_MESSAGE: &str = "🔍 Document RAG bot help\n\n\
This bot uses RAG (Retrieval-Augmented Generation) to answer your questions \
based on the stored documents.\n\n\
How to use:\n\
• Ask a question about the content of the documents\n\
• The bot searches the documents and generates a relevant answer\n\n\
Commands:\n\
• /start - Restart the bot\n\
• /help - Show this help message";

/// Fixed commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Debug,
    Unknown(String),
}

/// Parses a leading slash command. Returns `None` for ordinary text.
///
/// `/cmd@botname` is treated as `/cmd`; `/ajuda` is an alias of `/help`.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let token = trimmed.split_whitespace().next()?;
    let name = token.split('@').next().unwrap_or(token).to_lowercase();

    Some(match name.as_str() {
        "/start" => BotCommand::Start,
        "/help" | "/ajuda" => BotCommand::Help,
        "/debug" => BotCommand::Debug,
        _ => BotCommand::Unknown(token.to_string()),
    })
}

/// Process-scoped record of handled update ids.
///
/// When full, the whole set is cleared before the next id goes in.
#[derive(Debug)]
pub struct SeenEvents {
    ids: HashSet<i64>,
    capacity: usize,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// Returns `false` if `id` was already handled. Non-positive ids are
    /// admitted without being recorded.
    pub fn admit(&mut self, id: i64) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if id <= 0 {
            return true;
        }
        if self.ids.len() >= self.capacity {
            tracing::info!(capacity = self.capacity, "seen-event set full, clearing");
            self.ids.clear();
        }
        self.ids.insert(id);
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for SeenEvents {
    fn default() -> Self {
        Self::new(SEEN_EVENTS_CAPACITY)
    }
}

/// Deployment facts reported by `/debug`.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub pdf_bucket: Option<String>,
    pub embedding_bucket: Option<String>,
    pub region: String,
    pub cache_dir: PathBuf,
    pub store: String,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Upper bound on answering one free-text question, reply included.
    pub processing_timeout: Duration,
    pub debug_info: DebugInfo,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            processing_timeout: Duration::from_secs(15),
            debug_info: DebugInfo::default(),
        }
    }
}

pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    answerer: Arc<dyn Answerer>,
    seen: Mutex<SeenEvents>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        answerer: Arc<dyn Answerer>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            messenger,
            answerer,
            seen: Mutex::new(SeenEvents::default()),
            settings,
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or_default()
    }

    /// Entry point for API-Gateway style envelopes.
    pub async fn handle_event(&self, envelope: WebhookEnvelope) -> WebhookResponse {
        let Some(body) = envelope.body.filter(|b| !b.is_empty()) else {
            tracing::warn!("webhook event without body");
            return WebhookResponse::ok(WebhookStatus::NoBody);
        };

        let raw = if envelope.is_base64_encoded {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(body.trim())
                .map_err(|e| e.to_string())
                .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));
            match decoded {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode base64 webhook body");
                    return WebhookResponse::ok(WebhookStatus::InvalidEncoding);
                }
            }
        } else {
            body
        };

        self.handle_body(&raw).await
    }

    /// Entry point for a raw Telegram update body.
    pub async fn handle_body(&self, raw: &str) -> WebhookResponse {
        match serde_json::from_str::<TelegramUpdate>(raw) {
            Ok(update) => self.handle_update(update).await,
            Err(e) => {
                tracing::warn!(error = %e, "webhook body is not a valid update");
                WebhookResponse::ok(WebhookStatus::InvalidJson)
            }
        }
    }

    pub async fn handle_update(&self, update: TelegramUpdate) -> WebhookResponse {
        let event_id = update.update_id;
        if update.is_test_event() {
            tracing::info!(event_id, "test event, skipping deduplication");
        } else if !self.admit(event_id) {
            tracing::info!(event_id, "update already processed, ignoring");
            return WebhookResponse::ok(WebhookStatus::AlreadyProcessed);
        }

        let event = match update.into_event() {
            Ok(event) => event,
            Err(rejection) => {
                tracing::warn!(event_id, ?rejection, "update cannot be handled");
                return WebhookResponse::ok(rejection.into());
            }
        };

        let span = tracing::info_span!(
            "event",
            trace_id = %event.trace_id,
            event_id,
            chat_id = event.chat_id
        );
        let status = self.route(event.chat_id, event.text).instrument(span).await;
        WebhookResponse::ok(status)
    }

    async fn route(&self, chat_id: i64, text: Option<String>) -> WebhookStatus {
        let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
            tracing::warn!("message without text");
            self.reply(chat_id, NON_TEXT_REPLY).await;
            return WebhookStatus::NonText;
        };

        match parse_command(&text) {
            Some(command) => {
                self.run_command(chat_id, command).await;
                WebhookStatus::Processed
            }
            None => self.answer_question(chat_id, &text).await,
        }
    }

    fn admit(&self, event_id: i64) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.admit(event_id),
            Err(poisoned) => poisoned.into_inner().admit(event_id),
        }
    }

    async fn run_command(&self, chat_id: i64, command: BotCommand) {
        tracing::info!(?command, "handling command");
        match command {
            BotCommand::Start => {
                self.reply(chat_id, WELCOME_MESSAGE).await;
            }
            BotCommand::Help => {
                self.reply(chat_id, HELP_MESSAGE).await;
            }
            BotCommand::Debug => {
                let message = self.debug_message().await;
                self.reply(chat_id, &message).await;
            }
            BotCommand::Unknown(name) => {
                tracing::warn!(command = %name, "unknown command");
                self.reply(chat_id, UNKNOWN_COMMAND_REPLY).await;
            }
        }
    }

    async fn answer_question(&self, chat_id: i64, question: &str) -> WebhookStatus {
        self.reply(chat_id, PROCESSING_ACK).await;

        let limit = self.settings.processing_timeout;
        match tokio::time::timeout(limit, self.answerer.answer(question)).await {
            Ok(result) => {
                self.reply(chat_id, &format_result(&result)).await;
                WebhookStatus::Processed
            }
            Err(_) => {
                tracing::error!(timeout_secs = limit.as_secs_f64(), "processing timeout exceeded");
                self.reply(chat_id, TIMEOUT_REPLY).await;
                WebhookStatus::Error
            }
        }
    }

    async fn debug_message(&self) -> String {
        let info = &self.settings.debug_info;
        let bot_status = match self.messenger.probe().await {
            Ok(me) => format!(
                "✅ Connected (@{})",
                me.username.as_deref().unwrap_or("unknown")
            ),
            Err(e) => format!("❌ Error: {e:#}"),
        };
        let unset = || "not set".to_string();

        format!(
            "🔧 Debug information\n\n\
             Bot status: {bot_status}\n\n\
             Token: {}\n\n\
             Buckets:\n\
             - PDF: {}\n\
             - Embeddings: {}\n\n\
             Region: {}\n\
             Store: {}\n\
             Cache dir: {}",
            self.messenger.token_hint(),
            info.pdf_bucket.clone().unwrap_or_else(unset),
            info.embedding_bucket.clone().unwrap_or_else(unset),
            info.region,
            info.store,
            info.cache_dir.display(),
        )
    }

    /// Sends `text`, logging instead of failing. A failed send is followed by
    /// a `getMe` probe so a bad token shows up in the logs.
    async fn reply(&self, chat_id: i64, text: &str) -> bool {
        match self.messenger.send_text(chat_id, text).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(chat_id, error = %format!("{e:#}"), "failed to deliver reply");
                match self.messenger.probe().await {
                    Ok(me) => tracing::info!(bot_id = me.id, username = ?me.username, "bot token is valid"),
                    Err(probe_err) => {
                        tracing::error!(error = %format!("{probe_err:#}"), "getMe probe failed, check the bot token")
                    }
                }
                false
            }
        }
    }
}

/// User-facing text for a pipeline result.
pub fn format_result(result: &QueryResult) -> String {
    match result.status_code {
        200 => {
            let answer = result
                .answer_text
                .as_deref()
                .unwrap_or("Could not obtain an answer.");
            format!(
                "{answer}\n\n⏱️ Processing time: {:.2} seconds",
                result.duration
            )
        }
        400 => NOT_INITIALIZED_REPLY.to_string(),
        404 => NOTHING_RELEVANT_REPLY.to_string(),
        504 => TIMEOUT_REPLY.to_string(),
        _ => INTERNAL_ERROR_REPLY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(parse_command("/start"), Some(BotCommand::Start));
        assert_eq!(parse_command("/help"), Some(BotCommand::Help));
        assert_eq!(parse_command("/ajuda"), Some(BotCommand::Help));
        assert_eq!(parse_command("  /DEBUG  "), Some(BotCommand::Debug));
        assert_eq!(parse_command("/start@docbot_test_bot"), Some(BotCommand::Start));
    }

    #[test]
    fn unknown_and_plain_text() {
        assert_eq!(
            parse_command("/weather today"),
            Some(BotCommand::Unknown("/weather".into()))
        );
        assert_eq!(parse_command("what is a special appeal?"), None);
        assert_eq!(parse_command("a /start in the middle"), None);
    }

    #[test]
    fn seen_events_reject_duplicates() {
        let mut seen = SeenEvents::new(10);
        assert!(seen.admit(1));
        assert!(!seen.admit(1));
        assert!(seen.contains(1));
    }

    #[test]
    fn seen_events_clear_when_full() {
        let mut seen = SeenEvents::new(SEEN_EVENTS_CAPACITY);
        for id in 1..=SEEN_EVENTS_CAPACITY as i64 {
            assert!(seen.admit(id));
        }
        assert_eq!(seen.len(), SEEN_EVENTS_CAPACITY);

        assert!(seen.admit(5000));
        assert_eq!(seen.len(), 1);
        assert!(seen.contains(5000));
        assert!(!seen.contains(1));
    }

    #[test]
    fn non_positive_ids_are_not_recorded() {
        let mut seen = SeenEvents::new(10);
        assert!(seen.admit(0));
        assert!(seen.admit(0));
        assert!(seen.admit(-4));
        assert!(seen.is_empty());
    }

    #[test]
    fn formats_results_by_status() {
        let ok = QueryResult::answered("It is an appeal.\n\nSource: doc1.pdf".into(), "doc1.pdf".into(), 1.234);
        assert_eq!(
            format_result(&ok),
            "It is an appeal.\n\nSource: doc1.pdf\n\n⏱️ Processing time: 1.23 seconds"
        );
        assert_eq!(format_result(&QueryResult::failed(400, "x", 0.0)), NOT_INITIALIZED_REPLY);
        assert_eq!(format_result(&QueryResult::failed(404, "x", 0.0)), NOTHING_RELEVANT_REPLY);
        assert_eq!(format_result(&QueryResult::failed(504, "x", 0.0)), TIMEOUT_REPLY);
        assert_eq!(format_result(&QueryResult::failed(500, "x", 0.0)), INTERNAL_ERROR_REPLY);
    }
}

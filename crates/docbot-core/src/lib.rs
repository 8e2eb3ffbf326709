pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod pipeline;

pub use bootstrap::{InitReport, SystemBootstrap, SMOKE_QUERY};
pub use config::{AppConfig, ConfigError, ModelBackend, StoreBackend};
pub use dispatch::{
    format_result, parse_command, BotCommand, DebugInfo, DispatchSettings, Dispatcher, SeenEvents,
    SEEN_EVENTS_CAPACITY,
};
pub use pipeline::{Answerer, RagError, RagPipeline, RagSettings};

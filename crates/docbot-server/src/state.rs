use std::sync::Arc;

use docbot_core::Dispatcher;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide dispatcher; owns the seen-event set.
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }
}

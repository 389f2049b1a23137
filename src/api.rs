//! HTTP API for the assistant chat page

mod assets;
mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::assistant::AssistantRegistry;
use crate::auth::PasswordGate;
use crate::chat::ChatService;
use crate::config::Config;
use crate::session::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub assistants: Arc<AssistantRegistry>,
    pub sessions: Arc<SessionManager>,
    pub chat: Arc<ChatService>,
    pub gate: PasswordGate,
}

impl AppState {
    pub fn new(config: Arc<Config>, assistants: Arc<AssistantRegistry>) -> Self {
        let gate = PasswordGate::new(config.app.require_password, config.password.clone());
        Self {
            sessions: Arc::new(SessionManager::new(gate.required())),
            chat: Arc::new(ChatService::new(config.clone(), assistants.clone())),
            config,
            assistants,
            gate,
        }
    }
}

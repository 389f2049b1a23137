//! API request and response types

use crate::config::{Config, DatabaseConfig};
use crate::session::Session;
use crate::transcript::Turn;
use serde::{Deserialize, Serialize};

/// Request to check the shared password
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// Request to pick the session's database
#[derive(Debug, Deserialize)]
pub struct SelectDatabaseRequest {
    pub database: String,
}

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Page-wide settings for the UI
#[derive(Debug, Serialize)]
pub struct AppInfoResponse {
    pub title: String,
    pub require_password: bool,
    pub databases: Vec<DatabaseSummary>,
}

/// Entry of the database selector
#[derive(Debug, Serialize)]
pub struct DatabaseSummary {
    pub name: String,
    pub subtitle: String,
    /// Whether credentials exist for it
    pub configured: bool,
}

/// Settings of the selected database the page needs to render
#[derive(Debug, Serialize)]
pub struct DatabaseView {
    pub name: String,
    pub subtitle: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome: Option<String>,
    pub new_chat: String,
}

impl DatabaseView {
    fn new(name: &str, config: &DatabaseConfig) -> Self {
        Self {
            name: name.to_string(),
            subtitle: config.subtitle.clone(),
            prompt: config.prompt.clone(),
            welcome: config.welcome.clone(),
            new_chat: config.new_chat.clone(),
        }
    }
}

/// Everything the page shows for one session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub authenticated: bool,
    pub database: Option<DatabaseView>,
    pub running: bool,
    pub history: Vec<Turn>,
}

impl SessionResponse {
    pub fn new(session: &Session, config: &Config) -> Self {
        let database = session.database.as_deref().and_then(|name| {
            config
                .database(name)
                .ok()
                .map(|db| DatabaseView::new(name, db))
        });

        Self {
            id: session.id.clone(),
            authenticated: session.authenticated,
            database,
            running: session.is_running(),
            history: session.history.turns().to_vec(),
        }
    }
}

/// Response for login
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub authenticated: bool,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

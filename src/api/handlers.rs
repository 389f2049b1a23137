//! HTTP request handlers

use super::assets::{serve_index, serve_static};
use super::sse::sse_stream;
use super::types::{
    AppInfoResponse, ChatRequest, DatabaseSummary, ErrorResponse, LoginRequest, LoginResponse,
    SelectDatabaseRequest, SessionResponse, SuccessResponse,
};
use super::AppState;
use crate::chat::ChatError;
use crate::config::ConfigError;
use crate::session::{SessionError, SessionHandle};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Root serves the SPA
        .route("/", get(serve_index))
        // Static assets
        .route("/assets/*path", get(serve_static))
        // Page settings and database selector
        .route("/api/app", get(app_info))
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/api/sessions/:id/login", post(login))
        .route("/api/sessions/:id/database", post(select_database))
        .route("/api/sessions/:id/reset", post(reset_session))
        .route("/api/sessions/:id/change-database", post(change_database))
        // Chat (SSE reply)
        .route("/api/sessions/:id/chat", post(send_chat))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Page Settings
// ============================================================

async fn app_info(State(state): State<AppState>) -> Json<AppInfoResponse> {
    let databases = state
        .config
        .databases
        .iter()
        .map(|(name, db)| DatabaseSummary {
            name: name.clone(),
            subtitle: db.subtitle.clone(),
            configured: state.assistants.get(name).is_some(),
        })
        .collect();

    Json(AppInfoResponse {
        title: state.config.app.title.clone(),
        require_password: state.gate.required(),
        databases,
    })
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let session = state.sessions.create().await;
    let guard = session.lock().await;
    Json(SessionResponse::new(&guard, &state.config))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.sessions.get(&id).await?;
    let guard = session.lock().await;
    Ok(Json(SessionResponse::new(&guard, &state.config)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.remove(&id).await?;
    let remaining = state.sessions.count().await;
    tracing::debug!(remaining, "Session deleted");
    Ok(Json(SuccessResponse { success: true }))
}

async fn login(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let session = state.sessions.get(&id).await?;
    let mut guard = session.lock().await;

    if !state.gate.check(&req.password) {
        tracing::warn!(session_id = %id, "Incorrect password");
        return Err(AppError::Unauthorized("Password incorrect".to_string()));
    }

    guard.authenticated = true;
    tracing::info!(session_id = %id, "Session authenticated");
    Ok(Json(LoginResponse {
        authenticated: true,
    }))
}

async fn select_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SelectDatabaseRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = authenticated(&state, &id).await?;
    state.config.database(&req.database)?;

    let mut guard = session.lock().await;
    guard.select_database(&req.database)?;
    tracing::info!(session_id = %id, database = %req.database, "Database selected");
    Ok(Json(SessionResponse::new(&guard, &state.config)))
}

/// New chat: keep the database, forget history and thread
async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.sessions.get(&id).await?;
    let mut guard = session.lock().await;
    guard.reset();
    tracing::info!(session_id = %id, "Chat reset");
    Ok(Json(SessionResponse::new(&guard, &state.config)))
}

async fn change_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.sessions.get(&id).await?;
    let mut guard = session.lock().await;
    guard.reset_all();
    tracing::info!(session_id = %id, "Database selection cleared");
    Ok(Json(SessionResponse::new(&guard, &state.config)))
}

async fn authenticated(state: &AppState, id: &str) -> Result<SessionHandle, AppError> {
    let session = state.sessions.get(id).await?;
    if !session.lock().await.authenticated {
        return Err(AppError::Unauthorized("Password required".to_string()));
    }
    Ok(session)
}

// ============================================================
// Chat
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.sessions.get(&id).await?;
    let rx = state.chat.send(session, &req.text).await?;
    Ok(sse_stream(rx))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("assistant-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::DatabaseAlreadySelected | SessionError::RunInProgress => {
                AppError::Conflict(e.to_string())
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::UnknownDatabase(_) => AppError::NotFound(e.to_string()),
            ConfigError::MissingCredentials(_) => AppError::Conflict(e.to_string()),
            _ => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::NotAuthenticated => AppError::Unauthorized(e.to_string()),
            ChatError::NoDatabase | ChatError::EmptyPrompt => AppError::BadRequest(e.to_string()),
            ChatError::Config(e) => e.into(),
            ChatError::Session(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

//! Chat orchestration
//!
//! Takes a prompt from a session, forwards it to the session's assistant
//! and streams the reduced reply back while appending both turns to the
//! session history.

use crate::assistant::{AssistantBackend, AssistantError, AssistantRegistry};
use crate::config::{Config, ConfigError, StreamingMode};
use crate::session::{RunTicket, SessionError, SessionHandle};
use crate::transcript::{reduce, ReducerOptions, StreamInterrupted, Turn, TurnUpdate};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Password required")]
    NotAuthenticated,
    #[error("No database selected")]
    NoDatabase,
    #[error("Prompt is empty")]
    EmptyPrompt,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Progress of one prompt, in the order it happened
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// The user's turn was appended to the history
    TurnStarted { user: Turn },
    /// Incremental change to the assistant turn
    Update { update: TurnUpdate },
    /// The run finished; `turn` is what was appended to the history
    Done { turn: Turn },
    /// The run broke off; `turn` holds whatever was received
    Interrupted {
        turn: Turn,
        message: String,
        retryable: bool,
    },
}

/// Everything a spawned run needs, captured while the session is locked
struct RunPlan {
    session: SessionHandle,
    ticket: RunTicket,
    backend: Arc<dyn AssistantBackend>,
    thread_id: Option<String>,
    message: String,
    options: ReducerOptions,
    streaming: StreamingMode,
    session_id: String,
    database: String,
}

pub struct ChatService {
    config: Arc<Config>,
    assistants: Arc<AssistantRegistry>,
}

impl ChatService {
    pub fn new(config: Arc<Config>, assistants: Arc<AssistantRegistry>) -> Self {
        Self { config, assistants }
    }

    /// Submit a prompt and stream the reply
    ///
    /// Precondition failures are returned directly. Once the user turn is in
    /// the history, every outcome arrives on the returned channel, which is
    /// closed after a `Done` or `Interrupted` event. Dropping the receiver
    /// abandons the run; whatever was received so far is still kept.
    pub async fn send(
        &self,
        session: SessionHandle,
        prompt: &str,
    ) -> Result<mpsc::UnboundedReceiver<ChatEvent>, ChatError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::EmptyPrompt);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let plan = {
            let mut guard = session.lock().await;
            if !guard.authenticated {
                return Err(ChatError::NotAuthenticated);
            }
            let database = guard.database.clone().ok_or(ChatError::NoDatabase)?;
            let db_config = self.config.database(&database)?;
            let backend = self
                .assistants
                .get(&database)
                .ok_or_else(|| ConfigError::MissingCredentials(database.clone()))?;
            let ticket = guard.begin_run()?;

            let user = Turn::user(prompt);
            guard.history.push(user.clone());
            let _ = tx.send(ChatEvent::TurnStarted { user });

            tracing::info!(
                session_id = %guard.id,
                database = %database,
                prompt_chars = prompt.chars().count(),
                "Prompt submitted"
            );

            RunPlan {
                session: session.clone(),
                ticket,
                backend,
                thread_id: guard.thread_id.clone(),
                message: db_config.message_for(prompt),
                options: self.config.reducer_options(db_config),
                streaming: self.config.app.streaming,
                session_id: guard.id.clone(),
                database,
            }
        };

        tokio::spawn(supervise(plan, tx));
        Ok(rx)
    }
}

/// Run the reply in its own task and release the session if that task dies
async fn supervise(plan: RunPlan, tx: mpsc::UnboundedSender<ChatEvent>) {
    let session = plan.session.clone();
    let ticket = plan.ticket.clone();
    let session_id = plan.session_id.clone();
    let fallback = tx.clone();

    let Err(e) = tokio::spawn(run(plan, tx)).await else {
        return;
    };
    tracing::error!(session_id = %session_id, error = %e, "Reply task failed");

    session.lock().await.finish_run(&ticket, None);
    let _ = fallback.send(ChatEvent::Interrupted {
        turn: Turn::assistant(),
        message: "The reply failed unexpectedly".to_string(),
        retryable: false,
    });
}

/// Drive one run to completion and record its outcome in the session
async fn run(plan: RunPlan, tx: mpsc::UnboundedSender<ChatEvent>) {
    let start = Instant::now();

    // Dropping the receiver abandons the run
    let finished = CancellationToken::new();
    let watch_client = async {
        tokio::select! {
            () = tx.closed() => {
                tracing::debug!(session_id = %plan.session_id, "Client stopped listening");
                plan.ticket.cancel.cancel();
            }
            () = finished.cancelled() => {}
        }
    };
    let reply = async {
        let result = stream_reply(&plan, &tx).await;
        finished.cancel();
        result
    };
    let (result, ()) = tokio::join!(reply, watch_client);

    let (turn, event) = match result {
        Ok(turn) => {
            tracing::info!(
                session_id = %plan.session_id,
                database = %plan.database,
                blocks = turn.blocks.len(),
                reply_chars = turn.text().chars().count(),
                duration_ms = %start.elapsed().as_millis(),
                "Reply completed"
            );
            (Some(turn.clone()), ChatEvent::Done { turn })
        }
        Err(interrupted) => {
            let StreamInterrupted { partial, source } = interrupted;
            tracing::warn!(
                session_id = %plan.session_id,
                database = %plan.database,
                blocks = partial.blocks.len(),
                error = %source.message,
                retryable = source.kind.is_retryable(),
                "Reply interrupted"
            );
            let keep = (!partial.blocks.is_empty()).then(|| partial.clone());
            (
                keep,
                ChatEvent::Interrupted {
                    turn: partial,
                    message: source.message,
                    retryable: source.kind.is_retryable(),
                },
            )
        }
    };

    {
        let mut session = plan.session.lock().await;
        if session.finish_run(&plan.ticket, turn) {
            tracing::debug!(
                session_id = %plan.session_id,
                history_len = session.history.len(),
                "Turn recorded"
            );
        } else {
            tracing::debug!(session_id = %plan.session_id, "Session was reset during the run");
        }
    }
    let _ = tx.send(event);
}

/// Make sure the thread exists, post the message and reduce the run
async fn stream_reply(
    plan: &RunPlan,
    tx: &mpsc::UnboundedSender<ChatEvent>,
) -> Result<Turn, StreamInterrupted> {
    let cancel = &plan.ticket.cancel;
    let not_started = |source: AssistantError| StreamInterrupted {
        partial: Turn::assistant(),
        source,
    };

    let thread_id = match &plan.thread_id {
        Some(thread_id) => thread_id.clone(),
        None => {
            until_cancelled(cancel, plan.backend.verify())
                .await
                .map_err(not_started)?;
            let thread_id = until_cancelled(cancel, plan.backend.create_thread())
                .await
                .map_err(not_started)?;
            tracing::info!(
                session_id = %plan.session_id,
                assistant_id = %plan.backend.assistant_id(),
                thread_id = %thread_id,
                "Conversation thread opened"
            );
            plan.session
                .lock()
                .await
                .set_thread(&plan.ticket, &thread_id);
            thread_id
        }
    };

    until_cancelled(cancel, plan.backend.add_user_message(&thread_id, &plan.message))
        .await
        .map_err(not_started)?;
    let events = until_cancelled(cancel, plan.backend.stream_run(&thread_id))
        .await
        .map_err(not_started)?;

    let incremental = plan.streaming == StreamingMode::Incremental;
    reduce(
        events,
        &*plan.backend,
        plan.options,
        cancel,
        |update| {
            if incremental {
                let _ = tx.send(ChatEvent::Update { update });
            }
        },
    )
    .await
}

/// Resolve a transport call unless the run is cancelled first
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, AssistantError>>,
) -> Result<T, AssistantError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AssistantError::cancelled("Run abandoned before the reply started")),
        result = call => result,
    }
}

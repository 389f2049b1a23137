//! Hosted assistant API abstraction
//!
//! A thread/message/run style API: the transport opens a thread, appends
//! user messages to it and streams the events of a run.

pub(crate) mod error;
mod openai;
mod registry;
mod sse;

#[cfg(test)]
pub mod testing;

pub use error::AssistantError;
pub use openai::{OpenAIAssistant, DEFAULT_BASE_URL};
pub use registry::AssistantRegistry;

use crate::transcript::Event;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Ordered events of one run; ends when the run is done
pub type EventStream = BoxStream<'static, Result<Event, AssistantError>>;

/// Producer of run events for a single configured assistant
#[async_trait]
pub trait AssistantTransport: Send + Sync {
    /// Check that the configured assistant exists and the key can reach it
    async fn verify(&self) -> Result<(), AssistantError>;

    /// Open a new conversation thread, returning its id
    async fn create_thread(&self) -> Result<String, AssistantError>;

    /// Append a user message to a thread
    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError>;

    /// Start a run on the thread and stream its events
    async fn stream_run(&self, thread_id: &str) -> Result<EventStream, AssistantError>;

    /// Assistant identifier runs are started with
    fn assistant_id(&self) -> &str;
}

/// Resolves file-citation ids to filenames
#[async_trait]
pub trait FileRegistry: Send + Sync {
    async fn filename(&self, file_id: &str) -> Result<String, AssistantError>;
}

/// Everything a chat session needs from one database's assistant
pub trait AssistantBackend: AssistantTransport + FileRegistry {}
impl<T: AssistantTransport + FileRegistry> AssistantBackend for T {}

/// Logging wrapper for assistant backends
pub struct LoggingAssistant {
    inner: Arc<dyn AssistantBackend>,
    database: String,
}

impl LoggingAssistant {
    pub fn new(inner: Arc<dyn AssistantBackend>, database: impl Into<String>) -> Self {
        Self {
            inner,
            database: database.into(),
        }
    }

    fn log_result<T>(&self, operation: &str, started: Instant, result: &Result<T, AssistantError>) {
        let duration = started.elapsed();
        match result {
            Ok(_) => {
                tracing::debug!(
                    database = %self.database,
                    operation,
                    duration_ms = %duration.as_millis(),
                    "Assistant request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    database = %self.database,
                    operation,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Assistant request failed"
                );
            }
        }
    }
}

#[async_trait]
impl AssistantTransport for LoggingAssistant {
    async fn verify(&self) -> Result<(), AssistantError> {
        let start = Instant::now();
        let result = self.inner.verify().await;
        self.log_result("verify", start, &result);
        result
    }

    async fn create_thread(&self) -> Result<String, AssistantError> {
        let start = Instant::now();
        let result = self.inner.create_thread().await;
        self.log_result("create_thread", start, &result);
        if let Ok(thread_id) = &result {
            tracing::info!(database = %self.database, thread_id = %thread_id, "Thread created");
        }
        result
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        let start = Instant::now();
        let result = self.inner.add_user_message(thread_id, content).await;
        self.log_result("add_user_message", start, &result);
        result
    }

    async fn stream_run(&self, thread_id: &str) -> Result<EventStream, AssistantError> {
        let start = Instant::now();
        let result = self.inner.stream_run(thread_id).await;
        self.log_result("stream_run", start, &result);

        let stream = result?;
        let database = self.database.clone();
        let thread_id = thread_id.to_string();
        let mut events = 0usize;
        let logged = stream.inspect(move |item| match item {
            Ok(event) => {
                events += 1;
                tracing::trace!(database = %database, thread_id = %thread_id, events, ?event, "Run event");
            }
            Err(e) => {
                tracing::warn!(
                    database = %database,
                    thread_id = %thread_id,
                    events,
                    error = %e.message,
                    "Run stream failed"
                );
            }
        });
        Ok(Box::pin(logged))
    }

    fn assistant_id(&self) -> &str {
        self.inner.assistant_id()
    }
}

#[async_trait]
impl FileRegistry for LoggingAssistant {
    async fn filename(&self, file_id: &str) -> Result<String, AssistantError> {
        let start = Instant::now();
        let result = self.inner.filename(file_id).await;
        self.log_result("retrieve_file", start, &result);
        result
    }
}

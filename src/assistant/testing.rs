//! Mock assistant backends for testing
//!
//! These mocks enable chat and reducer tests without network access.

use super::{AssistantError, AssistantTransport, EventStream, FileRegistry};
use crate::transcript::Event;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// File registry backed by a fixed id → filename map
#[derive(Default)]
pub struct MockFileRegistry {
    files: HashMap<String, String>,
}

impl MockFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file_id: impl Into<String>, filename: impl Into<String>) -> Self {
        self.files.insert(file_id.into(), filename.into());
        self
    }
}

#[async_trait]
impl FileRegistry for MockFileRegistry {
    async fn filename(&self, file_id: &str) -> Result<String, AssistantError> {
        self.files
            .get(file_id)
            .cloned()
            .ok_or_else(|| AssistantError::not_found(format!("No such file: {file_id}")))
    }
}

/// File registry whose lookups never resolve
pub struct StalledFileRegistry;

#[async_trait]
impl FileRegistry for StalledFileRegistry {
    async fn filename(&self, _file_id: &str) -> Result<String, AssistantError> {
        futures::future::pending().await
    }
}

/// One scripted run: its events, in order
pub type ScriptedRun = Vec<Result<Event, AssistantError>>;

/// Assistant that replays queued runs and records what it was sent
pub struct MockAssistant {
    runs: Mutex<VecDeque<Result<ScriptedRun, AssistantError>>>,
    files: MockFileRegistry,
    threads_created: AtomicUsize,
    /// Record of `(thread_id, content)` for every message added
    pub messages: Mutex<Vec<(String, String)>>,
    /// Hold runs open after their scripted events instead of ending them
    hang_after_events: bool,
    /// `verify` never resolves
    stall_verify: bool,
    /// `stream_run` panics
    panic_on_run: bool,
}

impl MockAssistant {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(VecDeque::new()),
            files: MockFileRegistry::new(),
            threads_created: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
            hang_after_events: false,
            stall_verify: false,
            panic_on_run: false,
        }
    }

    pub fn with_file(mut self, file_id: impl Into<String>, filename: impl Into<String>) -> Self {
        self.files = self.files.with_file(file_id, filename);
        self
    }

    /// Runs never finish on their own; used to test cancellation
    pub fn hanging(mut self) -> Self {
        self.hang_after_events = true;
        self
    }

    /// Thread setup never completes; used to test cancellation before streaming
    pub fn stalled(mut self) -> Self {
        self.stall_verify = true;
        self
    }

    /// Starting a run panics
    pub fn panicking(mut self) -> Self {
        self.panic_on_run = true;
        self
    }

    /// Queue the events of the next run
    pub fn queue_run(&self, events: ScriptedRun) {
        self.runs.lock().unwrap().push_back(Ok(events));
    }

    /// Make the next run fail to start
    pub fn queue_run_error(&self, error: AssistantError) {
        self.runs.lock().unwrap().push_back(Err(error));
    }

    pub fn threads_created(&self) -> usize {
        self.threads_created.load(Ordering::SeqCst)
    }

    pub fn recorded_messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Default for MockAssistant {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistantTransport for MockAssistant {
    async fn verify(&self) -> Result<(), AssistantError> {
        if self.stall_verify {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn create_thread(&self) -> Result<String, AssistantError> {
        let n = self.threads_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread_{n}"))
    }

    async fn add_user_message(&self, thread_id: &str, content: &str) -> Result<(), AssistantError> {
        self.messages
            .lock()
            .unwrap()
            .push((thread_id.to_string(), content.to_string()));
        Ok(())
    }

    async fn stream_run(&self, _thread_id: &str) -> Result<EventStream, AssistantError> {
        assert!(!self.panic_on_run, "mock run blew up");
        let run = self
            .runs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AssistantError::network("No mock run queued")))?;

        let events = futures::stream::iter(run);
        if self.hang_after_events {
            use futures::StreamExt;
            Ok(Box::pin(events.chain(futures::stream::pending())))
        } else {
            Ok(Box::pin(events))
        }
    }

    fn assistant_id(&self) -> &str {
        "asst_mock"
    }
}

#[async_trait]
impl FileRegistry for MockAssistant {
    async fn filename(&self, file_id: &str) -> Result<String, AssistantError> {
        self.files.filename(file_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_assistant_replays_runs() {
        let mock = MockAssistant::new().with_file("f1", "a.pdf");
        mock.queue_run(vec![Ok(Event::MessageStarted), Ok(Event::delta("hi"))]);

        let thread = mock.create_thread().await.unwrap();
        assert_eq!(thread, "thread_1");
        mock.add_user_message(&thread, "hello").await.unwrap();
        assert_eq!(mock.recorded_messages(), vec![("thread_1".to_string(), "hello".to_string())]);

        let events: Vec<_> = mock.stream_run(&thread).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);

        // Nothing queued for a second run
        assert!(mock.stream_run(&thread).await.is_err());

        assert_eq!(mock.filename("f1").await.unwrap(), "a.pdf");
        assert!(mock.filename("f2").await.is_err());
    }
}

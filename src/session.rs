//! Per-browser chat sessions
//!
//! A session owns the selected database, the assistant thread id and the
//! chat history. Sessions live in memory only.

use crate::transcript::{ChatHistory, Turn};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("A database is already selected for this session")]
    DatabaseAlreadySelected,
    #[error("A reply is still being generated")]
    RunInProgress,
}

/// Handle to the run currently streaming into a session
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub cancel: CancellationToken,
    generation: u64,
}

#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub database: Option<String>,
    pub thread_id: Option<String>,
    pub history: ChatHistory,
    pub authenticated: bool,
    pub created_at: DateTime<Utc>,
    last_active: Instant,
    /// Bumped on every reset so late results of an old run are dropped
    generation: u64,
    active_run: Option<CancellationToken>,
}

impl Session {
    fn new(id: String, authenticated: bool) -> Self {
        Self {
            id,
            database: None,
            thread_id: None,
            history: ChatHistory::new(),
            authenticated,
            created_at: Utc::now(),
            last_active: Instant::now(),
            generation: 0,
            active_run: None,
        }
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Idle for at least `idle` with no reply in flight
    fn is_idle(&self, idle: Duration) -> bool {
        self.active_run.is_none() && self.last_active.elapsed() >= idle
    }

    pub fn select_database(&mut self, name: &str) -> Result<(), SessionError> {
        if self.database.is_some() {
            return Err(SessionError::DatabaseAlreadySelected);
        }
        self.database = Some(name.to_string());
        Ok(())
    }

    /// New chat: drop history and thread, keep the database
    pub fn reset(&mut self) {
        if let Some(cancel) = self.active_run.take() {
            cancel.cancel();
        }
        self.generation += 1;
        self.thread_id = None;
        self.history.clear();
    }

    /// Back to database selection
    pub fn reset_all(&mut self) {
        self.reset();
        self.database = None;
    }

    pub fn is_running(&self) -> bool {
        self.active_run.is_some()
    }

    /// Claim the session for a new run
    pub fn begin_run(&mut self) -> Result<RunTicket, SessionError> {
        if self.active_run.is_some() {
            return Err(SessionError::RunInProgress);
        }
        let cancel = CancellationToken::new();
        self.active_run = Some(cancel.clone());
        Ok(RunTicket {
            cancel,
            generation: self.generation,
        })
    }

    /// Whether the ticket's run still belongs to this session's current chat
    pub fn is_current(&self, ticket: &RunTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Remember the thread a run created, unless the chat was reset meanwhile
    pub fn set_thread(&mut self, ticket: &RunTicket, thread_id: &str) {
        if self.is_current(ticket) {
            self.thread_id = Some(thread_id.to_string());
        }
    }

    /// Release the run and append its turn; returns false if the chat was reset
    pub fn finish_run(&mut self, ticket: &RunTicket, turn: Option<Turn>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.active_run = None;
        if let Some(turn) = turn {
            self.history.push(turn);
        }
        true
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// All live sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    require_password: bool,
}

impl SessionManager {
    pub fn new(require_password: bool) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            require_password,
        }
    }

    /// Create a session; it starts authenticated when no password is required
    pub async fn create(&self) -> SessionHandle {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Mutex::new(Session::new(id.clone(), !self.require_password)));
        self.sessions.write().await.insert(id.clone(), session.clone());
        tracing::info!(session_id = %id, "Session created");
        session
    }

    /// Look up a session and mark it active
    pub async fn get(&self, id: &str) -> Result<SessionHandle, SessionError> {
        let session = self
            .sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.lock().await.touch();
        Ok(session)
    }

    /// Drop a session, cancelling any run in flight
    pub async fn remove(&self, id: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.lock().await.reset_all();
        tracing::info!(session_id = %id, "Session removed");
        Ok(())
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions untouched for `idle`; returns how many were dropped
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let candidates: Vec<(String, SessionHandle)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect();

        let mut expired = Vec::new();
        for (id, session) in candidates {
            if session.lock().await.is_idle(idle) {
                expired.push(id);
            }
        }
        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        let mut evicted = 0;
        for id in expired {
            let Some(session) = sessions.get(&id).cloned() else {
                continue;
            };
            // Re-check under the write lock; a request may have touched it
            let mut guard = session.lock().await;
            if guard.is_idle(idle) {
                guard.reset_all();
                sessions.remove(&id);
                evicted += 1;
            }
        }
        tracing::info!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        evicted
    }

    /// Periodically evict sessions idle for longer than `idle`
    pub fn spawn_sweeper(self: &Arc<Self>, idle: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = idle.clamp(MIN_SWEEP_PERIOD, MAX_SWEEP_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.evict_idle(idle).await;
            }
        })
    }
}

const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);
const MAX_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let manager = SessionManager::new(false);
        let session = manager.create().await;
        let id = session.lock().await.id.clone();

        let fetched = manager.get(&id).await.unwrap();
        assert!(fetched.lock().await.authenticated);
        assert_eq!(manager.count().await, 1);

        assert_eq!(
            manager.get("nope").await.unwrap_err(),
            SessionError::NotFound("nope".to_string())
        );
    }

    #[tokio::test]
    async fn test_password_sessions_start_locked() {
        let manager = SessionManager::new(true);
        let session = manager.create().await;
        assert!(!session.lock().await.authenticated);
    }

    #[tokio::test]
    async fn test_remove_cancels_run() {
        let manager = SessionManager::new(false);
        let session = manager.create().await;
        let (id, ticket) = {
            let mut s = session.lock().await;
            (s.id.clone(), s.begin_run().unwrap())
        };

        manager.remove(&id).await.unwrap();
        assert!(ticket.cancel.is_cancelled());
        assert!(manager.get(&id).await.is_err());
        assert!(manager.remove(&id).await.is_err());
    }

    #[test]
    fn test_select_database_once() {
        let mut session = Session::new("s".into(), true);
        session.select_database("gita").unwrap();
        assert_eq!(
            session.select_database("other"),
            Err(SessionError::DatabaseAlreadySelected)
        );

        session.reset_all();
        assert!(session.database.is_none());
        session.select_database("other").unwrap();
    }

    #[test]
    fn test_one_run_at_a_time() {
        let mut session = Session::new("s".into(), true);
        let ticket = session.begin_run().unwrap();
        assert!(session.is_running());
        assert_eq!(session.begin_run().unwrap_err(), SessionError::RunInProgress);

        assert!(session.finish_run(&ticket, Some(Turn::assistant())));
        assert!(!session.is_running());
        assert_eq!(session.history.len(), 1);
        session.begin_run().unwrap();
    }

    #[test]
    fn test_reset_discards_late_results() {
        let mut session = Session::new("s".into(), true);
        session.select_database("gita").unwrap();
        session.history.push(Turn::user("q"));
        let ticket = session.begin_run().unwrap();

        session.reset();
        assert!(ticket.cancel.is_cancelled());
        assert!(session.history.is_empty());
        assert_eq!(session.database.as_deref(), Some("gita"));

        session.set_thread(&ticket, "thread_old");
        assert!(!session.finish_run(&ticket, Some(Turn::assistant())));
        assert!(session.thread_id.is_none());
        assert!(session.history.is_empty());
        assert!(!session.is_running());
    }

    fn backdate(session: &mut Session, by: Duration) {
        session.last_active = Instant::now().checked_sub(by).unwrap();
    }

    #[tokio::test]
    async fn test_evict_idle_sessions() {
        let manager = SessionManager::new(false);
        let stale = manager.create().await;
        let fresh = manager.create().await;
        let busy = manager.create().await;

        let stale_id = stale.lock().await.id.clone();
        let fresh_id = fresh.lock().await.id.clone();
        let busy_id = busy.lock().await.id.clone();
        backdate(&mut *stale.lock().await, Duration::from_secs(120));
        let ticket = {
            let mut s = busy.lock().await;
            backdate(&mut s, Duration::from_secs(120));
            s.begin_run().unwrap()
        };

        assert_eq!(manager.evict_idle(Duration::from_secs(60)).await, 1);
        assert!(manager.get(&stale_id).await.is_err());
        assert!(manager.get(&fresh_id).await.is_ok());
        // A reply in flight keeps the session alive
        assert!(manager.get(&busy_id).await.is_ok());
        assert!(!ticket.cancel.is_cancelled());
        assert_eq!(manager.count().await, 2);
    }

    #[tokio::test]
    async fn test_get_marks_session_active() {
        let manager = SessionManager::new(false);
        let session = manager.create().await;
        let id = session.lock().await.id.clone();
        backdate(&mut *session.lock().await, Duration::from_secs(120));

        manager.get(&id).await.unwrap();
        assert_eq!(manager.evict_idle(Duration::from_secs(60)).await, 0);
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let manager = Arc::new(SessionManager::new(false));
        let session = manager.create().await;
        backdate(&mut *session.lock().await, Duration::from_secs(120));

        let sweeper = manager.spawn_sweeper(Duration::from_secs(60));
        for _ in 0..100 {
            if manager.count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.abort();
        assert_eq!(manager.count().await, 0);
    }
}

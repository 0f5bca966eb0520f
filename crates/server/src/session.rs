//! Session Management
//!
//! Every session owns one chatbot behind an async mutex, so requests for
//! the same session run one at a time while distinct sessions proceed in
//! parallel. Idle sessions are expired by a background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex};

use roleplay_agent::SalesChatbot;
use roleplay_config::constants::timeouts;
use roleplay_config::FlowType;

use crate::ServerError;

/// Session state
pub struct Session {
    pub id: String,
    pub flow_type: FlowType,
    pub chatbot: Arc<Mutex<SalesChatbot>>,
    pub created_at: Instant,
    last_activity: RwLock<Instant>,
}

impl Session {
    fn new(id: String, flow_type: FlowType, chatbot: SalesChatbot) -> Self {
        Self {
            id,
            flow_type,
            chatbot: Arc::new(Mutex::new(chatbot)),
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }
}

/// Session manager
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    pub fn new(max_sessions: usize) -> Self {
        Self::with_config(
            max_sessions,
            Duration::from_secs(timeouts::SESSION_IDLE_SECS),
            Duration::from_secs(60),
        )
    }

    pub fn with_config(max_sessions: usize, session_timeout: Duration, cleanup_interval: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            cleanup_interval,
        }
    }

    /// Start a background task that periodically removes idle sessions.
    ///
    /// Send `true` on the returned channel to stop it.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = manager.cleanup_expired();
                        if removed > 0 {
                            tracing::info!(removed, remaining = manager.count(), "Session cleanup");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Register a new session. `build` receives the generated session id.
    pub fn create<F>(&self, flow_type: FlowType, build: F) -> Result<Arc<Session>, ServerError>
    where
        F: FnOnce(&str) -> SalesChatbot,
    {
        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);
            if sessions.len() >= self.max_sessions {
                return Err(ServerError::SessionLimit(self.max_sessions));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), flow_type, build(&id)));
        sessions.insert(id.clone(), Arc::clone(&session));

        tracing::info!(session_id = %id, flow = %flow_type, "Created session");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session. Returns false when it did not exist.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Removed session");
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Remove idle sessions, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions)
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let timeout = self.session_timeout;
        let before = sessions.len();
        sessions.retain(|id, session| {
            let keep = !session.is_expired(timeout);
            if !keep {
                tracing::info!(session_id = %id, "Expired session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Session ids, sorted
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Duration;
use tracing::debug;

use crate::session::store::{Session, SessionStore, SessionStoreError};

/// In-memory implementation of SessionStore
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    /// Thread-safe storage of sessions
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> SessionStoreError {
    SessionStoreError::StorageError(format!("Failed to acquire lock: {}", e))
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: Session) -> Result<Session, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(lock_error)?;
        sessions.insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Created session");
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> Result<Session, SessionStoreError> {
        let sessions = self.sessions.read().map_err(lock_error)?;

        let session = sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;

        if session.is_expired() {
            return Err(SessionStoreError::NotFound(id.to_string()));
        }

        Ok(session)
    }

    async fn save_session(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(lock_error)?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn append_turn(
        &self,
        id: &str,
        user_message: String,
        reply: String,
        ttl: Duration,
    ) -> Result<Session, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(lock_error)?;

        let session = sessions
            .get_mut(id)
            .filter(|session| !session.is_expired())
            .ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;

        session.record_turn(user_message, reply);
        session.touch(ttl);
        Ok(session.clone())
    }

    async fn delete_session(&self, id: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(lock_error)?;

        if sessions.remove(id).is_none() {
            return Err(SessionStoreError::NotFound(id.to_string()));
        }

        debug!(session_id = %id, "Deleted session");
        Ok(())
    }

    async fn cleanup_expired_sessions(&self) -> Result<usize, SessionStoreError> {
        let mut sessions = self.sessions.write().map_err(lock_error)?;

        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        let removed = before - sessions.len();

        if removed > 0 {
            debug!(removed, "Cleaned up expired sessions");
        }
        Ok(removed)
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, SessionStoreError> {
        let sessions = self.sessions.read().map_err(lock_error)?;
        Ok(sessions
            .values()
            .filter(|session| !session.is_expired())
            .cloned()
            .collect())
    }
}

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chatlens_core::types::{ChatHistory, ChatMessage};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Error type for session store operations
#[derive(Error, Debug)]
pub enum SessionStoreError {
    /// Session not found or expired
    #[error("Session not found: {0}")]
    NotFound(String),
    /// Error occurred during a store operation
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// A conversation about one uploaded file
#[derive(Debug, Clone)]
pub struct Session {
    /// Server-assigned identifier
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Text the system prompt is built from on every turn
    pub file_content: String,
    /// Conversation so far, without the system prompt
    pub history: ChatHistory,
}

impl Session {
    /// Create a new session with a generated ID
    pub fn new(file_content: String, history: ChatHistory) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            expires_at: None,
            file_content,
            history,
        }
    }

    /// Appends one user/assistant exchange
    pub fn record_turn(&mut self, user_message: String, reply: String) {
        self.history.push(ChatMessage::user(user_message));
        self.history.push(ChatMessage::assistant(reply));
        self.updated_at = Utc::now();
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() > expires_at)
    }

    /// Set the expiration time for this session
    pub fn set_expiry(&mut self, expires_at: DateTime<Utc>) {
        self.expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }

    /// Pushes expiry to `ttl` from now
    pub fn touch(&mut self, ttl: Duration) {
        self.set_expiry(Utc::now() + ttl);
    }
}

/// Trait defining the interface for session stores
#[async_trait]
pub trait SessionStore: Send + Sync + Debug {
    /// Store a newly created session
    async fn create_session(&self, session: Session) -> Result<Session, SessionStoreError>;

    /// Get a live session by ID
    async fn get_session(&self, id: &str) -> Result<Session, SessionStoreError>;

    /// Save changes to a session
    async fn save_session(&self, session: Session) -> Result<(), SessionStoreError>;

    /// Append one exchange to a live session and push its expiry to `ttl` from now.
    ///
    /// The append happens against the stored session, so concurrent turns on the
    /// same ID each add their own pair. Returns the session as stored afterwards.
    async fn append_turn(
        &self,
        id: &str,
        user_message: String,
        reply: String,
        ttl: Duration,
    ) -> Result<Session, SessionStoreError>;

    /// Delete a session by ID
    async fn delete_session(&self, id: &str) -> Result<(), SessionStoreError>;

    /// Delete expired sessions, returning how many were removed
    async fn cleanup_expired_sessions(&self) -> Result<usize, SessionStoreError>;

    /// List all active (non-expired) sessions
    async fn list_sessions(&self) -> Result<Vec<Session>, SessionStoreError>;
}

/// Type alias for Arc-wrapped SessionStore trait objects
pub type SessionStoreRef = Arc<dyn SessionStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_session_creation() {
        let session = Session::new("log".to_string(), Vec::new());

        assert!(Uuid::parse_str(&session.id).is_ok());
        assert_eq!(session.file_content, "log");
        assert!(session.history.is_empty());
        assert_eq!(session.expires_at, None);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Session::new(String::new(), Vec::new());
        let b = Session::new(String::new(), Vec::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_record_turn_appends_pair() {
        let mut session = Session::new("log".to_string(), vec![ChatMessage::user("prompt")]);
        let before = session.updated_at;
        thread::sleep(StdDuration::from_millis(5));

        session.record_turn("question".to_string(), "answer".to_string());

        assert_eq!(session.history.len(), 3);
        assert_eq!(session.history[1], ChatMessage::user("question"));
        assert_eq!(session.history[2], ChatMessage::assistant("answer"));
        assert!(session.updated_at > before);
    }

    #[test]
    fn test_session_expiry() {
        let mut session = Session::new(String::new(), Vec::new());

        session.touch(Duration::seconds(60));
        assert!(!session.is_expired());

        let past = Utc::now() - Duration::seconds(1);
        session.set_expiry(past);
        assert_eq!(session.expires_at, Some(past));
        assert!(session.is_expired());
    }
}

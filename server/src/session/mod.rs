//! Server-held chat sessions
//!
//! An analyzed upload opens a session holding the file content and the conversation so
//! far. Follow-up chat requests name the session instead of replaying history, so the
//! server decides what the model sees. A `SessionStore` trait keeps the backend swappable.

pub mod adapters;
pub mod store;

pub use adapters::InMemorySessionStore;
pub use store::{Session, SessionStore, SessionStoreError, SessionStoreRef};

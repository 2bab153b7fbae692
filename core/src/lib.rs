// Core completion-API functionality shared by the server:
// - Completion client and the backend trait handlers depend on
// - Chat message types and provider wire shapes
// - Configuration loading
// - Shared error types

pub mod client;
pub use client::*;

pub mod types;
pub use types::*;

pub mod config;
pub use config::*;

pub mod errors;
pub use errors::*;

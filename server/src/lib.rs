//! HTTP service that analyzes uploaded chat logs with a completion API and answers
//! follow-up questions about them.

pub mod analysis;
pub mod archive;
pub mod chat;
pub mod config;
pub mod errors;
pub mod generate;
pub mod http_server;
pub mod inbound;
pub mod page;
pub mod session;
pub mod storage;
pub mod upload;

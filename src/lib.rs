//! # chatsweep
//!
//! Recovers stuck live-chat conversations by impersonating a human
//! agent against the chat gateway's long-poll HTTP protocol.
//!
//! ## How it works
//!
//! - **Gateway protocol client:** session/affinity handshake, strictly
//!   increasing request sequence, long-poll acknowledgement loop
//! - **Backend record gateway:** query and CRUD access to the record
//!   store the conversations live in
//! - **Recovery workflow:** reassign → route → accept → end → close,
//!   one conversation at a time

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");

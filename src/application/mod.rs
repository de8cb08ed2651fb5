//! # Application Layer
//!
//! Orchestrates the domain: the chat send/revoke pipeline and the session
//! reconciliation that builds client conversation lists.

pub mod services;

pub use services::*;

//! Application Services

mod chat_service;
mod session_service;

pub use chat_service::{ChatService, SendError};
pub use session_service::{SessionItem, SessionService};

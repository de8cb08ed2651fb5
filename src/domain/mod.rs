//! # Domain Layer
//!
//! Core business logic of the chat delivery gateway, independent of any
//! framework or infrastructure concern.
//!
//! - **entities**: Talk records, sessions, groups, users, and their
//!   repository traits
//! - **value_objects**: Conversation keys and talk/message type enums
//! - **events**: Fan-out domain events and the publisher contract
//! - **stores**: Traits for the shared mutable state backing sequence,
//!   unread, summary, and presence data

pub mod entities;
pub mod events;
pub mod stores;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use events::*;
pub use stores::*;
pub use value_objects::*;

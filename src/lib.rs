//! # IM Gateway
//!
//! A real-time chat delivery gateway providing:
//! - A WebSocket endpoint for per-user connections
//! - Persisted, per-conversation ordered message delivery
//! - Unread counters and conversation summaries for session lists
//! - Cross-process event fan-out over a shared Redis pub/sub topic
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core entities, conversation keys, and store/repository traits
//! - **Application Layer**: Chat send/revoke pipeline and session reconciliation
//! - **Infrastructure Layer**: Postgres repositories, Redis stores, fan-out publisher
//! - **Presentation Layer**: HTTP routes, auth middleware, and the WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! im_gateway/
//! +-- config/        Configuration management
//! +-- domain/        Entities, conversation keys, events, and traits
//! +-- application/   Chat and session services
//! +-- infrastructure/ Database, cache, and fan-out implementations
//! +-- presentation/  HTTP routes and WebSocket gateway
//! +-- shared/        Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;

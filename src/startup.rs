//! Application Startup
//!
//! Application building, dependency wiring, and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::services::{ChatService, SessionService};
use crate::config::Settings;
use crate::infrastructure::cache::{
    self, RedisPresenceStore, RedisSequenceStore, RedisSummaryStore, RedisUnreadStore,
};
use crate::infrastructure::database;
use crate::infrastructure::fanout::RedisFanoutPublisher;
use crate::infrastructure::repositories::{
    PgGroupRepository, PgMessageRepository, PgSessionRepository, PgUserRepository,
};
use crate::presentation::http::routes;
use crate::presentation::middleware::{cors, trace};
use crate::presentation::websocket::{ConnectionRegistry, Dispatcher, FanoutSubscriber};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: ConnectionManager,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub sessions: Arc<SessionService>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Create database pool
        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        // Create Redis connections: one manager for commands, one raw
        // client the fan-out subscriber turns into a pub/sub connection.
        let redis = cache::create_redis_client(&settings.redis).await?;
        let redis_client = redis::Client::open(settings.redis.url.as_str())?;
        tracing::info!("Redis connection established");

        // Repositories
        let messages = Arc::new(PgMessageRepository::new(db.clone()));
        let sessions_repo = Arc::new(PgSessionRepository::new(db.clone()));
        let groups = Arc::new(PgGroupRepository::new(db.clone()));
        let users = Arc::new(PgUserRepository::new(db.clone()));

        // Shared-state stores
        let sequences = Arc::new(RedisSequenceStore::new(redis.clone()));
        let unread = Arc::new(RedisUnreadStore::new(redis.clone()));
        let summaries = Arc::new(RedisSummaryStore::new(redis.clone()));
        let presence = Arc::new(RedisPresenceStore::new(
            redis.clone(),
            settings.websocket.presence_ttl_secs,
        ));
        let publisher = Arc::new(RedisFanoutPublisher::new(redis.clone()));

        // Connection registry and services
        let registry = Arc::new(ConnectionRegistry::new(settings.websocket.outbound_buffer));
        let chat = Arc::new(ChatService::new(
            messages,
            sessions_repo.clone(),
            groups.clone(),
            users,
            sequences,
            unread.clone(),
            summaries.clone(),
            publisher.clone(),
        ));
        let sessions = Arc::new(SessionService::new(
            sessions_repo.clone(),
            unread,
            summaries,
            presence.clone(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(chat, presence, publisher));

        // Every gateway process subscribes to the shared topic and forwards
        // matching events to its local connections.
        FanoutSubscriber::new(redis_client, registry.clone(), groups, sessions_repo).spawn();

        // Create app state
        let state = AppState {
            db,
            redis,
            registry,
            dispatcher,
            sessions,
            settings: Arc::new(settings.clone()),
        };

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(trace::create_trace_layer())
            .layer(cors::create_cors_layer(&settings.cors));

        // Bind to address
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

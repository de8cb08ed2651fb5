//! Configuration Module

mod settings;

pub use settings::{
    CorsSettings, DatabaseSettings, JwtSettings, RedisSettings, ServerSettings, Settings,
    WebSocketSettings, MIN_JWT_SECRET_LENGTH,
};

/// Global administrator ids from environment variables
pub mod admins;

/// Database configuration and connection management
pub mod database;

/// Engine settings and entity profiles from config.toml
pub mod engine;

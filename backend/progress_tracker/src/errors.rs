//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Price oracle error: {0}")]
    Oracle(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid campaign id: {0}")]
    InvalidCampaignId(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

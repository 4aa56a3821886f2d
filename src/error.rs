//! Error handling for the bookmarks dashboard

use bookmarks_auth::AuthError;
use bookmarks_postgrest::PostgrestError;
use bookmarks_realtime::RealtimeError;
use std::fmt;
use thiserror::Error;

/// Unified error type for the dashboard and its backend
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] PostgrestError),

    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A row the backend returned does not look like a bookmark
    #[error("Unexpected record: {0}")]
    Record(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    pub fn record<T: fmt::Display>(msg: T) -> Self {
        Error::Record(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

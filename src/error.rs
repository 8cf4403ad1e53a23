use thiserror::Error;

use crate::directory::FetchError;

/// Main error type for graphcrawl
#[derive(Error, Debug)]
pub enum GraphcrawlError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (fatal, raised before any crawling starts)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote directory errors that escaped the retry policy
    #[error("Directory error: {0}")]
    Directory(#[from] FetchError),

    /// Phase 2 was asked to run while Phase 1 still has users queued
    #[error("Phase 1 is unfinished: {0} users still queued for the mutual core")]
    Phase1Incomplete(usize),

    /// A blocking database task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenient Result type using GraphcrawlError
pub type Result<T> = std::result::Result<T, GraphcrawlError>;

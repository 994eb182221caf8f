//! Custom error types for the common library
//!
//! This module defines the infrastructure errors shared by the services:
//! database access and session store access.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Failure of a session store backend
///
/// A missing entry is not an error; backends report it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem backend I/O failure
    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis backend failure
    #[error("Session store Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The key cannot be used by this backend
    #[error("Invalid session key: {0}")]
    InvalidKey(String),

    /// The backend is not reachable
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;

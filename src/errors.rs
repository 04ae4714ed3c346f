//! Errors for flight logger
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlightLoggerError {
    #[error("Feed request failed: {0}")]
    FeedError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid ICAO address: {0:?}")]
    InvalidIcao(String),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

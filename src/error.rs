//! Error types for ticker-metrics

use thiserror::Error;

/// Main error type for ticker-metrics
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Invalid price row: {0}")]
    InvalidPriceRow(String),

    #[error("Invalid fundamentals quarter: {0}")]
    InvalidFundamentals(String),

    #[error("No price data for {ticker}. Check symbol/network.")]
    EmptyPriceHistory { ticker: String },

    #[error("All {rejected} price rows for {ticker} were rejected")]
    NoValidRows { ticker: String, rejected: usize },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Result type alias for ticker-metrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;

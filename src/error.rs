//! Error types for the call broker.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Client roster is empty")]
    EmptyRoster,

    #[error("Client roster has {len} entries, at most {max} fit a single-digit menu")]
    RosterTooLarge { len: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Token signing errors.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Remote directory / session API errors.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory {operation} request failed: {reason}")]
    Request { operation: String, reason: String },

    #[error("Directory {operation} returned HTTP {status}")]
    Status { operation: String, status: u16 },

    #[error("Invalid response from directory {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },

    #[error("Failed to mint service credential: {0}")]
    Token(#[from] TokenError),
}

/// Login errors surfaced to API clients.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Unknown user: {name}")]
    Unauthorized { name: String },

    #[error("Token error: {0}")]
    Token(#[from] TokenError),
}

/// Result type alias for the broker.
pub type Result<T> = std::result::Result<T, Error>;

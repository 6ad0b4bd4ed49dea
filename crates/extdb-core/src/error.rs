//! Error types for the extension core.
//!
//! Every fault below the dispatcher is converted into one of the fixed
//! in-band wire messages; the mapping lives here so the dispatcher and the
//! admin channel cannot drift apart on wording.

use crate::wire;

/// Result type alias using ExtError.
pub type Result<T> = std::result::Result<T, ExtError>;

/// Main error type for the extension core.
#[derive(Debug, thiserror::Error)]
pub enum ExtError {
    /// Catch-all for malformed or unparseable calls
    #[error("invalid message")]
    InvalidMessage,

    /// Input shorter than the minimal `N:` form
    #[error("message too short")]
    MessageTooShort,

    /// Mode payload missing its protocol/data separator
    #[error("invalid format")]
    InvalidFormat,

    /// Protocol name or kind not known to the registry
    #[error("unknown protocol")]
    UnknownProtocol,

    /// Handler construction or init failed
    #[error("failed to load protocol: {0}")]
    ProtocolLoadFailed(String),

    /// Database `Type` key is not MySQL/ODBC/SQLite
    #[error("unknown database type: {0}")]
    UnknownDatabaseType(String),

    /// Named config section (or a required key in it) is missing
    #[error("no config option found: {0}")]
    NoConfigOption(String),

    /// Session pool could not be brought up
    #[error("database session pool failed: {0}")]
    SessionPoolFailed(String),

    /// Driver-level database error
    #[error("database error: {0}")]
    Database(String),

    /// Configuration discovery or parse error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtError {
    /// The fixed wire message this error maps to.
    ///
    /// Driver, I/O and config faults surface as the generic invalid-message
    /// text; the detailed cause goes to the log, never onto the wire.
    pub fn wire_message(&self) -> &'static str {
        match self {
            ExtError::InvalidMessage => "Error Invalid Message",
            ExtError::MessageTooShort => "Error Invalid Message, (Message to short)",
            ExtError::InvalidFormat => "Error Invalid Format",
            ExtError::UnknownProtocol => "Error Unknown Protocol",
            ExtError::ProtocolLoadFailed(_) => "Failed to Load Protocol",
            ExtError::UnknownDatabaseType(_) => "Unknown Database Type",
            ExtError::NoConfigOption(_) => "No Config Option Found",
            ExtError::SessionPoolFailed(_) => "Database Session Pool Failed",
            ExtError::Database(_) | ExtError::Config(_) | ExtError::Io(_) => {
                "Error Invalid Message"
            }
        }
    }

    /// Render the full `[0,"…"]` envelope for this error.
    pub fn to_wire(&self) -> String {
        wire::error(self.wire_message())
    }
}

impl From<rusqlite::Error> for ExtError {
    fn from(err: rusqlite::Error) -> Self {
        ExtError::Database(err.to_string())
    }
}

impl From<mysql::Error> for ExtError {
    fn from(err: mysql::Error) -> Self {
        ExtError::Database(err.to_string())
    }
}

#[cfg(feature = "odbc")]
impl From<odbc_api::Error> for ExtError {
    fn from(err: odbc_api::Error) -> Self {
        ExtError::Database(err.to_string())
    }
}

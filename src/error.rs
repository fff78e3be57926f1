use thiserror::Error;

pub type Result<T> = std::result::Result<T, CastError>;

#[derive(Error, Debug)]
pub enum CastError {
    #[error("Unsupported stream scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Local web server is disabled")]
    BridgeDisabled,

    #[error("No private LAN address found on any interface")]
    NoLocalAddress,

    #[error("Could not determine content type of {0}")]
    ContentTypeUnknown(String),

    #[error("Failed to connect to {target} after {attempts} attempts: {reason}")]
    ConnectFailed {
        target: String,
        attempts: u32,
        reason: String,
    },

    #[error("A cast session is already active")]
    SessionAlreadyActive,

    #[error("No cast session is active")]
    NoActiveSession,

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("Marker not found in {0}")]
    MarkerNotFound(String),

    #[error("Skin folder missing: {0}")]
    SkinFolderMissing(String),

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Receiver error: {0}")]
    Remote(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CastError {
    /// Errors that only degrade the cast instead of aborting it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CastError::ContentTypeUnknown(_))
    }
}

impl From<rust_cast::errors::Error> for CastError {
    fn from(e: rust_cast::errors::Error) -> Self {
        CastError::Remote(e.to_string())
    }
}

use thiserror::Error;

/// Errors surfaced by the routing and backend communication layer
#[derive(Error, Debug)]
pub enum Error {
    /// The backend transport could not be established or re-established
    #[error("Connection to '{endpoint}' failed: {message}")]
    Connection { endpoint: String, message: String },

    /// Malformed response, mismatched correlation id, or missing result/error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The backend reported an application-level error
    #[error("Remote error in '{method}': {message}")]
    Remote { method: String, message: String },

    /// The external cache store could not be reached
    #[error("Cache store unavailable: {0}")]
    CacheUnavailable(String),

    /// A route pattern was rejected at registration time
    #[error("Invalid route pattern '{pattern}': {reason}")]
    RouteConfig { pattern: String, reason: String },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether this error must abort the current request
    ///
    /// Cache store failures only disable caching for the request.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::CacheUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

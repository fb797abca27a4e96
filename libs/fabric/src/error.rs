use switchboard_core::Error as CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Undecodable reply: {0}")]
    Decode(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Opening socket to '{endpoint}' failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Response too large: {0} bytes")]
    ResponseTooLarge(usize),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Map a transport failure onto the request-level taxonomy
    pub fn into_core(self, endpoint: &str) -> CoreError {
        match self {
            Error::Codec(message) => CoreError::Codec(message),
            Error::Decode(message) => CoreError::Protocol(format!("Malformed response: {message}")),
            Error::ResponseTooLarge(len) => {
                CoreError::Protocol(format!("Response of {len} bytes exceeds the read limit"))
            }
            other => CoreError::Connection {
                endpoint: endpoint.to_string(),
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use crate::http::HttpProtocolError;
use thiserror::Error;

/// Error types for the reqecho library
#[derive(Error, Debug)]
pub enum EchoError {
    /// Socket errors (bind, accept, connect, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP framing errors
    #[error("HTTP protocol error: {0}")]
    Protocol(HttpProtocolError),

    /// A response could not be assembled
    #[error("HTTP response error: {0}")]
    Http(#[from] ::http::Error),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UTF-8 encoding errors
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<HttpProtocolError> for EchoError {
    fn from(err: HttpProtocolError) -> Self {
        match err {
            HttpProtocolError::Io(e) => EchoError::Io(e),
            other => EchoError::Protocol(other),
        }
    }
}

/// Result type for the reqecho library
pub type Result<T> = std::result::Result<T, EchoError>;

pub mod common;
pub mod db;
pub mod http;

// Re-export main types for convenience
pub use crate::common::{EchoClient, EchoServerTrait};
pub use crate::db::{DbConfig, StartupError};
pub use crate::http::{EchoRecord, HttpConfig, HttpEchoClient, HttpEchoServer};

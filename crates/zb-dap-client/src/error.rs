use std::io;

use thiserror::Error;

/// A frame on the adapter's stdout could not be decoded.
///
/// The transport reader treats every variant the same way as a closed stream.
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Expected a Content-Length header, got {0:?}")]
    MissingHeader(String),
    #[error("Invalid Content-Length value: {0:?}")]
    InvalidLength(String),
    #[error("Stream ended in the middle of a frame")]
    Truncated,
    #[error("Malformed message payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("I/O error while reading a frame: {0}")]
    Io(io::Error),
}

impl From<io::Error> for FramingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => FramingError::Truncated,
            _ => FramingError::Io(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to spawn debug adapter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("Debug adapter {0} was not captured")]
    MissingPipe(&'static str),
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Timed out waiting for the `{command}` response (seq {seq})")]
    Timeout { command: String, seq: i64 },
    #[error("Request `{command}` failed: {message}")]
    RequestFailed { command: String, message: String },
    #[error("Connection to the debug adapter is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ClientError>;

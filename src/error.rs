//! Error types for the sensorstream peers and reference server.

use std::error::Error as StdError;
use std::fmt;
use std::result;
use tonic::{Code, Status};

/// A specialized Result type for sensorstream operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for sensorstream operations.
///
/// None of these are fatal to the process: every failure path ends in a
/// session state reset and a message for the caller.
#[derive(Debug)]
pub enum Error {
    /// Bad credentials, duplicate registration or a rejected token
    Auth(String),
    /// Transport or server-side failure on an open stream
    Stream(String),
    /// An inbound message with an unrecognized shape
    Protocol(String),
    /// An operation that does not apply to the current session state
    Usage(String),
    /// Configuration errors
    Config(String),
    /// Connection establishment errors
    Transport(String),
    /// Invalid data errors
    InvalidData(String),
    /// I/O errors
    Io(std::io::Error),
}

impl Error {
    /// Maps a failed unary call onto the handshake taxonomy.
    ///
    /// Only the server's `details` string is kept, that is what the peer
    /// shows to its user.
    pub fn from_auth_status(status: Status) -> Self {
        match status.code() {
            Code::Unavailable => Error::Transport(status.message().to_string()),
            _ => Error::Auth(status.message().to_string()),
        }
    }

    /// Maps a failed directory or history query.
    pub fn from_query_status(status: Status) -> Self {
        match status.code() {
            Code::Unavailable => Error::Transport(status.message().to_string()),
            Code::Unauthenticated => Error::Auth(status.message().to_string()),
            _ => Error::InvalidData(status.message().to_string()),
        }
    }

    /// Maps a failed streaming call onto the stream taxonomy.
    pub fn from_stream_status(status: Status) -> Self {
        match status.code() {
            Code::Unauthenticated => Error::Auth(status.message().to_string()),
            _ => Error::Stream(format!("{:?}: {}", status.code(), status.message())),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Error::Stream(msg) => write!(f, "Stream error: {}", msg),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::Usage(msg) => write!(f, "{}", msg),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
            Error::InvalidData(msg) => write!(f, "Invalid data: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Error::Auth(err.to_string())
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Auth(msg) => Status::unauthenticated(msg),
            Error::Stream(msg) => Status::unknown(msg),
            Error::Protocol(msg) => Status::invalid_argument(msg),
            Error::Usage(msg) => Status::failed_precondition(msg),
            Error::Config(msg) => Status::failed_precondition(format!("Config error: {}", msg)),
            Error::Transport(msg) => Status::unavailable(msg),
            Error::InvalidData(msg) => Status::invalid_argument(msg),
            Error::Io(err) => Status::internal(format!("I/O error: {}", err)),
        }
    }
}

//! Error types for the relay

use std::io;
use thiserror::Error;

/// Relay error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed handshake target
    #[error("Handshake error: {0}")]
    Handshake(String),

    /// A dial attempt (or the whole race) could not connect
    #[error("Dial error: {0}")]
    Dial(String),

    /// Mid-session read/write failure on either side
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn handshake<S: Into<String>>(msg: S) -> Self {
        Error::Handshake(msg.into())
    }

    pub fn dial<S: Into<String>>(msg: S) -> Self {
        Error::Dial(msg.into())
    }

    pub fn stream<S: Into<String>>(msg: S) -> Self {
        Error::Stream(msg.into())
    }

    pub fn address<S: Into<String>>(msg: S) -> Self {
        Error::Address(msg.into())
    }

}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::Timeout(e.to_string())
    }
}

impl From<axum::Error> for Error {
    fn from(e: axum::Error) -> Self {
        Error::Stream(e.to_string())
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the session engine
//!
//! Variants are grouped by how the session reacts to them: transport errors
//! end the receive loop, everything else is turned into a failure response
//! or a console diagnostic and the session keeps going.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the session engine
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors (fatal) ===
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Failed to parse JSON packet: {0}")]
    MalformedJson(String),

    #[error("JSON packet isn't an object")]
    NotAnObject,

    #[error("Unhandled command \"{0}\"")]
    UnhandledCommand(String),

    #[error("Unhandled packet: {0}")]
    UnhandledPacket(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Engine Errors ===
    #[error("invalid process")]
    InvalidProcess,

    #[error("process {0} during launch or attach")]
    ProcessStateDuringLaunch(&'static str),

    #[error("process failed to stop within {0} seconds")]
    ProcessStopTimeout(u64),

    #[error("{0}")]
    Engine(String),

    // === Handler Errors ===
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Failed to run {0} commands. See the Debug Console for more details.")]
    CommandsFailed(&'static str),

    #[error("{0}")]
    ConsoleCommand(String),

    // === Configuration Errors ===
    #[error("Invalid repl-mode '{0}'. Expected one of 'variable', 'command' or 'auto'.")]
    InvalidReplMode(String),

    #[error("The provided {kind} format '{format}' couldn't be parsed: {reason}")]
    InvalidFormat {
        kind: &'static str,
        format: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },
}

impl Error {
    /// Whether this error must end the receive loop
    ///
    /// A session cannot resynchronize once the byte stream is in doubt, so
    /// framing, parse and I/O failures are never recovered from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_)
                | Self::MalformedJson(_)
                | Self::NotAnObject
                | Self::UnhandledCommand(_)
                | Self::UnhandledPacket(_)
                | Self::Io(_)
        )
    }

    /// Create an engine error from anything displayable
    pub fn engine(message: impl std::fmt::Display) -> Self {
        Self::Engine(message.to_string())
    }

    /// Create an invalid arguments error
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}

/// Failure delivered to a reverse request callback
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReverseRequestError {
    /// The client answered with `success: false`
    #[error("{0}")]
    Failed(String),

    /// The session ended before the client answered
    #[error("session closed before a response was received")]
    SessionClosed,
}

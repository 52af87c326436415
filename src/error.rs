//! Error types for swipe-deck.
//!
//! Only [`SessionError::EmptySelection`] is fatal to a caller. Resolver and
//! playback failures are absorbed by the engine and turned into skips.

use thiserror::Error;

/// Errors surfaced by the session API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The candidate set was empty after deduplication
    #[error("no tracks to swipe: the selection is empty")]
    EmptySelection,

    /// The engine has been closed and accepts no more sessions
    #[error("engine is closed")]
    Closed,
}

/// Failure to turn a track query into a playable locator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("resolver could not be launched: {0}")]
    Launch(String),

    #[error("resolver exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("no stream found for query '{0}'")]
    NotFound(String),

    /// The owning session was torn down while the resolution was pending
    #[error("resolution cancelled")]
    Cancelled,

    #[error("resolver task panicked: {0}")]
    Panicked(String),
}

/// Failure to start or drive a playback stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio backend unavailable: {0}")]
    Unavailable(String),

    #[error("audio device initialization failed: {0}")]
    Init(String),

    #[error("stream creation failed: {0}")]
    Stream(String),

    #[error("playback start failed: {0}")]
    Start(String),

    #[error("invalid locator: {0}")]
    InvalidLocator(String),
}

/// Errors while loading the genre library
#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("failed to read library {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse library {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors while persisting settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("no configuration directory available on this system")]
    NoConfigDir,

    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

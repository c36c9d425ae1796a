//! Error types for the reflection daemon.

use crate::types::NodeId;
use thiserror::Error;

/// Tree-level errors (mutation, hashing, codec)
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Path not found in tree: {0}")]
    PathNotFound(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Path already present in tree: {0}")]
    PathExists(String),

    #[error("Malformed tree encoding: {0}")]
    Malformed(String),

    #[error("Tree I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse error classes shared by every component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    MalformedInput,
    IoFailure,
    StaleState,
}

/// Component-level errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("I/O failure during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stale state: {0}")]
    StaleState(String),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    /// Wrap an I/O error with the operation that produced it
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ApiError::Io {
            context: context.into(),
            source,
        }
    }

    /// Map the error onto the four-way taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::MalformedInput(_) | ApiError::ConfigError(_) => ErrorKind::MalformedInput,
            ApiError::Io { .. } | ApiError::Store(_) => ErrorKind::IoFailure,
            ApiError::StaleState(_) => ErrorKind::StaleState,
            ApiError::Tree(tree) => match tree {
                TreeError::PathNotFound(_) | TreeError::NodeNotFound(_) => ErrorKind::NotFound,
                TreeError::PathExists(_) => ErrorKind::StaleState,
                TreeError::Malformed(_) => ErrorKind::MalformedInput,
                TreeError::IoError(_) => ErrorKind::IoFailure,
            },
        }
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

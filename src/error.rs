//! Gateway error types
//!
//! Expected execution failures (timeouts, auth, rejected commands) are not
//! errors: they are carried in [`ExecResult`](crate::exec::ExecResult). The
//! variants here cover configuration and lookup failures only.

use crate::crypto::CipherError;
use crate::node::NodeValidationError;
use thiserror::Error;

/// Top-level error for gateway, registry and factory operations
#[derive(Debug, Error)]
pub enum NodeConsoleError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node alias already exists: {0}")]
    DuplicateAlias(String),

    #[error("Unknown connector type: {0}")]
    UnknownConnector(String),

    #[error(
        "Duplicate connector type '{connector_type}': {existing} and {duplicate}. \
         Each connector must have a unique type identifier."
    )]
    DuplicateConnector {
        connector_type: String,
        existing: &'static str,
        duplicate: &'static str,
    },

    #[error(transparent)]
    Validation(#[from] NodeValidationError),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("Node store failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, NodeConsoleError>;

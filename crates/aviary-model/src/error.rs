//! Error types for the device tree core

use thiserror::Error;

use crate::node::ClientId;

/// Errors raised by path parsing, tree mutation and subscription management.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The path string is malformed (missing leading slash or empty segment).
    #[error("invalid device tree path: {0:?}")]
    InvalidPathSyntax(String),

    /// The path does not resolve against the current tree shape.
    #[error("no such path in device tree: {0}")]
    PathNotFound(String),

    /// Another child with the same ID is already attached to the parent.
    #[error("another child node already exists with ID {0:?}")]
    DuplicateChildId(String),

    /// No child with the given ID is attached to the parent.
    #[error("no child node exists with ID {0:?}")]
    NoSuchChild(String),

    /// The given node is not a child of the parent it was to be detached from.
    #[error("the given node is not a child of this node")]
    NotAChild,

    /// A structural operation was attempted on a node that cannot perform it.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Non-forced unsubscribe for a client with no matching subscription.
    #[error("client {client} is not subscribed to {path}")]
    NotSubscribed {
        /// The client that requested the unsubscription.
        client: ClientId,
        /// The path the client is not subscribed to.
        path: String,
    },
}

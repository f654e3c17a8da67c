//! Error types surfaced by the public API.
//!
//! Connection, protocol and timeout failures never leave the worker thread;
//! they only cause a reconnect.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::connector::ConnectionState;

/// Problems with the connector configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is empty or absent.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    /// The Router address could not be interpreted.
    #[error("invalid router address `{address}`: {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },
    /// A tuning value could not be parsed or is out of range.
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: String, value: String },
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The configuration file is not valid INI.
    #[error("{origin} is invalid: {message}")]
    Parse { origin: String, message: String },
}

/// Reasons an `init` call was not accepted.
#[derive(Debug, Error)]
pub enum InitError {
    /// The configuration is incomplete; the connector is now disabled.
    #[error("connector disabled: {0}")]
    Config(#[from] ConfigError),
    /// A connection cycle is already under way.
    #[error("connection cycle already active (state: {0})")]
    AlreadyActive(ConnectionState),
    /// The worker thread could not be started.
    #[error("failed to spawn connector worker: {0}")]
    Spawn(#[source] io::Error),
}

/// Outcome of a rejected enqueue call.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// The connector has not been initialised with a complete configuration.
    #[error("connector is disabled")]
    Disabled,
    /// The pending queue is at capacity; the new transaction was dropped.
    #[error("pending queue full")]
    QueueFull,
    /// The connector has been closed.
    #[error("connector closed")]
    Closed,
}

//! Connection states and the lock-free cell that publishes them.

use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

/// Position of the connector in its connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectionState {
    /// Not initialised, or initialised with an incomplete configuration.
    Disabled,
    /// No socket; the next delivery attempt reconnects.
    Disconnected,
    /// Socket connect in progress.
    Connecting,
    /// Connected; waiting for the Router's version banner.
    AwaitingVersion,
    /// Credentials sent; waiting for the authentication status.
    AwaitingAuth,
    /// `init` sent; waiting for its status.
    AwaitingInit,
    /// Handshake complete, nothing outstanding.
    Ready,
    /// `openTransaction` sent for the head transaction.
    AwaitingOpenAck,
    /// Lines and `closeTransaction` sent for the last dequeued transaction.
    AwaitingCloseAck,
}

impl ConnectionState {
    const ALL: [ConnectionState; 9] = [
        ConnectionState::Disabled,
        ConnectionState::Disconnected,
        ConnectionState::Connecting,
        ConnectionState::AwaitingVersion,
        ConnectionState::AwaitingAuth,
        ConnectionState::AwaitingInit,
        ConnectionState::Ready,
        ConnectionState::AwaitingOpenAck,
        ConnectionState::AwaitingCloseAck,
    ];

    /// True while a connection cycle is under way.
    pub fn is_active(self) -> bool {
        self > ConnectionState::Disconnected
    }

    /// True in states where a reply (or connect completion) is outstanding
    /// and the watchdog must be armed.
    pub fn awaits_reply(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::AwaitingVersion
                | ConnectionState::AwaitingAuth
                | ConnectionState::AwaitingInit
                | ConnectionState::AwaitingOpenAck
                | ConnectionState::AwaitingCloseAck
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disabled => "disabled",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::AwaitingVersion => "awaiting version",
            ConnectionState::AwaitingAuth => "awaiting auth",
            ConnectionState::AwaitingInit => "awaiting init",
            ConnectionState::Ready => "ready",
            ConnectionState::AwaitingOpenAck => "awaiting open ack",
            ConnectionState::AwaitingCloseAck => "awaiting close ack",
        }
    }

    fn index(self) -> u8 {
        self as u8
    }

    fn from_index(index: u8) -> Self {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .unwrap_or(ConnectionState::Disabled)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shares the current state between the worker and producer threads.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.index()))
    }

    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_index(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: ConnectionState) {
        self.0.store(state.index(), Ordering::Release);
    }
}

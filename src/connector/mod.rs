//! Connection to the UstRouter.
//!
//! [`UstRouterConnector`] is the producer-facing handle. Behind it, one
//! worker thread drives a [`StateMachine`] through the handshake and the
//! per-transaction exchange, reconnecting after any failure.

mod backoff;
mod handle;
mod link;
mod machine;
mod state;
mod transport;
mod watchdog;
mod worker;

pub use handle::UstRouterConnector;
pub use link::{LinkEvent, RouterLink, SocketLink};
pub use machine::{Shared, StateMachine};
pub use state::{ConnectionState, StateCell};
pub use transport::ActiveConnection;
pub use watchdog::Watchdog;
pub use worker::{WorkerCommand, worker_loop};

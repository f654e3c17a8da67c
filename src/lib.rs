//! Client for the Phusion Passenger UstRouter log sink.
//!
//! Producers hand log data to a [`UstRouterConnector`] as transactions; a
//! worker thread delivers them over a long-lived TCP or Unix-domain
//! connection, one request in flight at a time, reconnecting after any
//! failure. Nothing here blocks a producer on network I/O, and delivery
//! problems never surface as producer errors.

pub mod config;
pub mod connector;
pub mod correlation;
pub mod drop_report;
pub mod error;
pub mod reports;
pub mod timestamp;
pub mod transaction;
pub mod wire;

pub use config::{
    BackoffPolicy, ConnectorConfig, ConnectorSettings, RouterAddress, load_ini_file, load_ini_str,
};
pub use connector::{ConnectionState, UstRouterConnector};
pub use correlation::{CORRELATION_HEADER, HeaderLookup, correlation_id_from_request};
pub use error::{ConfigError, EnqueueError, InitError};
pub use reports::{CATEGORY_EXCEPTIONS, CATEGORY_REQUESTS, ExceptionReport};
pub use timestamp::{Base36, TimestampCodec};
pub use transaction::{DEFAULT_QUEUE_CAPACITY, LogTransaction};

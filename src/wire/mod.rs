//! Length-prefixed framing used on the Router connection.
//!
//! Two frame forms exist. Short frames carry a big-endian `u16` length and a
//! payload of NUL-separated text fields; every command and reply uses them.
//! Long frames carry a big-endian `u32` length and an opaque payload; the
//! credentials and each log line travel this way. Neither form escapes its
//! payload.

mod codec;
mod reader;


pub use codec::{
    Command, FrameError, assigned_txn_id, encode_long, encode_short, encode_short_fields,
    is_status_ok, is_version,
};
pub use reader::{FrameReader, PrefixWidth, split_fields};

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: &str = "1";

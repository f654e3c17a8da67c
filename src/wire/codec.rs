//! Frame encoders and the command vocabulary sent to the Router.

use thiserror::Error;

use super::PROTOCOL_VERSION;

/// Errors raised while framing an outgoing payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The payload does not fit the frame's length prefix.
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
}

fn frame_with_prefix(prefix: &[u8], payload_len: usize) -> Vec<u8> {
    let mut framed = Vec::with_capacity(prefix.len() + payload_len);
    framed.extend_from_slice(prefix);
    framed
}

/// Frame `payload` with a big-endian `u16` length prefix.
pub fn encode_short(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: usize::from(u16::MAX),
    })?;
    let mut framed = frame_with_prefix(&len.to_be_bytes(), payload.len());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Join `fields` with NUL separators and frame the result as a short frame.
pub fn encode_short_fields<S: AsRef<[u8]>>(fields: &[S]) -> Result<Vec<u8>, FrameError> {
    let total = fields.iter().map(|f| f.as_ref().len()).sum::<usize>()
        + fields.len().saturating_sub(1);
    let mut payload = Vec::with_capacity(total);
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            payload.push(0);
        }
        payload.extend_from_slice(field.as_ref());
    }
    encode_short(&payload)
}

/// Frame `payload` with a big-endian `u32` length prefix.
pub fn encode_long(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    let mut framed = frame_with_prefix(&len.to_be_bytes(), payload.len());
    framed.extend_from_slice(payload);
    Ok(framed)
}

/// Commands the client sends as short frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Init {
        node_name: &'a str,
    },
    OpenTransaction {
        txn_id: &'a str,
        app_group_name: &'a str,
        node_name: &'a str,
        category: &'a str,
        timestamp: &'a str,
        gateway_key: &'a str,
    },
    Log {
        txn_id: &'a str,
        timestamp: &'a str,
    },
    CloseTransaction {
        txn_id: &'a str,
        timestamp: &'a str,
    },
}

impl<'a> Command<'a> {
    /// Command name as it appears in the first field.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Init { .. } => "init",
            Command::OpenTransaction { .. } => "openTransaction",
            Command::Log { .. } => "log",
            Command::CloseTransaction { .. } => "closeTransaction",
        }
    }

    /// Field sequence for the command. Trailing empty fields produce the
    /// terminating NUL bytes the Router expects.
    pub fn fields(&self) -> Vec<&'a str> {
        match *self {
            Command::Init { node_name } => vec!["init", node_name, ""],
            Command::OpenTransaction {
                txn_id,
                app_group_name,
                node_name,
                category,
                timestamp,
                gateway_key,
            } => vec![
                "openTransaction",
                txn_id,
                app_group_name,
                node_name,
                category,
                timestamp,
                gateway_key,
                "true",
                "true",
                "",
                "",
            ],
            Command::Log { txn_id, timestamp } => vec!["log", txn_id, timestamp, ""],
            Command::CloseTransaction { txn_id, timestamp } => {
                vec!["closeTransaction", txn_id, timestamp, "true", ""]
            }
        }
    }

    /// Encode the command as a short frame.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode_short_fields(&self.fields())
    }
}

/// True when `fields` is a `version` reply announcing the supported version.
pub fn is_version<S: AsRef<str>>(fields: &[S]) -> bool {
    matches!(fields, [tag, version, ..] if tag.as_ref() == "version" && version.as_ref() == PROTOCOL_VERSION)
}

/// True when `fields` is a `status` reply reporting success.
pub fn is_status_ok<S: AsRef<str>>(fields: &[S]) -> bool {
    matches!(fields, [tag, status, ..] if tag.as_ref() == "status" && status.as_ref() == "ok")
}

/// Transaction ID assigned by the Router in an `openTransaction` reply.
pub fn assigned_txn_id<S: AsRef<str>>(fields: &[S]) -> Option<&str> {
    fields
        .get(2)
        .map(AsRef::as_ref)
        .filter(|id| !id.is_empty())
}

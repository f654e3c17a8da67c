//! Line formats for the two standard transaction categories.
//!
//! These helpers build the log lines for request and exception
//! transactions; they do not hook into any web framework.

use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Category for request traces.
pub const CATEGORY_REQUESTS: &str = "requests";
/// Category for exception traces.
pub const CATEGORY_EXCEPTIONS: &str = "exceptions";

/// Lines recorded for an incoming request.
pub fn request_lines(url: &str) -> Vec<String> {
    vec![format!("Got request for: {url}")]
}

/// An exception raised while serving a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExceptionReport {
    /// Correlation ID of the request that raised the exception.
    pub request_txn_id: Option<String>,
    pub message: String,
    pub class: String,
    pub backtrace: String,
}

impl ExceptionReport {
    pub fn new(message: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            class: class.into(),
            ..Self::default()
        }
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = backtrace.into();
        self
    }

    pub fn with_request_txn_id(mut self, txn_id: impl Into<String>) -> Self {
        self.request_txn_id = Some(txn_id.into());
        self
    }

    /// Render the report. Message and backtrace are base64 encoded since
    /// they may contain newlines.
    pub fn to_lines(&self) -> Vec<String> {
        vec![
            format!(
                "Request transaction ID: {}",
                self.request_txn_id.as_deref().unwrap_or_default()
            ),
            format!("Message: {}", STANDARD.encode(&self.message)),
            format!("Class: {}", self.class),
            format!("Backtrace: {}", STANDARD.encode(&self.backtrace)),
        ]
    }
}

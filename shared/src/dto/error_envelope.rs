use serde::{Deserialize, Serialize};

/// Structured record published to a service's error sink exchange whenever
/// a poison-pill record is skipped or an unexpected runtime error is
/// swallowed to keep a partition moving.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error_type: String,
    pub message: String,

    /// raw payload that triggered the failure, as received off the wire
    pub original_message: Option<String>,

    /// captured stack/error chain, if one was available at the call site
    pub traceback: Option<String>,

    /// free-form context, e.g. which routing key or offset this came from
    pub context: Option<String>,

    /// epoch milliseconds
    pub timestamp: i64,
}

impl ErrorEnvelope {
    pub fn new(
        error_type: impl Into<String>,
        message: impl Into<String>,
        original_message: Option<String>,
        traceback: Option<String>,
        context: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            original_message,
            traceback,
            context,
            timestamp,
        }
    }
}

mod connection;

pub use connection::*;

use serde::{Deserialize, Serialize};

/// JSON error body used by auth and internal failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            error: error.into(),
            code: code.map(str::to_string),
        }
    }
}

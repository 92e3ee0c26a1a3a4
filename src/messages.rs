//! Messages exchanged between the worker and its pages
//!
//! Pages send [`ClientMessage`]s to the worker; the worker broadcasts
//! [`WorkerMessage`]s to pages. Both travel as JSON objects tagged by `type`.

use serde::{Deserialize, Serialize};

/// Control messages a page can send to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Activate a waiting worker now
    SkipWaiting,
    /// Ask for the worker's version; answered on the reply channel
    GetVersion,
}

impl ClientMessage {
    /// Decodes a page message
    ///
    /// Returns `None` for anything that is not a recognized message, which the
    /// worker ignores.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        ClientMessage::deserialize(value).ok()
    }
}

/// Broadcasts from the worker to the pages it controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// A new version activated and took control
    SwUpdated {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    /// A version activated without replacing an older one
    SwActivated {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

impl WorkerMessage {
    pub fn version(&self) -> &str {
        match self {
            WorkerMessage::SwUpdated { version, .. } | WorkerMessage::SwActivated { version, .. } => {
                version
            }
        }
    }
}

/// Reply to [`ClientMessage::GetVersion`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub cache_name: String,
}

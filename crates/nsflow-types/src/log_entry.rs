use serde::{Deserialize, Serialize};

/// One line from the server's log channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    pub message: String,
    #[serde(default)]
    pub source: String,
}

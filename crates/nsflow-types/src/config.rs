use serde::{Deserialize, Serialize};

use crate::artifact::Variant;
use crate::{ClientError, Result};

/// Top-level client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base of the chat channel addresses (`ws://` or `http://` forms accepted)
    pub ws_base_url: String,
    /// Base of the HTTP read and persistence endpoints
    pub api_base_url: String,
    /// Agent that generates themes
    pub theme_agent: String,
    /// Agent that generates form widgets
    pub widget_agent: String,
    pub request_timeout_ms: u64,
    pub open_timeout_ms: u64,
    /// Server log entries kept in memory
    pub log_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws_base_url: DEFAULT_WS_BASE.to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            theme_agent: "cruse_theme_agent".to_string(),
            widget_agent: "cruse_widget_agent".to_string(),
            request_timeout_ms: 30_000,
            open_timeout_ms: 5_000,
            log_buffer_size: 100,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() || self.ws_base_url.trim().is_empty() {
            return Err(ClientError::Config("base URLs must not be empty".to_string()));
        }
        if self.theme_agent.trim().is_empty() || self.widget_agent.trim().is_empty() {
            return Err(ClientError::Config("agent names must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 || self.open_timeout_ms == 0 {
            return Err(ClientError::Config("timeouts must be positive".to_string()));
        }
        if self.log_buffer_size == 0 {
            return Err(ClientError::Config("log buffer must hold at least one entry".to_string()));
        }
        Ok(())
    }
}

/// Local theme preferences, persisted across sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThemePreferences {
    pub enabled: bool,
    pub variant: Variant,
}

const DEFAULT_WS_BASE: &str = "ws://localhost:4173";
const DEFAULT_API_BASE: &str = "http://localhost:4173";

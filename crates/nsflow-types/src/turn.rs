use serde::{Deserialize, Serialize};

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Agent,
    System,
}

/// A single entry in a conversation transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
    /// Agent network the turn came from (agent turns only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub network: Option<String>,
    pub timestamp: String,
}

impl Turn {
    fn new(sender: Sender, text: String, network: Option<String>) -> Self {
        Self {
            sender,
            text,
            network,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text.into(), None)
    }

    pub fn agent(text: impl Into<String>, network: impl Into<String>) -> Self {
        Self::new(Sender::Agent, text.into(), Some(network.into()))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text.into(), None)
    }

    /// True when `self` is an agent turn carrying exactly `text` from `network`.
    pub fn is_agent_repeat(&self, text: &str, network: Option<&str>) -> bool {
        self.sender == Sender::Agent && self.text == text && self.network.as_deref() == network
    }
}

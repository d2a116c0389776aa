use serde::{Deserialize, Serialize};

use crate::turn::{Sender, Turn};
use crate::widget::WidgetSpec;

/// A stored conversation as listed by the thread store.
/// Timestamps are kept as the server formats them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Body of a thread creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewThread {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

/// One stored transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub thread_id: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetSpec>,
    #[serde(default)]
    pub created_at: String,
}

impl ThreadMessage {
    /// Rebuild a transcript turn. Agent turns are tagged with `network`.
    pub fn to_turn(&self, network: Option<&str>) -> Turn {
        let network = match self.sender {
            Sender::Agent => network.map(str::to_string),
            Sender::User | Sender::System => None,
        };
        Turn {
            sender: self.sender,
            text: self.text.clone(),
            network,
            timestamp: self.created_at.clone(),
        }
    }
}

/// Body of a message append request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: Sender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetSpec>,
}

impl NewMessage {
    pub fn from_turn(turn: &Turn) -> Self {
        Self {
            sender: turn.sender,
            text: turn.text.clone(),
            widget: None,
        }
    }

    pub fn with_widget(mut self, widget: WidgetSpec) -> Self {
        self.widget = Some(widget);
        self
    }
}

/// A thread together with its messages, oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadDetail {
    #[serde(flatten)]
    pub thread: ThreadSummary,
    #[serde(default)]
    pub messages: Vec<ThreadMessage>,
}

impl ThreadDetail {
    pub fn turns(&self) -> Vec<Turn> {
        let network = self.thread.agent_name.as_deref();
        self.messages.iter().map(|m| m.to_turn(network)).collect()
    }
}

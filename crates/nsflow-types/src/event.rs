use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactSource, Variant};
use crate::turn::Turn;

/// Events emitted by the communication layer.
/// The view layer drains these for reactive updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientEvent {
    /// A channel finished its handshake
    ChannelConnected { agent: String },

    /// The transport reported an error
    ChannelError { agent: String, message: String },

    /// The channel closed (either side)
    ChannelClosed { agent: String, code: u16, reason: String },

    /// A turn was added to the transcript
    TurnAppended { turn: Turn },

    /// An inbound frame was ignored
    FrameDropped { agent: String, reason: String },

    /// An artifact is available for a subject
    ArtifactReady { subject: String, variant: Variant, source: ArtifactSource },

    /// Producing an artifact failed; callers fall back to defaults
    ArtifactFailed { subject: String, variant: Variant, reason: String },
}

/// Lifecycle of a channel, mirroring the WebSocket `readyState` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ChannelState {
    pub fn from_ready_state(state: u16) -> Self {
        match state {
            0 => ChannelState::Connecting,
            1 => ChannelState::Open,
            2 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }
}

//! Multi-turn chat over one open-ended channel.
//!
//! The handler owns at most one live channel. Inbound frames are buffered by
//! the channel's listener and folded into the transcript on `poll`, in arrival
//! order, the same way the view drains the event bus once per frame.

use std::rc::Rc;

use serde_json::{Map, Value};

use nsflow_types::{
    event::{ChannelState, ClientEvent},
    message::{InboundFrame, OutboundMessage},
    session::SessionId,
    turn::{Sender, Turn},
};
use crate::channel::{Channel, ChannelManager, FrameListener};
use crate::event_bus::EventBus;

/// Result of `ConversationStream::send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Whitespace-only input; nothing happened
    Empty,
    Sent,
    /// The user turn was recorded but could not be transmitted
    Undelivered,
}

struct LiveChannel {
    listener: FrameListener,
    channel: Channel,
}

pub struct ConversationStream {
    channels: Rc<ChannelManager>,
    events: EventBus,
    session: Option<SessionId>,
    live: Option<LiveChannel>,
    target: Option<String>,
    transcript: Vec<Turn>,
    sly_data: Map<String, Value>,
}

impl ConversationStream {
    pub fn new(channels: Rc<ChannelManager>, events: EventBus, session: Option<SessionId>) -> Self {
        Self {
            channels,
            events,
            session,
            live: None,
            target: None,
            transcript: Vec::new(),
            sly_data: Map::new(),
        }
    }

    /// Switch the conversation to `agent`, closing any current channel.
    /// Returns whether the new channel is usable.
    pub fn select_agent(&mut self, agent: &str) -> bool {
        self.disconnect();
        self.target = Some(agent.to_string());

        let channel = self
            .channels
            .open(agent, self.session.as_ref())
            .filter(|c| matches!(c.state(), ChannelState::Connecting | ChannelState::Open));

        match channel {
            Some(channel) => {
                let listener = channel.listen();
                self.live = Some(LiveChannel { listener, channel });
                self.push_turn(Turn::system(format!("Connected to {}", agent)));
                true
            }
            None => {
                self.push_turn(Turn::system(format!("Unable to reach {}", agent)));
                false
            }
        }
    }

    /// Fold every frame received since the last call into the transcript.
    /// Returns the number of turns appended.
    pub fn poll(&mut self) -> usize {
        let mut frames = Vec::new();
        if let Some(live) = self.live.as_mut() {
            while let Some(frame) = live.listener.try_next_frame() {
                frames.push(frame);
            }
        }
        frames.iter().filter(|f| self.handle_frame(f)).count()
    }

    /// Process one raw inbound frame. Returns true when a turn was appended.
    pub fn handle_frame(&mut self, raw: &str) -> bool {
        let message = match InboundFrame::parse(raw) {
            Ok(InboundFrame::Agent(message)) if message.is_ai() => message,
            Ok(InboundFrame::Agent(message)) => {
                log::debug!("Skipping {:?} frame", message.kind);
                self.dropped("not an AI message");
                return false;
            }
            Ok(InboundFrame::Unstructured) => {
                log::debug!("Skipping frame without a message object");
                self.dropped("no message object");
                return false;
            }
            Err(e) => {
                log::warn!("Dropping unparseable frame: {}", e);
                self.dropped("not JSON");
                return false;
            }
        };

        let Some(text) = message.text.map(|t| t.to_display()) else {
            self.dropped("AI message without text");
            return false;
        };

        let network = self.target.clone();
        let repeat = self
            .transcript
            .last()
            .is_some_and(|last| last.is_agent_repeat(&text, network.as_deref()));
        if repeat {
            log::debug!("Collapsing repeated agent turn");
            return false;
        }

        let mut turn = Turn::agent(text, String::new());
        turn.network = network;
        self.push_turn(turn);
        true
    }

    /// Record a user turn and transmit it.
    pub fn send(&mut self, text: &str) -> Delivery {
        if text.trim().is_empty() {
            return Delivery::Empty;
        }
        self.push_turn(Turn::user(text));

        let Some(live) = self.live.as_ref() else {
            log::warn!("No agent selected; message not sent");
            return Delivery::Undelivered;
        };

        let envelope = match OutboundMessage::text(text).with_sly_data(&self.sly_data) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Could not encode sly_data: {}", e);
                return Delivery::Undelivered;
            }
        };

        match live.channel.send(&envelope) {
            Ok(()) => Delivery::Sent,
            Err(e) => {
                log::warn!("Message to {} not sent: {}", live.channel.agent(), e);
                Delivery::Undelivered
            }
        }
    }

    /// Side-channel data attached to every following message.
    /// An empty map detaches it.
    pub fn set_sly_data(&mut self, data: Map<String, Value>) {
        self.sly_data = data;
    }

    pub fn sly_data(&self) -> &Map<String, Value> {
        &self.sly_data
    }

    pub fn disconnect(&mut self) {
        if let Some(live) = self.live.take() {
            log::info!("Leaving conversation with {}", live.channel.agent());
            live.channel.close();
        }
        self.target = None;
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Replace the transcript with previously stored turns.
    /// The live channel and target are left as they are.
    pub fn restore(&mut self, turns: Vec<Turn>) {
        log::debug!("Restoring {} turns", turns.len());
        self.transcript = turns;
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    /// Agent the conversation is currently addressed to
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn channel_state(&self) -> ChannelState {
        self.live
            .as_ref()
            .map(|l| l.channel.state())
            .unwrap_or(ChannelState::Closed)
    }

    /// The last `limit` user and agent turns, oldest first.
    pub fn recent_turns(&self, limit: usize) -> Vec<Turn> {
        let spoken: Vec<&Turn> = self
            .transcript
            .iter()
            .filter(|t| t.sender != Sender::System)
            .collect();
        let skip = spoken.len().saturating_sub(limit);
        spoken.into_iter().skip(skip).cloned().collect()
    }

    fn push_turn(&mut self, turn: Turn) {
        self.transcript.push(turn.clone());
        self.events.emit(ClientEvent::TurnAppended { turn });
    }

    fn dropped(&self, reason: &str) {
        self.events.emit(ClientEvent::FrameDropped {
            agent: self.target.clone().unwrap_or_default(),
            reason: reason.to_string(),
        });
    }
}

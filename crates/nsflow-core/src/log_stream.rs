//! Consumer for the server's log broadcast channel.
//!
//! Entries are buffered by the channel listener and folded into a bounded
//! history on `poll`; the oldest entries fall off once the history is full.

use std::collections::VecDeque;
use std::rc::Rc;

use nsflow_types::{event::ChannelState, log_entry::LogEntry};
use crate::channel::{Channel, ChannelManager, FrameListener};

struct LiveLog {
    listener: FrameListener,
    channel: Channel,
}

pub struct LogStream {
    channels: Rc<ChannelManager>,
    live: Option<LiveLog>,
    entries: VecDeque<LogEntry>,
    capacity: usize,
    malformed: usize,
}

impl LogStream {
    pub fn new(channels: Rc<ChannelManager>, capacity: usize) -> Self {
        Self {
            channels,
            live: None,
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            malformed: 0,
        }
    }

    /// (Re)open the log channel. Returns whether it is usable.
    pub fn connect(&mut self) -> bool {
        self.disconnect();
        let channel = self
            .channels
            .open_logs()
            .filter(|c| matches!(c.state(), ChannelState::Connecting | ChannelState::Open));
        match channel {
            Some(channel) => {
                let listener = channel.listen();
                self.live = Some(LiveLog { listener, channel });
                true
            }
            None => false,
        }
    }

    /// Fold buffered log frames into the history. Returns entries added.
    pub fn poll(&mut self) -> usize {
        let Some(live) = self.live.as_mut() else {
            return 0;
        };
        let mut added = 0;
        while let Some(frame) = live.listener.try_next_frame() {
            match serde_json::from_str::<LogEntry>(&frame) {
                Ok(entry) => {
                    if self.entries.len() == self.capacity {
                        self.entries.pop_front();
                    }
                    self.entries.push_back(entry);
                    added += 1;
                }
                Err(e) => {
                    log::debug!("Skipping log frame: {}", e);
                    self.malformed += 1;
                }
            }
        }
        added
    }

    /// Buffered entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Frames that were not log entries
    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub fn is_connected(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|l| matches!(l.channel.state(), ChannelState::Connecting | ChannelState::Open))
    }

    pub fn disconnect(&mut self) {
        if let Some(live) = self.live.take() {
            live.channel.close();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//! Channel manager: duplex message channels to named agents.
//!
//! A `Channel` wraps a platform transport together with a `FrameDispatcher`.
//! The transport pushes every inbound text frame into the dispatcher, which
//! fans it out to the listeners armed at that moment. Listeners deregister
//! themselves when dropped, so a consumer that stops listening can never
//! leak a registration.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use futures::channel::{mpsc, oneshot};
use futures::future::{select, Either};
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use nsflow_types::{
    ClientError, Result,
    event::{ChannelState, ClientEvent},
    message::OutboundMessage,
    session::SessionId,
};
use crate::event_bus::EventBus;
use crate::ports::{ChannelConnector, TimerPort, TransportPort};

const CHAT_PATH: &str = "/api/v1/ws/chat";
const LOGS_PATH: &str = "/api/v1/ws/logs";

/// Name the log channel reports under in lifecycle events
pub const LOG_CHANNEL_NAME: &str = "logs";

/// Characters `encodeURIComponent` leaves alone
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

// ─── Dispatcher ──────────────────────────────────────────────

#[derive(Default)]
struct DispatcherInner {
    next_id: u64,
    listeners: BTreeMap<u64, mpsc::UnboundedSender<String>>,
    open_waiters: Vec<oneshot::Sender<()>>,
}

/// Fans inbound frames out to armed listeners, in arrival order.
#[derive(Clone, Default)]
pub struct FrameDispatcher {
    inner: Rc<RefCell<DispatcherInner>>,
}

impl FrameDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one raw frame to every armed listener.
    pub fn dispatch(&self, frame: &str) {
        let inner = self.inner.borrow();
        for tx in inner.listeners.values() {
            let _ = tx.unbounded_send(frame.to_string());
        }
    }

    /// Arm a new listener. It stays registered until dropped.
    pub fn listen(&self) -> FrameListener {
        let (tx, rx) = mpsc::unbounded();
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, tx);
        FrameListener {
            id,
            receiver: rx,
            dispatcher: self.clone(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    fn opened(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.borrow_mut().open_waiters.push(tx);
        rx
    }

    fn notify_open(&self) {
        let waiters: Vec<_> = self.inner.borrow_mut().open_waiters.drain(..).collect();
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    fn remove(&self, id: u64) {
        self.inner.borrow_mut().listeners.remove(&id);
    }
}

/// One armed subscription to a channel's inbound frames
pub struct FrameListener {
    id: u64,
    receiver: mpsc::UnboundedReceiver<String>,
    dispatcher: FrameDispatcher,
}

impl FrameListener {
    /// Wait for the next frame. `None` once the channel is gone.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.receiver.next().await
    }

    /// Take a buffered frame without waiting.
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for FrameListener {
    fn drop(&mut self) {
        self.dispatcher.remove(self.id);
    }
}

// ─── Lifecycle hooks ─────────────────────────────────────────

/// Callbacks a transport invokes. They log and publish lifecycle
/// diagnostics and forward frames; payloads are never interpreted here.
#[derive(Clone)]
pub struct ChannelHooks {
    agent: String,
    dispatcher: FrameDispatcher,
    events: EventBus,
}

impl ChannelHooks {
    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn on_open(&self) {
        log::info!("Channel to {} connected", self.agent);
        self.events.emit(ClientEvent::ChannelConnected {
            agent: self.agent.clone(),
        });
        self.dispatcher.notify_open();
    }

    pub fn on_message(&self, frame: &str) {
        log::debug!("Frame from {}: {}", self.agent, frame);
        self.dispatcher.dispatch(frame);
    }

    pub fn on_error(&self, message: &str) {
        log::warn!("Channel to {} reported an error: {}", self.agent, message);
        self.events.emit(ClientEvent::ChannelError {
            agent: self.agent.clone(),
            message: message.to_string(),
        });
    }

    pub fn on_close(&self, code: u16, reason: &str) {
        log::info!("Channel to {} closed ({}): {}", self.agent, code, reason);
        self.events.emit(ClientEvent::ChannelClosed {
            agent: self.agent.clone(),
            code,
            reason: reason.to_string(),
        });
        // Wakes `wait_open` callers; they re-check the state and see it closed.
        self.dispatcher.notify_open();
    }
}

// ─── Channel ─────────────────────────────────────────────────

/// A duplex connection to one agent for one session.
/// Closed explicitly via `close()` or when dropped.
pub struct Channel {
    agent: String,
    session: Option<SessionId>,
    url: String,
    transport: Box<dyn TransportPort>,
    dispatcher: FrameDispatcher,
    closed: Cell<bool>,
}

impl Channel {
    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        if self.closed.get() {
            return ChannelState::Closed;
        }
        self.transport.state()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Send one outbound envelope.
    pub fn send(&self, message: &OutboundMessage) -> Result<()> {
        if !self.is_open() {
            return Err(ClientError::ChannelNotOpen {
                agent: self.agent.clone(),
            });
        }
        self.transport.send_text(&message.to_json()?)
    }

    pub fn listen(&self) -> FrameListener {
        self.dispatcher.listen()
    }

    pub fn listener_count(&self) -> usize {
        self.dispatcher.listener_count()
    }

    /// Wait until the handshake completes, at most `timeout_ms`.
    pub async fn wait_open(&self, timer: &dyn TimerPort, timeout_ms: u64) -> bool {
        match self.state() {
            ChannelState::Open => return true,
            ChannelState::Closing | ChannelState::Closed => return false,
            ChannelState::Connecting => {}
        }

        let opened = self.dispatcher.opened();
        match select(opened, timer.sleep(timeout_ms)).await {
            Either::Left((Ok(()), _)) => self.is_open(),
            Either::Left((Err(_), _)) => false,
            Either::Right(((), _)) => {
                log::warn!("Channel to {} did not open within {}ms", self.agent, timeout_ms);
                self.is_open()
            }
        }
    }

    pub fn close(&self) {
        if !self.closed.replace(true) {
            self.transport.close();
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

// ─── Manager ─────────────────────────────────────────────────

/// Opens channels against one base URL.
pub struct ChannelManager {
    base_url: String,
    connector: Rc<dyn ChannelConnector>,
    events: EventBus,
}

impl ChannelManager {
    pub fn new(base_url: impl Into<String>, connector: Rc<dyn ChannelConnector>, events: EventBus) -> Self {
        Self {
            base_url: base_url.into(),
            connector,
            events,
        }
    }

    /// Open a channel to `agent`. Returns `None` when the address is
    /// malformed or the transport cannot be constructed; callers treat that
    /// as "agent unreachable".
    pub fn open(&self, agent: &str, session: Option<&SessionId>) -> Option<Channel> {
        match channel_address(&self.base_url, agent, session) {
            Ok(url) => self.connect(agent, url, session),
            Err(e) => {
                log::warn!("Cannot open channel to {}: {}", agent, e);
                None
            }
        }
    }

    /// Open the server's log broadcast channel.
    pub fn open_logs(&self) -> Option<Channel> {
        match endpoint_address(&self.base_url, LOGS_PATH) {
            Ok(url) => self.connect(LOG_CHANNEL_NAME, url, None),
            Err(e) => {
                log::warn!("Cannot open log channel: {}", e);
                None
            }
        }
    }

    fn connect(&self, agent: &str, url: String, session: Option<&SessionId>) -> Option<Channel> {
        let dispatcher = FrameDispatcher::new();
        let hooks = ChannelHooks {
            agent: agent.to_string(),
            dispatcher: dispatcher.clone(),
            events: self.events.clone(),
        };

        match self.connector.connect(&url, hooks) {
            Ok(transport) => {
                log::info!("Opening channel {}", url);
                Some(Channel {
                    agent: agent.to_string(),
                    session: session.cloned(),
                    url,
                    transport,
                    dispatcher,
                    closed: Cell::new(false),
                })
            }
            Err(e) => {
                log::warn!("Transport to {} unavailable: {}", url, e);
                None
            }
        }
    }
}

/// Build `{base}/api/v1/ws/chat/{agent}[/{session}]`.
///
/// `http(s)` bases are mapped to `ws(s)`.
pub fn channel_address(base_url: &str, agent: &str, session: Option<&SessionId>) -> Result<String> {
    let agent = agent.trim();
    if agent.is_empty() || agent.contains('/') {
        return Err(ClientError::Config(format!("invalid agent name: {:?}", agent)));
    }

    let mut url = endpoint_address(base_url, CHAT_PATH)?;
    url.push('/');
    url.push_str(&path_segment(agent));
    if let Some(session) = session.filter(|s| !s.as_str().is_empty()) {
        url.push('/');
        url.push_str(&path_segment(session.as_str()));
    }
    Ok(url)
}

/// Build `{base}{path}` with `http(s)` bases mapped to `ws(s)`.
pub fn endpoint_address(base_url: &str, path: &str) -> Result<String> {
    let base = base_url.trim().trim_end_matches('/');
    let (scheme, rest) = base
        .split_once("://")
        .ok_or_else(|| ClientError::Config(format!("base URL has no scheme: {}", base_url)))?;

    let scheme = match scheme {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(ClientError::Config(format!("unsupported scheme: {}", other)));
        }
    };

    let host = rest.split('/').next().unwrap_or("");
    if host.is_empty() {
        return Err(ClientError::Config(format!("base URL has no host: {}", base_url)));
    }

    Ok(format!("{}://{}{}", scheme, rest, path))
}

/// Percent-encode `raw` as a single URL path segment.
pub fn path_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

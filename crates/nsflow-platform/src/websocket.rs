//! WebSocket transport for agent channels.
//!
//! Each transport owns its JS event handlers. The closures live exactly as
//! long as the transport; closing or dropping it detaches them from the
//! socket first, so the browser never calls into a freed closure.

use std::cell::Cell;

use wasm_bindgen::prelude::*;
use web_sys::{BinaryType, CloseEvent, Event, MessageEvent, WebSocket};

use nsflow_core::channel::ChannelHooks;
use nsflow_core::ports::{ChannelConnector, TransportPort};
use nsflow_types::{ClientError, Result, event::ChannelState};

/// Close code reported when the client ends the channel itself
const NORMAL_CLOSURE: u16 = 1000;

/// Opens browser WebSockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl ChannelConnector for WebSocketConnector {
    fn connect(&self, url: &str, hooks: ChannelHooks) -> Result<Box<dyn TransportPort>> {
        let socket = WebSocket::new(url)
            .map_err(|e| ClientError::Transport(format!("Failed to open {}: {:?}", url, e)))?;
        socket.set_binary_type(BinaryType::Arraybuffer);
        Ok(Box::new(WebSocketTransport::attach(socket, hooks)))
    }
}

pub struct WebSocketTransport {
    socket: WebSocket,
    hooks: ChannelHooks,
    detached: Cell<bool>,
    _onopen: Closure<dyn FnMut(Event)>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onerror: Closure<dyn FnMut(Event)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
}

impl WebSocketTransport {
    fn attach(socket: WebSocket, hooks: ChannelHooks) -> Self {
        let h = hooks.clone();
        let onopen = Closure::wrap(Box::new(move |_event: Event| {
            h.on_open();
        }) as Box<dyn FnMut(Event)>);

        let h = hooks.clone();
        let onmessage = Closure::wrap(Box::new(move |event: MessageEvent| {
            match event.data().as_string() {
                Some(text) => h.on_message(&text),
                None => log::debug!("Ignoring binary frame from {}", h.agent()),
            }
        }) as Box<dyn FnMut(MessageEvent)>);

        let h = hooks.clone();
        let onerror = Closure::wrap(Box::new(move |event: Event| {
            h.on_error(&format!("WebSocket error ({})", event.type_()));
        }) as Box<dyn FnMut(Event)>);

        let h = hooks.clone();
        let onclose = Closure::wrap(Box::new(move |event: CloseEvent| {
            h.on_close(event.code(), &event.reason());
        }) as Box<dyn FnMut(CloseEvent)>);

        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));

        Self {
            socket,
            hooks,
            detached: Cell::new(false),
            _onopen: onopen,
            _onmessage: onmessage,
            _onerror: onerror,
            _onclose: onclose,
        }
    }

    fn detach(&self) {
        self.socket.set_onopen(None);
        self.socket.set_onmessage(None);
        self.socket.set_onerror(None);
        self.socket.set_onclose(None);
    }
}

impl TransportPort for WebSocketTransport {
    fn state(&self) -> ChannelState {
        ChannelState::from_ready_state(self.socket.ready_state())
    }

    fn send_text(&self, text: &str) -> Result<()> {
        self.socket
            .send_with_str(text)
            .map_err(|e| ClientError::Transport(format!("send failed: {:?}", e)))
    }

    fn close(&self) {
        if self.detached.replace(true) {
            return;
        }
        let already_closed = self.socket.ready_state() == WebSocket::CLOSED;
        self.detach();
        if let Err(e) = self.socket.close() {
            log::warn!("Closing channel to {} failed: {:?}", self.hooks.agent(), e);
        }
        // The close handler is gone, so report the client-side close here.
        if !already_closed {
            self.hooks.on_close(NORMAL_CLOSURE, "closed by client");
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

//! Single-shot request/response over an uncorrelated channel.
//!
//! The channel carries no request ids, so the reply to a request is taken to
//! be the next final frame that arrives after it was sent. That only holds
//! while one request is in flight, so every call first acquires the client's
//! gate; later callers queue behind it.
//!
//! Each call races the reply listener against a timer. Whichever finishes
//! first wins and the other is dropped, which cancels the timer and removes
//! the listener on every path.

use std::fmt;
use std::rc::Rc;

use futures::future::{select, Either};
use futures::lock::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use nsflow_types::message::{InboundFrame, OutboundMessage};
use crate::channel::{Channel, FrameListener};
use crate::ports::TimerPort;

/// Why a call resolved to its fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// No channel, or the channel is not open
    Unavailable,
    SendFailed(String),
    Timeout,
    /// A frame that is not JSON, or a final reply without `text`
    MalformedFrame(String),
    /// The reply `text` is not valid JSON
    Unparseable(String),
    /// The channel went away while waiting
    Closed,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Unavailable => write!(f, "channel unavailable"),
            FallbackReason::SendFailed(e) => write!(f, "send failed: {}", e),
            FallbackReason::Timeout => write!(f, "timed out"),
            FallbackReason::MalformedFrame(e) => write!(f, "malformed frame: {}", e),
            FallbackReason::Unparseable(e) => write!(f, "unparseable reply: {}", e),
            FallbackReason::Closed => write!(f, "channel closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Reply(Value),
    Fallback(FallbackReason),
}

impl RequestOutcome {
    pub fn reply(self) -> Option<Value> {
        match self {
            RequestOutcome::Reply(v) => Some(v),
            RequestOutcome::Fallback(_) => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, RequestOutcome::Reply(_))
    }
}

pub struct CorrelatedRequestClient {
    timer: Rc<dyn TimerPort>,
    gate: Mutex<()>,
}

impl CorrelatedRequestClient {
    pub fn new(timer: Rc<dyn TimerPort>) -> Self {
        Self {
            timer,
            gate: Mutex::new(()),
        }
    }

    /// Send `payload` and wait for the reply, at most `timeout_ms`.
    /// Never fails: every problem resolves to `RequestOutcome::Fallback`.
    pub async fn request(&self, channel: Option<&Channel>, payload: &Value, timeout_ms: u64) -> RequestOutcome {
        let Some(channel) = channel.filter(|c| c.is_open()) else {
            log::debug!("Correlated request skipped: no open channel");
            return RequestOutcome::Fallback(FallbackReason::Unavailable);
        };

        let _in_flight = self.gate.lock().await;
        if !channel.is_open() {
            return RequestOutcome::Fallback(FallbackReason::Unavailable);
        }

        let envelope = match OutboundMessage::payload(payload) {
            Ok(e) => e,
            Err(e) => return RequestOutcome::Fallback(FallbackReason::SendFailed(e.to_string())),
        };

        let mut listener = channel.listen();
        let deadline = self.timer.sleep(timeout_ms);

        if let Err(e) = channel.send(&envelope) {
            log::warn!("Request to {} could not be sent: {}", channel.agent(), e);
            return RequestOutcome::Fallback(FallbackReason::SendFailed(e.to_string()));
        }

        let reply = Box::pin(await_reply(&mut listener));
        let outcome = match select(reply, deadline).await {
            Either::Left((outcome, _)) => {
                if let RequestOutcome::Fallback(reason) = &outcome {
                    log::warn!("Request to {} failed: {}", channel.agent(), reason);
                }
                outcome
            }
            Either::Right(((), _)) => {
                log::warn!("Request to {} timed out after {}ms", channel.agent(), timeout_ms);
                RequestOutcome::Fallback(FallbackReason::Timeout)
            }
        };
        outcome
    }

    /// Like `request`, decoding the reply into `T`; `fallback` covers every
    /// non-reply outcome and replies that do not decode.
    pub async fn request_or<T: DeserializeOwned>(
        &self,
        channel: Option<&Channel>,
        payload: &Value,
        timeout_ms: u64,
        fallback: T,
    ) -> T {
        match self.request(channel, payload, timeout_ms).await {
            RequestOutcome::Reply(value) => match serde_json::from_value(value) {
                Ok(decoded) => decoded,
                Err(e) => {
                    log::warn!("Reply does not match the expected shape: {}", e);
                    fallback
                }
            },
            RequestOutcome::Fallback(_) => fallback,
        }
    }
}

async fn await_reply(listener: &mut FrameListener) -> RequestOutcome {
    while let Some(raw) = listener.next_frame().await {
        match InboundFrame::parse(&raw) {
            Err(e) => return RequestOutcome::Fallback(FallbackReason::MalformedFrame(e.to_string())),
            Ok(InboundFrame::Unstructured) => {
                log::debug!("Ignoring informational frame");
            }
            Ok(InboundFrame::Agent(message)) if !message.is_final() => {
                log::debug!("Ignoring {:?} frame", message.kind);
            }
            Ok(InboundFrame::Agent(message)) => {
                return match message.text {
                    None => RequestOutcome::Fallback(FallbackReason::MalformedFrame(
                        "reply has no text".to_string(),
                    )),
                    Some(text) => match text.into_json() {
                        Ok(value) => RequestOutcome::Reply(value),
                        Err(e) => RequestOutcome::Fallback(FallbackReason::Unparseable(e.to_string())),
                    },
                };
            }
        }
    }
    RequestOutcome::Fallback(FallbackReason::Closed)
}

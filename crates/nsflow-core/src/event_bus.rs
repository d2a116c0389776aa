//! Event bus between the communication layer and the view layer.
//!
//! The bus is single-threaded (WASM constraint) and uses interior mutability
//! via RefCell. Events are buffered and drained by the view on each frame.
//! The buffer is bounded: once full, the oldest event is discarded, so a view
//! that never drains cannot grow it without limit.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use nsflow_types::event::ClientEvent;

/// Events kept when nobody drains the bus
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

struct Queue {
    events: VecDeque<ClientEvent>,
    capacity: usize,
    discarded: u64,
}

/// Shared event bus: clone-cheap via Rc.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<RefCell<Queue>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Queue {
                events: VecDeque::new(),
                capacity: capacity.max(1),
                discarded: 0,
            })),
        }
    }

    pub fn emit(&self, event: ClientEvent) {
        let mut queue = self.inner.borrow_mut();
        if queue.events.len() == queue.capacity {
            queue.events.pop_front();
            queue.discarded += 1;
            if queue.discarded == 1 {
                log::debug!("Event bus full; discarding oldest events until drained");
            }
        }
        queue.events.push_back(event);
    }

    /// Drain all pending events.
    pub fn drain(&self) -> Vec<ClientEvent> {
        let mut queue = self.inner.borrow_mut();
        if queue.discarded > 0 {
            log::debug!("{} events were discarded before this drain", queue.discarded);
            queue.discarded = 0;
        }
        queue.events.drain(..).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.borrow().events.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.inner.borrow().events.len()
    }

    /// Events lost to the capacity bound since the last drain
    pub fn discarded(&self) -> u64 {
        self.inner.borrow().discarded
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

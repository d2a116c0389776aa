//! Durable conversation threads.
//!
//! A `ThreadArchive` remembers which stored thread the live conversation
//! belongs to and appends transcript turns to it. With no active thread,
//! recording does nothing, so a conversation behaves the same with or without
//! a thread store behind it. Appends go through a gate so turns recorded by
//! concurrent callers keep their order.

use std::cell::RefCell;
use std::rc::Rc;

use futures::lock::Mutex;

use nsflow_types::{
    Result,
    thread::{NewMessage, NewThread, ThreadDetail, ThreadMessage, ThreadSummary},
    turn::{Sender, Turn},
    widget::WidgetSpec,
};
use crate::ports::ThreadStorePort;

/// Title used when a thread is created with a blank one
pub const DEFAULT_THREAD_TITLE: &str = "New conversation";

/// Page size the server applies when none is given
pub const MESSAGE_PAGE_SIZE: usize = 100;

pub struct ThreadArchive {
    store: Rc<dyn ThreadStorePort>,
    active: RefCell<Option<ThreadSummary>>,
    gate: Mutex<()>,
}

impl ThreadArchive {
    pub fn new(store: Rc<dyn ThreadStorePort>) -> Self {
        Self {
            store,
            active: RefCell::new(None),
            gate: Mutex::new(()),
        }
    }

    /// Thread new turns are recorded into
    pub fn active(&self) -> Option<ThreadSummary> {
        self.active.borrow().clone()
    }

    pub async fn list(&self) -> Result<Vec<ThreadSummary>> {
        self.store.list_threads().await
    }

    /// Create a thread and make it the active one.
    pub async fn create(&self, title: &str, agent: Option<&str>) -> Result<ThreadSummary> {
        let title = match title.trim() {
            "" => DEFAULT_THREAD_TITLE,
            t => t,
        };
        let request = NewThread {
            title: title.to_string(),
            agent_name: agent.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string),
        };
        let thread = self.store.create_thread(&request).await?;
        log::info!("Created thread {} ({})", thread.id, thread.title);
        *self.active.borrow_mut() = Some(thread.clone());
        Ok(thread)
    }

    /// Load a thread with its messages and make it the active one.
    /// An unknown id leaves the active thread unchanged.
    pub async fn open(&self, id: &str) -> Result<Option<ThreadDetail>> {
        let detail = self.store.get_thread(id).await?;
        match &detail {
            Some(detail) => {
                log::info!("Opened thread {} with {} messages", id, detail.messages.len());
                *self.active.borrow_mut() = Some(detail.thread.clone());
            }
            None => log::warn!("Thread {} not found", id),
        }
        Ok(detail)
    }

    /// Delete a thread. Deleting the active thread deactivates it.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.store.delete_thread(id).await?;
        let is_active = self.active.borrow().as_ref().is_some_and(|t| t.id == id);
        if is_active {
            self.close();
        }
        Ok(removed)
    }

    /// Stop recording into the active thread.
    pub fn close(&self) {
        self.active.borrow_mut().take();
    }

    pub async fn messages(&self, id: &str, limit: usize, offset: usize) -> Result<Vec<ThreadMessage>> {
        self.store.list_messages(id, limit, offset).await
    }

    /// Append user and agent turns to the active thread, in order.
    /// System turns are local status lines and are not stored.
    /// Returns how many messages were stored.
    pub async fn record(&self, turns: &[Turn]) -> Result<usize> {
        let _ordered = self.gate.lock().await;
        let Some(thread_id) = self.active_id() else {
            return Ok(0);
        };
        let mut stored = 0;
        for turn in turns.iter().filter(|t| t.sender != Sender::System) {
            self.store
                .append_message(&thread_id, &NewMessage::from_turn(turn))
                .await?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Append an agent turn that carried a form widget.
    /// Returns false when no thread is active.
    pub async fn record_widget(&self, turn: &Turn, widget: &WidgetSpec) -> Result<bool> {
        let _ordered = self.gate.lock().await;
        let Some(thread_id) = self.active_id() else {
            return Ok(false);
        };
        let message = NewMessage::from_turn(turn).with_widget(widget.clone());
        self.store.append_message(&thread_id, &message).await?;
        Ok(true)
    }

    fn active_id(&self) -> Option<String> {
        self.active.borrow().as_ref().map(|t| t.id.clone())
    }
}

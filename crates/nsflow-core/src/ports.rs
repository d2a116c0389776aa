//! Port traits: the hexagonal architecture boundary.
//!
//! These traits are defined here in `nsflow-core` (pure Rust).
//! Implementations live in `nsflow-platform` (browser adapters).
//! The core never imports platform code; it only depends on these traits.

use std::future::Future;
use std::pin::Pin;
use async_trait::async_trait;
use serde_json::Value;
use nsflow_types::{
    Result,
    artifact::{ArtifactRecord, Variant},
    event::ChannelState,
    network::NetworkGraph,
    thread::{NewMessage, NewThread, ThreadDetail, ThreadMessage, ThreadSummary},
};
use crate::channel::ChannelHooks;

// ─── Channel Ports ───────────────────────────────────────────

/// The raw duplex pipe behind a `Channel`.
pub trait TransportPort {
    fn state(&self) -> ChannelState;

    /// Send one text frame
    fn send_text(&self, text: &str) -> Result<()>;

    /// Close the connection. Idempotent.
    fn close(&self);
}

/// Opens transports. The connector reports lifecycle and inbound frames
/// through `hooks`; it never interprets payloads.
pub trait ChannelConnector {
    fn connect(&self, url: &str, hooks: ChannelHooks) -> Result<Box<dyn TransportPort>>;
}

// ─── Timer Port ──────────────────────────────────────────────

pub trait TimerPort {
    /// A future that completes after `ms` milliseconds.
    /// Dropping it before completion cancels the timer.
    fn sleep(&self, ms: u64) -> Pin<Box<dyn Future<Output = ()>>>;
}

// ─── Remote Collaborators ────────────────────────────────────

/// Durable artifact store (HTTP in the browser)
#[async_trait(?Send)]
pub trait ArtifactStorePort {
    /// `Ok(None)` when the subject has no record at all
    async fn fetch_artifact(&self, subject: &str) -> Result<Option<ArtifactRecord>>;

    /// Overwrite one variant slot; sibling slots are untouched
    async fn save_artifact(&self, subject: &str, variant: Variant, artifact: &Value) -> Result<()>;
}

/// Read endpoint for a subject's descriptive data
#[async_trait(?Send)]
pub trait ConnectivityPort {
    async fn fetch_network(&self, subject: &str) -> Result<NetworkGraph>;
}

/// Durable conversation threads (HTTP in the browser)
#[async_trait(?Send)]
pub trait ThreadStorePort {
    /// Most recently updated first
    async fn list_threads(&self) -> Result<Vec<ThreadSummary>>;

    async fn create_thread(&self, thread: &NewThread) -> Result<ThreadSummary>;

    /// `Ok(None)` when no such thread exists
    async fn get_thread(&self, id: &str) -> Result<Option<ThreadDetail>>;

    /// Removes the thread and its messages. `Ok(false)` when it did not exist.
    async fn delete_thread(&self, id: &str) -> Result<bool>;

    async fn append_message(&self, thread_id: &str, message: &NewMessage) -> Result<ThreadMessage>;

    /// Oldest first, one page at a time
    async fn list_messages(&self, thread_id: &str, limit: usize, offset: usize) -> Result<Vec<ThreadMessage>>;
}

// ─── Storage Port ────────────────────────────────────────────

/// Local string key-value store for preferences and config
#[async_trait(?Send)]
pub trait StoragePort {
    /// Get a value by key
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Name of this backend (for logging/debug)
    fn backend_name(&self) -> &str;
}

//! Agent communication layer: channels, correlated requests, cached
//! generation, conversations, stored threads, the server log feed and schema
//! validation. No platform dependencies;
//! browser adapters implement the traits in `ports`.

pub mod ports;
pub mod event_bus;
pub mod schema;
pub mod channel;
pub mod correlated;
pub mod generation;
pub mod conversation;
pub mod threads;
pub mod log_stream;
pub mod widget;
pub mod preferences;

//! Browser adapters for the ports defined in `nsflow-core`.

pub mod websocket;
pub mod timer;
pub mod http;
pub mod storage;

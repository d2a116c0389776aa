pub mod message;
pub mod event;
pub mod turn;
pub mod artifact;
pub mod network;
pub mod widget;
pub mod thread;
pub mod log_entry;
pub mod config;
pub mod error;
pub mod session;


pub use error::ClientError;
pub type Result<T> = std::result::Result<T, ClientError>;

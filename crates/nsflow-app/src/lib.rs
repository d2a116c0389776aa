//! nsflow client: WASM entry point.
//!
//! This crate is the composition root (DI wiring layer).
//! It assembles the platform adapters and exposes the communication layer
//! to the dashboard's view layer through `NsflowClient`.

mod client;

pub use client::{create_client, NsflowClient};

use wasm_bindgen::prelude::*;

/// WASM entry point, runs when the module is instantiated
#[wasm_bindgen(start)]
pub fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("nsflow client starting...");
}

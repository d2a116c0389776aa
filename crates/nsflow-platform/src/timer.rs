//! `setTimeout`-backed timer.

use std::future::Future;
use std::pin::Pin;

use gloo_timers::future::TimeoutFuture;
use nsflow_core::ports::TimerPort;

/// Dropping a pending sleep clears the underlying browser timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserTimer;

impl TimerPort for BrowserTimer {
    fn sleep(&self, ms: u64) -> Pin<Box<dyn Future<Output = ()>>> {
        let ms = u32::try_from(ms).unwrap_or(u32::MAX);
        Box::pin(TimeoutFuture::new(ms))
    }
}

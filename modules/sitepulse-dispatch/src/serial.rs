//! Strict serialization for a rate-sensitive external service: at most one
//! call in flight system-wide, with an optional forced delay between calls.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;

pub struct SerialExecutor {
    lock: Mutex<()>,
    inter_call_delay: Duration,
}

impl SerialExecutor {
    pub fn new(inter_call_delay: Duration) -> Self {
        Self {
            lock: Mutex::new(()),
            inter_call_delay,
        }
    }

    /// Run `work` inside the critical section. The delay, when configured,
    /// is paid while still holding the section so the next caller cannot
    /// start early.
    pub async fn run<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        let out = work.await;
        if !self.inter_call_delay.is_zero() {
            tokio::time::sleep(self.inter_call_delay).await;
        }
        out
    }
}

//! Per-address admission rate limiting
//!
//! Sliding-window counters keyed by source IP, checked before any
//! authentication work is done for an upgrade request.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Window {
    count: u32,
    expires_at: Instant,
}

/// Rate limiter for connection attempts per source address
pub struct ConnectionRateLimiter {
    windows: Mutex<HashMap<IpAddr, Window>>,
    max_attempts: u32,
    window: Duration,
}

impl ConnectionRateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    /// Check whether a new connection attempt from this address is allowed.
    ///
    /// A denied attempt still increments the counter, so hammering an
    /// exhausted window keeps being denied rather than resetting it.
    pub async fn allow(&self, addr: IpAddr) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        match windows.get_mut(&addr) {
            Some(window) if now < window.expires_at => {
                window.count += 1;
                window.count <= self.max_attempts
            }
            _ => {
                windows.insert(
                    addr,
                    Window {
                        count: 1,
                        expires_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    /// Drop expired windows to bound map growth
    pub async fn sweep(&self) {
        let now = Instant::now();
        self.windows.lock().await.retain(|_, w| now < w.expires_at);
    }

    /// Number of addresses currently tracked
    pub async fn tracked_addresses(&self) -> usize {
        self.windows.lock().await.len()
    }

    /// Start the periodic sweep task
    pub fn start_sweep_task(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        });
    }
}

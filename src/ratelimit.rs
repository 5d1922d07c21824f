//! Per-client-IP rate limiter (spec.md §4.5.2, §9).
//!
//! spec.md's Open Questions leave the exact sliding-window eviction
//! policy unpinned ("the source implies 'sliding window' but doesn't pin
//! the eviction policy"). We implement a fixed 60-second window per
//! client IP — see DESIGN.md for the recorded decision. `/health` is
//! exempt and never passes through this limiter.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Window {
    started_at: Instant,
    count: u32,
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, Window>>,
    limit_per_minute: u32,
}

pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub limit: u32,
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(limit_per_minute: u32) -> Self {
        RateLimiter {
            windows: Arc::new(DashMap::new()),
            limit_per_minute,
        }
    }

    /// Check and record one request from `client_ip`. Windows are
    /// 60 seconds wide and reset wholesale once elapsed, rather than
    /// sliding continuously — the simplest eviction policy that
    /// satisfies "sliding window per client IP" without committing to a
    /// token-bucket or log-based implementation spec.md didn't specify.
    pub fn check(&self, client_ip: &str) -> Decision {
        let now = Instant::now();
        let mut entry = self
            .windows
            .entry(client_ip.to_string())
            .or_insert_with(|| Window {
                started_at: now,
                count: 0,
            });

        if now.duration_since(entry.started_at) >= Duration::from_secs(60) {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.limit_per_minute {
            let elapsed = now.duration_since(entry.started_at).as_secs();
            return Decision {
                allowed: false,
                remaining: 0,
                limit: self.limit_per_minute,
                retry_after_secs: 60u64.saturating_sub(elapsed),
            };
        }

        entry.count += 1;
        Decision {
            allowed: true,
            remaining: self.limit_per_minute - entry.count,
            limit: self.limit_per_minute,
            retry_after_secs: 0,
        }
    }
}

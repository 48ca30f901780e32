//! Per-key sliding window state.

use serde::Serialize;
use std::collections::VecDeque;

use super::rules::CategoryConfig;

/// Outcome of a consuming rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether the request may proceed (and has been counted)
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Epoch milliseconds at which quota frees up
    pub reset_time: u64,
    /// Milliseconds to wait before retrying, set only on rejection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Read-only snapshot of a key's quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub reset_time: u64,
    pub total: u32,
}

impl RateLimitInfo {
    /// Quota for a key that has never been seen.
    pub fn untouched(now: u64, config: &CategoryConfig) -> Self {
        Self {
            remaining: config.max_requests,
            reset_time: now.saturating_add(config.window_ms),
            total: config.max_requests,
        }
    }
}

/// Request history and block state for one `category:identifier` key.
///
/// `requests` holds the timestamps of permitted requests in chronological
/// order; expired timestamps are dropped lazily.
#[derive(Debug, Clone, Default)]
pub struct RateLimitEntry {
    requests: VecDeque<u64>,
    blocked_until: Option<u64>,
}

impl RateLimitEntry {
    /// Create an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one request at `now`, consuming quota if it is allowed.
    pub fn check(&mut self, now: u64, config: &CategoryConfig) -> RateLimitResult {
        if let Some(until) = self.active_block(now) {
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_time: until,
                retry_after: Some(until - now),
            };
        }
        self.blocked_until = None;
        self.prune(now, config.window_ms);

        let used = self.requests.len();
        let max = config.max_requests as usize;

        if used >= max {
            let reset_time = self.window_reset(now, config.window_ms);
            let retry_after = match config.block_duration_ms {
                Some(block) => {
                    self.blocked_until = Some(now.saturating_add(block));
                    block
                }
                None => reset_time.saturating_sub(now),
            };
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_time,
                retry_after: Some(retry_after),
            };
        }

        self.record(now);
        RateLimitResult {
            allowed: true,
            remaining: (max - used - 1) as u32,
            reset_time: self.window_reset(now, config.window_ms),
            retry_after: None,
        }
    }

    /// Describe the quota at `now` without touching the entry.
    pub fn info(&self, now: u64, config: &CategoryConfig) -> RateLimitInfo {
        if let Some(until) = self.active_block(now) {
            return RateLimitInfo {
                remaining: 0,
                reset_time: until,
                total: config.max_requests,
            };
        }
        let live = self.live_count(now, config.window_ms);
        RateLimitInfo {
            remaining: config.max_requests.saturating_sub(live as u32),
            reset_time: self.window_reset(now, config.window_ms),
            total: config.max_requests,
        }
    }

    /// Drop expired history and a lapsed block.
    ///
    /// Returns `true` when nothing is left, i.e. the entry may be evicted.
    pub fn sweep(&mut self, now: u64, window_ms: u64) -> bool {
        if self.active_block(now).is_none() {
            self.blocked_until = None;
        }
        self.prune(now, window_ms);
        self.is_empty() && self.blocked_until.is_none()
    }

    /// The block deadline, if one is in force at `now`.
    pub fn active_block(&self, now: u64) -> Option<u64> {
        self.blocked_until.filter(|&until| now < until)
    }

    /// Number of recorded requests, expired ones included until the next prune.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn record(&mut self, now: u64) {
        // Keep the history ordered even if the wall clock steps backwards.
        let ts = self.requests.back().map_or(now, |&last| last.max(now));
        self.requests.push_back(ts);
    }

    /// Keep only timestamps strictly newer than `now - window_ms`.
    fn prune(&mut self, now: u64, window_ms: u64) {
        while let Some(&front) = self.requests.front() {
            if front.saturating_add(window_ms) <= now {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }

    fn first_live_index(&self, now: u64, window_ms: u64) -> usize {
        self.requests
            .partition_point(|&ts| ts.saturating_add(window_ms) <= now)
    }

    fn live_count(&self, now: u64, window_ms: u64) -> usize {
        self.requests.len() - self.first_live_index(now, window_ms)
    }

    fn oldest_live(&self, now: u64, window_ms: u64) -> Option<u64> {
        self.requests
            .get(self.first_live_index(now, window_ms))
            .copied()
    }

    /// When the oldest counted request leaves the window.
    fn window_reset(&self, now: u64, window_ms: u64) -> u64 {
        self.oldest_live(now, window_ms)
            .unwrap_or(now)
            .saturating_add(window_ms)
    }
}

//! Core rate limiter implementation.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::config::LimiterConfig;
use crate::error::{RateLimitExceeded, Result};

use super::clock::{Clock, SystemClock};
use super::entry::{RateLimitEntry, RateLimitInfo, RateLimitResult};
use super::key::LimitKey;
use super::routing::category_for_endpoint;
use super::rules::{builtin_categories, CategoryConfig, DEFAULT_CATEGORY};

/// Identifier used for API requests made without a signed-in user.
pub const ANONYMOUS: &str = "anonymous";

/// The registry of rate limit categories and per-key request history.
///
/// This struct is thread-safe and is meant to be constructed once and shared
/// behind an `Arc` with everything that issues network requests. A check and
/// the quota it consumes happen under the entry's lock, so concurrent callers
/// sharing a key are linearized.
pub struct RateLimiter {
    /// Request history indexed by `category:identifier`
    entries: DashMap<LimitKey, RateLimitEntry>,
    /// Category name -> policy
    categories: RwLock<HashMap<String, CategoryConfig>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter with the built-in categories and the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a rate limiter with the built-in categories and a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            categories: RwLock::new(builtin_categories()),
            clock,
        }
    }

    /// Create a rate limiter with the built-ins overlaid by configured categories.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        let limiter = Self::new();
        limiter.apply_categories(&config.categories)?;
        Ok(limiter)
    }

    /// Register or overwrite every category in `categories`.
    ///
    /// Stops at the first invalid policy; categories before it stay applied.
    pub fn apply_categories(&self, categories: &HashMap<String, CategoryConfig>) -> Result<()> {
        for (name, config) in categories {
            self.set_config(name, *config)?;
        }
        Ok(())
    }

    /// Register or overwrite a category.
    pub fn set_config(&self, name: &str, config: CategoryConfig) -> Result<()> {
        config.validate(name)?;
        let previous = self.categories.write().insert(name.to_string(), config);
        info!(
            category = name,
            max_requests = config.max_requests,
            window = ?config.window(),
            block_duration_ms = ?config.block_duration_ms,
            replaced = previous.is_some(),
            "Rate limit category configured"
        );
        Ok(())
    }

    /// The policy applied to `category`, after falling back to `default`.
    pub fn config_for(&self, category: &str) -> CategoryConfig {
        resolve(&self.categories.read(), category)
    }

    /// Snapshot of every registered category.
    pub fn categories(&self) -> HashMap<String, CategoryConfig> {
        self.categories.read().clone()
    }

    /// Check and consume one request for `identifier` under `category`.
    ///
    /// An allowed result has already been counted. Rejections are reported
    /// through `allowed = false`, never as an error.
    pub fn check_limit(&self, identifier: &str, category: &str) -> RateLimitResult {
        let config = self.config_for(category);
        let now = self.clock.now_millis();

        trace!(
            category = category,
            identifier = identifier,
            now = now,
            "Checking rate limit"
        );

        let result = {
            let mut entry = self
                .entries
                .entry(LimitKey::new(category, identifier))
                .or_insert_with(|| {
                    debug!(
                        category = category,
                        identifier = identifier,
                        max_requests = config.max_requests,
                        window_ms = config.window_ms,
                        "Creating new rate limit entry"
                    );
                    RateLimitEntry::new()
                });
            entry.check(now, &config)
        };

        if !result.allowed {
            debug!(
                category = category,
                identifier = identifier,
                retry_after = ?result.retry_after,
                reset_time = result.reset_time,
                "Rate limit exceeded"
            );
        }
        result
    }

    /// Check and consume one request against the category derived from `endpoint`.
    pub fn check_endpoint(&self, endpoint: &str, user_id: Option<&str>) -> RateLimitResult {
        let category = category_for_endpoint(endpoint);
        let identifier = user_id.unwrap_or(ANONYMOUS);
        let result = self.check_limit(identifier, category);

        if !result.allowed {
            warn!(
                category = category,
                identifier = identifier,
                endpoint = endpoint,
                retry_after = ?result.retry_after,
                "API request rate limited"
            );
        }
        result
    }

    /// Whether a request to `endpoint` may be issued now. Consumes quota when it may.
    pub fn can_make_api_request(&self, endpoint: &str, user_id: Option<&str>) -> bool {
        self.check_endpoint(endpoint, user_id).allowed
    }

    /// Describe the quota for a key without consuming any.
    pub fn get_info(&self, identifier: &str, category: &str) -> RateLimitInfo {
        let config = self.config_for(category);
        let now = self.clock.now_millis();

        self.entries
            .get(&LimitKey::new(category, identifier))
            .map(|entry| entry.info(now, &config))
            .unwrap_or_else(|| RateLimitInfo::untouched(now, &config))
    }

    /// Forget the history and any block for one key.
    pub fn clear_limit(&self, identifier: &str, category: &str) {
        if self.entries.remove(&LimitKey::new(category, identifier)).is_some() {
            debug!(category = category, identifier = identifier, "Rate limit entry cleared");
        }
    }

    /// Forget every key. Categories are kept.
    pub fn clear_all(&self) {
        self.entries.clear();
    }

    /// Prune expired history, lift lapsed blocks and evict empty entries.
    ///
    /// Returns the number of evicted entries.
    pub fn cleanup(&self) -> usize {
        let categories = self.categories.read().clone();
        let now = self.clock.now_millis();
        let before = self.entries.len();

        self.entries.retain(|key, entry| {
            let window_ms = resolve(&categories, &key.category).window_ms;
            !entry.sweep(now, window_ms)
        });

        let evicted = before.saturating_sub(self.entries.len());
        debug!(evicted = evicted, remaining = self.entries.len(), "Rate limit cleanup finished");
        evicted
    }

    /// Run `operation` only if the key has quota left.
    ///
    /// A rejection is converted into the caller's error type; the operation's
    /// own error is returned unchanged.
    pub async fn with_rate_limit<F, Fut, T, E>(
        &self,
        identifier: &str,
        category: &str,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<RateLimitExceeded>,
    {
        let result = self.check_limit(identifier, category);
        if !result.allowed {
            let exceeded = RateLimitExceeded {
                retry_after: result.retry_after.unwrap_or_default(),
                reset_time: result.reset_time,
            };
            debug!(
                category = category,
                identifier = identifier,
                retry_after = ?exceeded.retry_after_duration(),
                "Rate-limited operation rejected"
            );
            return Err(exceeded.into());
        }
        operation().await
    }

    /// Get the number of live entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(categories: &HashMap<String, CategoryConfig>, category: &str) -> CategoryConfig {
    match categories.get(category) {
        Some(config) => *config,
        None => {
            trace!(category = category, "Unknown category, using default");
            categories
                .get(DEFAULT_CATEGORY)
                .copied()
                .unwrap_or_default()
        }
    }
}

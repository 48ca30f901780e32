//! Rate limiting logic and state management.

mod cleanup;
mod clock;
mod entry;
mod key;
mod limiter;
mod routing;
mod rules;

pub use cleanup::{CleanupTask, DEFAULT_CLEANUP_INTERVAL};
pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use entry::{RateLimitEntry, RateLimitInfo, RateLimitResult};
pub use key::LimitKey;
pub use limiter::{RateLimiter, ANONYMOUS};
pub use routing::category_for_endpoint;
pub use rules::{builtin_categories, CategoryConfig, DEFAULT_CATEGORY};

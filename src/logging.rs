//! Rate-limited logging (spec §7: "Log messages are rate-limited per
//! `(category, message)` pair at ≥ 1s").
//!
//! Generalizes the teacher's `ContextState::should_warn_at` pattern
//! (`src/main.rs`) - which dedups "already warned at this threshold" - into a
//! dedup keyed on an arbitrary `(category, message)` pair with a configurable
//! window. The library itself never initializes a `tracing` subscriber (that
//! is the host binary's job, same division as the teacher's `main()`); this
//! type only decides whether a given `tracing::warn!`/`debug!` call should
//! fire this time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum spacing between repeated log lines for the same category+message.
pub const DEFAULT_LOG_WINDOW: Duration = Duration::from_secs(1);

/// Tracks the last-emitted time per `(category, message)` pair.
pub struct RateLimitedLogger {
    window: Duration,
    last_emitted: Mutex<HashMap<(String, String), Instant>>,
}

impl RateLimitedLogger {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if a log for this category+message should be emitted
    /// now (and records that it was).
    pub fn should_emit(&self, category: &str, message: &str) -> bool {
        self.should_emit_at(category, message, Instant::now())
    }

    /// Deterministic variant for tests.
    pub fn should_emit_at(&self, category: &str, message: &str, now: Instant) -> bool {
        let key = (category.to_string(), message.to_string());
        let mut last = self.last_emitted.lock().unwrap();
        match last.get(&key) {
            Some(prev) if now.duration_since(*prev) < self.window => false,
            _ => {
                last.insert(key, now);
                true
            }
        }
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_WINDOW)
    }
}

/// Emit a `tracing::debug!` line through a [`RateLimitedLogger`], throttled
/// per spec §7. Used by the remote client for noisy failure paths
/// (timeouts, non-2xx statuses) so a flaky connection doesn't flood logs.
#[macro_export]
macro_rules! log_throttled {
    ($logger:expr, $category:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        if $logger.should_emit($category, &message) {
            tracing::debug!("[{}] {}", $category, message);
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_emits() {
        let logger = RateLimitedLogger::new(Duration::from_secs(1));
        assert!(logger.should_emit("remote", "timeout"));
    }

    #[test]
    fn repeat_within_window_is_suppressed() {
        let logger = RateLimitedLogger::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(logger.should_emit_at("remote", "timeout", t0));
        assert!(!logger.should_emit_at("remote", "timeout", t0 + Duration::from_millis(500)));
    }

    #[test]
    fn repeat_after_window_emits_again() {
        let logger = RateLimitedLogger::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(logger.should_emit_at("remote", "timeout", t0));
        assert!(logger.should_emit_at("remote", "timeout", t0 + Duration::from_millis(1001)));
    }

    #[test]
    fn distinct_categories_are_independent() {
        let logger = RateLimitedLogger::new(Duration::from_secs(1));
        let t0 = Instant::now();
        assert!(logger.should_emit_at("remote", "timeout", t0));
        assert!(logger.should_emit_at("quota", "timeout", t0));
    }
}

//! Engine configuration.
//!
//! Loads settings from environment variables with sensible defaults.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Tunables for the admission engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum live waitlist entries per event
    pub waitlist_limit: u32,
    /// Hours after deactivation during which attendees may rate the event
    pub rating_window_hours: u32,
    /// Load-decide-commit attempts before a version conflict is surfaced
    pub commit_attempts: u32,
    /// Backoff between conflicting commit attempts
    pub commit_backoff: RetryPolicy,
    /// Re-delivery of notifications after transport errors
    pub notify_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            waitlist_limit: 5,
            rating_window_hours: 168,
            commit_attempts: 3,
            commit_backoff: RetryPolicy::builder()
                .initial_delay(Duration::from_millis(10))
                .max_delay(Duration::from_millis(200))
                .build(),
            notify_retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to the defaults:
    ///
    /// - `EVENTDESK_WAITLIST_LIMIT` (5)
    /// - `EVENTDESK_RATING_WINDOW_HOURS` (168)
    /// - `EVENTDESK_COMMIT_ATTEMPTS` (3)
    /// - `EVENTDESK_NOTIFY_MAX_RETRIES` (3)
    /// - `EVENTDESK_NOTIFY_INITIAL_DELAY_MS` (100)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            waitlist_limit: parsed("EVENTDESK_WAITLIST_LIMIT").unwrap_or(defaults.waitlist_limit),
            rating_window_hours: parsed("EVENTDESK_RATING_WINDOW_HOURS")
                .unwrap_or(defaults.rating_window_hours),
            commit_attempts: parsed("EVENTDESK_COMMIT_ATTEMPTS")
                .unwrap_or(defaults.commit_attempts)
                .max(1),
            commit_backoff: defaults.commit_backoff,
            notify_retry: RetryPolicy::builder()
                .max_retries(
                    parsed("EVENTDESK_NOTIFY_MAX_RETRIES")
                        .unwrap_or(defaults.notify_retry.max_retries),
                )
                .initial_delay(Duration::from_millis(
                    parsed("EVENTDESK_NOTIFY_INITIAL_DELAY_MS").unwrap_or(100),
                ))
                .build(),
        }
    }

    /// How long after deactivation ratings are accepted
    #[must_use]
    pub fn rating_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.rating_window_hours))
    }

    /// Same settings with retries and backoff waits removed (for tests)
    #[must_use]
    pub fn without_delays(mut self) -> Self {
        self.commit_backoff = RetryPolicy {
            max_retries: self.commit_backoff.max_retries,
            ..RetryPolicy::none()
        };
        self.notify_retry = RetryPolicy {
            max_retries: self.notify_retry.max_retries,
            ..RetryPolicy::none()
        };
        self
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

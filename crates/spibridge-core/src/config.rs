//! Subscription configuration.

use std::time::Duration;

use spibridge_proto::ALL_EVENTS;

use crate::error::Error;

/// Default poll timeout in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1_000;

/// Default upper bound for caller-supplied poll timeouts (5 minutes).
pub const DEFAULT_MAX_POLL_TIMEOUT_MS: u64 = 300_000;

/// Subscription configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Event type mask used when registering with a notification source.
    pub event_types: u32,

    /// Timeout for polls that do not pass one explicitly.
    pub poll_timeout: Duration,

    /// Poll timeouts above this are clamped.
    pub max_poll_timeout: Duration,
}

impl SubscriptionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            event_types: ALL_EVENTS,
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            max_poll_timeout: Duration::from_millis(DEFAULT_MAX_POLL_TIMEOUT_MS),
        }
    }

    /// Set the event type mask.
    pub fn with_event_types(mut self, mask: u32) -> Self {
        self.event_types = mask;
        self
    }

    /// Set the default poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the poll timeout ceiling.
    pub fn with_max_poll_timeout(mut self, timeout: Duration) -> Self {
        self.max_poll_timeout = timeout;
        self
    }

    /// Clamp a requested poll timeout to the configured ceiling.
    pub fn effective_timeout(&self, requested: Duration) -> Duration {
        requested.min(self.max_poll_timeout)
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<(), Error> {
        if self.event_types == 0 {
            return Err(Error::Config("event type mask is empty".to_string()));
        }
        if self.event_types & !ALL_EVENTS != 0 {
            return Err(Error::Config(format!(
                "event type mask {:#x} has unknown bits",
                self.event_types
            )));
        }
        if self.poll_timeout > self.max_poll_timeout {
            return Err(Error::Config(format!(
                "poll timeout {:?} exceeds maximum {:?}",
                self.poll_timeout, self.max_poll_timeout
            )));
        }
        Ok(())
    }
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! # Requeue backoff
//!
//! Delays before a failed `Cluster` is reconciled again. Failures are split
//! by [`RetryClass`]: transient failures (API server, store lookups) follow a
//! Fibonacci sequence between [`MIN_DELAY`] and [`MAX_DELAY`], while
//! configuration failures wait [`MAX_DELAY`] straight away since only an edit
//! of the resource fixes them, and an edit triggers its own reconciliation.
//! A change of class restarts the sequence.

use std::time::Duration;

/// First delay after a transient failure
pub const MIN_DELAY: Duration = Duration::from_secs(60);

/// Longest delay between retries
pub const MAX_DELAY: Duration = Duration::from_secs(600);

/// How a reconciliation failure is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// May succeed on its own: API errors, store outages
    Transient,
    /// Persists until the cluster spec or a referenced resource changes
    Configuration,
}

/// Fibonacci sequence of delays capped at `max`
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    max: Duration,
    prev: Duration,
    current: Duration,
}

impl FibonacciBackoff {
    /// Sequence starting at `min`, capped at `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            prev: Duration::ZERO,
            current: min,
        }
    }

    /// Current delay; advances the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        delay
    }

    /// Upper bound of the sequence
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Restart from `min`
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

/// Consecutive failures of one cluster
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    class: Option<RetryClass>,
    sequence: FibonacciBackoff,
    failures: u32,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            class: None,
            sequence: FibonacciBackoff::new(MIN_DELAY, MAX_DELAY),
            failures: 0,
        }
    }
}

impl RetryBackoff {
    /// Record a failure of `class` and return the delay before the next attempt
    pub fn on_failure(&mut self, class: RetryClass) -> Duration {
        if self.class != Some(class) {
            self.class = Some(class);
            self.sequence.reset();
            self.failures = 0;
        }
        self.failures += 1;
        match class {
            RetryClass::Transient => self.sequence.next_backoff(),
            RetryClass::Configuration => self.sequence.max(),
        }
    }

    /// Failures of the current class in a row
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

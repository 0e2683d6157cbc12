//! Retry budget shared by the status pollers.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::RduError;

/// Fixed number of status fetches spaced by a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub retries: u32,
    pub delay: Duration,
}

impl PollBudget {
    pub const fn new(retries: u32, delay_secs: u64) -> Self {
        Self {
            retries,
            delay: Duration::from_secs(delay_secs),
        }
    }

    /// Time covered by the whole budget.
    pub fn total(&self) -> Duration {
        self.delay.saturating_mul(self.retries)
    }

    /// Grow the budget so polling outlasts `deadline`.
    ///
    /// Only applies when the deadline lies at or beyond the current budget;
    /// adds one retry per full delay between `now` and the deadline.
    pub fn extend_until(self, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let delay_secs = self.delay.as_secs() as i64;
        if delay_secs == 0 {
            return self;
        }

        let budget_end = now + chrono::Duration::seconds(self.total().as_secs() as i64);
        if deadline < budget_end {
            return self;
        }

        let until_deadline = (deadline - now).num_seconds();
        let extra = u32::try_from(until_deadline / delay_secs).unwrap_or(u32::MAX);
        Self {
            retries: self.retries.saturating_add(extra),
            delay: self.delay,
        }
    }

    /// Timeout error for an operation that outlived this budget.
    pub fn timeout(&self, operation: &str) -> RduError {
        RduError::Timeout {
            operation: operation.to_string(),
            details: format!(
                "no terminal state after {} seconds ({} checks, {}s apart)",
                self.total().as_secs(),
                self.retries,
                self.delay.as_secs()
            ),
        }
    }
}

//! Apply spec used to start or resume the upgrade.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::error;

use crate::error::RduError;
use crate::vcenter::types::{ApplySpecPayload, PausePolicy};

/// How the upgrade should approach the switchover.
///
/// A scheduled switchover and a pause before switchover exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplySpec {
    switchover_in_hours: Option<u32>,
    pause_before_switchover: bool,
}

impl ApplySpec {
    /// Validate and build an apply spec. A zero-hour schedule counts as unset.
    pub fn new(
        switchover_in_hours: Option<u32>,
        pause_before_switchover: bool,
    ) -> Result<Self, RduError> {
        let switchover_in_hours = switchover_in_hours.filter(|h| *h > 0);

        if switchover_in_hours.is_some() && pause_before_switchover {
            error!(
                "Cannot create an apply spec which has both a pause point and a scheduled switchover time."
            );
            return Err(RduError::InvalidConfig(
                "apply spec has both a scheduled switchover and pause-before-switchover set"
                    .to_string(),
            ));
        }

        if let Some(hours) = switchover_in_hours {
            switchover_at(Utc::now(), hours)?;
        }

        Ok(Self {
            switchover_in_hours,
            pause_before_switchover,
        })
    }

    /// Run straight through to the switchover.
    pub fn run_through() -> Self {
        Self::default()
    }

    /// Stop when the target is prepared, before any downtime.
    pub fn pause_before_switchover() -> Self {
        Self {
            switchover_in_hours: None,
            pause_before_switchover: true,
        }
    }

    /// Build the request body, resolving the schedule against `now`.
    pub fn to_payload(&self, now: DateTime<Utc>) -> Result<ApplySpecPayload, RduError> {
        let start_switchover = self
            .switchover_in_hours
            .map(|hours| switchover_at(now, hours))
            .transpose()?;

        Ok(ApplySpecPayload {
            start_switchover,
            pause: self
                .pause_before_switchover
                .then_some(PausePolicy::BeforeSwitchover),
        })
    }
}

fn switchover_at(now: DateTime<Utc>, hours: u32) -> Result<DateTime<Utc>, RduError> {
    TimeDelta::try_hours(i64::from(hours))
        .and_then(|delay| now.checked_add_signed(delay))
        .ok_or_else(|| {
            RduError::InvalidConfig(format!(
                "switchover in {} hours is out of the supported date range",
                hours
            ))
        })
}

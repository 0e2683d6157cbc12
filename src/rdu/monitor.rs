//! Upgrade monitor.
//!
//! Polls the upgrade status until the upgrade completes, is canceled, fails
//! or reaches the pause point before switchover. A timeout does not mean the
//! upgrade failed; it may just take longer than expected, and the monitor
//! can be run again.

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use crate::error::RduError;
use crate::output::{messages_to_string, notifications_to_string};
use crate::poll::PollBudget;
use crate::vcenter::api::UpgradeApi;
use crate::vcenter::types::{ApplySpecPayload, UpgradePhase, UpgradeState, UpgradeStatus};

/// Polling settings of the upgrade monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Status checks until the monitor gives up.
    pub budget: PollBudget,
    /// Attempts per status fetch while the appliance is unreachable.
    pub reconnect: PollBudget,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            budget: PollBudget::new(120, 120),
            reconnect: PollBudget::new(9, 10),
        }
    }
}

impl MonitorSettings {
    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }
}

/// Where the monitor stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    Upgraded,
    Canceled,
    PausedBeforeSwitchover,
}

/// Watch the upgrade until a terminal or pause state.
///
/// With autocancellation enabled a failed upgrade is followed until the
/// automatic cancel completes.
pub async fn monitor_upgrade(
    api: &dyn UpgradeApi,
    settings: &MonitorSettings,
    autocancellation: bool,
    apply: &ApplySpecPayload,
) -> Result<MonitorOutcome> {
    let budget = match apply.start_switchover {
        Some(at) => {
            let extended = settings.budget.extend_until(at, Utc::now());
            if extended != settings.budget {
                info!(
                    "Switchover is scheduled at {}, extending the monitor to {} checks",
                    at.to_rfc3339(),
                    extended.retries
                );
            }
            extended
        }
        None => settings.budget,
    };

    for _ in 0..budget.retries {
        let status = fetch_status(api, settings.reconnect).await?;

        match status.phase() {
            UpgradePhase::Upgraded => {
                info!("Upgrade has completed successfully.");
                return Ok(MonitorOutcome::Upgraded);
            }
            UpgradePhase::Canceled => {
                info!(
                    "Upgrade has been successfully cancelled. You can check the error field from the status to see what failed during the upgrade."
                );
                error!(
                    "Upgrade error that caused cancellation: {}",
                    messages_to_string(&status.error_messages(), 0)
                );
                log_notifications(&status);
                return Ok(MonitorOutcome::Canceled);
            }
            UpgradePhase::PausedBeforeSwitchover => {
                info!("Upgrade is prepared and paused before the switchover.");
                return Ok(MonitorOutcome::PausedBeforeSwitchover);
            }
            UpgradePhase::Failed => {
                let messages = messages_to_string(&status.error_messages(), 0);

                if status.desired_state == Some(UpgradeState::Canceled) {
                    error!("Cancellation has failed due to error: {}", messages);
                    return Err(RduError::CancellationFailed(messages).into());
                }

                if autocancellation {
                    error!("Upgrade has failed and autocancellation is being triggered.");
                    tokio::time::sleep(budget.delay).await;
                    continue;
                }

                error!("Upgrade has failed due to error {}", messages);
                log_notifications(&status);
                return Err(RduError::UpgradeFailed(messages).into());
            }
            phase => {
                let state = status
                    .current_state
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "None".to_string());
                info!("Current upgrade state is {} ({})", state, phase);
            }
        }

        tokio::time::sleep(budget.delay).await;
    }

    error!(
        "Upgrade has timed-out after {} seconds",
        budget.total().as_secs()
    );
    Err(budget.timeout("upgrade").into())
}

/// Fetch the status, riding out connection errors during the network switchover.
async fn fetch_status(
    api: &dyn UpgradeApi,
    reconnect: PollBudget,
) -> Result<UpgradeStatus, RduError> {
    for attempt in 1..=reconnect.retries {
        match api.status().await {
            Ok(status) => return Ok(status),
            Err(e) if e.is_connection() => {
                info!(
                    "A connection error has occurred while fetching the upgrade status (attempt {}/{}). This could be due to the network switchover. Waiting {} seconds to see if it is resolved.",
                    attempt,
                    reconnect.retries,
                    reconnect.delay.as_secs()
                );
                tokio::time::sleep(reconnect.delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    Err(RduError::Connectivity(
        "upgrade status".to_string(),
        reconnect.retries,
    ))
}

fn log_notifications(status: &UpgradeStatus) {
    info!(
        "More information could be found in the notifications \n{}",
        notifications_to_string(status.notifications.as_ref(), 0)
    );
}

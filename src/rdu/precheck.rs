//! Upgrade pre-check runner.
//!
//! The checks can run before the upgrade against a candidate init spec, or
//! during it against the configured one. They require the lifecycle plugin
//! to already be at the target version.

use anyhow::Result;
use tracing::{error, info};

use crate::error::RduError;
use crate::poll::PollBudget;
use crate::vcenter::api::UpgradeApi;
use crate::vcenter::types::{CheckResult, InitSpecPayload, OperationStatus};

/// 10 checks, 30 seconds apart.
pub const PRECHECK_BUDGET: PollBudget = PollBudget::new(10, 30);

/// Start the pre-checks and wait for their result.
pub async fn run_prechecks(
    api: &dyn UpgradeApi,
    spec: Option<&InitSpecPayload>,
    budget: PollBudget,
) -> Result<CheckResult> {
    info!("Run the upgrade checks.");
    let task_id = api.start_check(spec).await?;
    info!("Running task with ID {}", task_id);

    wait_for_result(api, &task_id, budget).await
}

/// Poll a check task until it succeeds, fails or the budget runs out.
async fn wait_for_result(
    api: &dyn UpgradeApi,
    task_id: &str,
    budget: PollBudget,
) -> Result<CheckResult> {
    for _ in 0..budget.retries {
        let task = api.task_info(task_id).await?;

        match task.status {
            OperationStatus::Succeeded => {
                info!("Task has completed successfully.");
                return Ok(task.result.unwrap_or_default());
            }
            OperationStatus::Failed => {
                let messages = task
                    .error
                    .as_ref()
                    .map(|e| e.default_messages().join("\n"))
                    .unwrap_or_default();
                error!("Task has failed with error: {}", messages);

                return task.result.ok_or_else(|| {
                    error!(
                        "No result was returned from the upgrade prechecks. Most probably the checks didn't start."
                    );
                    RduError::PrecheckNoResult.into()
                });
            }
            _ => {
                let progress = task
                    .progress
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                info!(
                    "The upgrade precheck is still running. Current progress {}",
                    progress
                );
                tokio::time::sleep(budget.delay).await;
            }
        }
    }

    error!(
        "The upgrade precheck execution has timed out after {} seconds",
        budget.total().as_secs()
    );
    Err(budget.timeout("upgrade pre-checks").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeUpgradeApi, task};
    use crate::vcenter::types::{ErrorInfo, LocalizableMessage, Notification, Notifications};

    fn result_with_error(msg: &str) -> CheckResult {
        CheckResult {
            notifications: Notifications {
                errors: vec![Notification {
                    id: None,
                    time: None,
                    message: LocalizableMessage::new(msg),
                    resolution: None,
                }],
                ..Default::default()
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_result_at_success() {
        let api = FakeUpgradeApi::new();
        api.push_task(Ok(task(OperationStatus::Pending, None)))
            .push_task(Ok(task(OperationStatus::Running, None)))
            .push_task(Ok(task(
                OperationStatus::Succeeded,
                Some(CheckResult::default()),
            )));

        let result = run_prechecks(&api, None, PRECHECK_BUDGET).await.unwrap();

        assert!(!result.notifications.has_errors());
        assert_eq!(api.count("task_info"), 3);
        assert_eq!(api.count("check"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_returns_its_result() {
        let api = FakeUpgradeApi::new();
        let mut failed = task(OperationStatus::Failed, Some(result_with_error("Low disk")));
        failed.error = Some(ErrorInfo {
            messages: vec![LocalizableMessage::new("Check failed")],
        });
        api.push_task(Ok(failed));

        let result = run_prechecks(&api, None, PRECHECK_BUDGET).await.unwrap();

        assert!(result.notifications.has_errors());
        assert_eq!(api.count("task_info"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_task_without_result() {
        let api = FakeUpgradeApi::new();
        api.push_task(Ok(task(OperationStatus::Failed, None)));

        let err = run_prechecks(&api, None, PRECHECK_BUDGET).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RduError>(),
            Some(RduError::PrecheckNoResult)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_budget() {
        let api = FakeUpgradeApi::new();
        let budget = PollBudget::new(4, 30);

        let err = run_prechecks(&api, None, budget).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RduError>(),
            Some(RduError::Timeout { .. })
        ));
        assert_eq!(api.count("task_info"), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_init_spec_when_given() {
        use crate::rdu::init_spec::InitSpec;
        use secrecy::SecretString;

        let api = FakeUpgradeApi::new();
        api.push_task(Ok(task(OperationStatus::Succeeded, None)));
        let spec = InitSpec::new(
            SecretString::from("pw".to_string()),
            "9.0.1.0000",
            "https://repo/vcsa.ova",
            "https://repo/upgrade",
        )
        .to_payload();

        run_prechecks(&api, Some(&spec), PRECHECK_BUDGET)
            .await
            .unwrap();

        assert_eq!(api.calls()[0], "check_with_spec");
    }
}

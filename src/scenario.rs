//! End-to-end upgrade scenarios.
//!
//! Each scenario updates the lifecycle plugin first, then chains the upgrade
//! steps. A failure reported by the final monitor triggers one recovery
//! attempt: a failed cancellation is cancelled again, and a failed upgrade is
//! re-applied with the same apply spec.

use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::error::RduError;
use crate::output::{notifications_to_string, print_notifications, print_step};
use crate::plugin::{self, PLUGIN_BUDGET};
use crate::poll::PollBudget;
use crate::rdu::apply_spec::ApplySpec;
use crate::rdu::init_spec::InitSpec;
use crate::rdu::monitor::{MonitorOutcome, MonitorSettings};
use crate::rdu::precheck::PRECHECK_BUDGET;
use crate::rdu::steps::Rdu;
use crate::vcenter::api::{ApplianceUpdateApi, UpgradeApi};
use crate::vcenter::types::{ApplySpecPayload, CheckResult};

/// Available scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioKind {
    /// Pre-check a minimal init spec without upgrading
    Readiness,
    /// Pre-check, configure, upgrade and monitor
    FullUpgrade,
    /// Upgrade an instance managed by another vCenter
    UberUpgrade,
    /// Prepare with a pause before switchover, then switch over
    TwoPhase,
    /// Start an upgrade and cancel it
    Cancellation,
}

/// How a scenario ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioOutcome {
    PrecheckPassed,
    Finished(MonitorOutcome),
    /// A failed cancellation was followed by a new cancel request.
    CancelRetried,
    /// A failed upgrade was applied again.
    UpgradeReapplied,
}

/// Poll budgets and prompts used by the scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioSettings {
    pub plugin_budget: PollBudget,
    pub precheck_budget: PollBudget,
    pub monitor: MonitorSettings,
    pub cancellation_monitor: MonitorSettings,
    /// Wait between starting and cancelling the upgrade.
    pub cancel_after: Duration,
    /// Skip the confirmation prompt before an upgrade is applied.
    pub assume_yes: bool,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            plugin_budget: PLUGIN_BUDGET,
            precheck_budget: PRECHECK_BUDGET,
            monitor: MonitorSettings::default(),
            cancellation_monitor: MonitorSettings::default()
                .with_budget(PollBudget::new(120, 30)),
            cancel_after: Duration::from_secs(120),
            assume_yes: false,
        }
    }
}

/// Inputs shared by all scenarios.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    pub init: InitSpec,
    pub switchover_in_hours: Option<u32>,
}

/// Runs scenarios against the lifecycle manager and the appliance.
pub struct ScenarioRunner<'a> {
    lcm: &'a dyn UpgradeApi,
    appliance: &'a dyn ApplianceUpdateApi,
    settings: ScenarioSettings,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(
        lcm: &'a dyn UpgradeApi,
        appliance: &'a dyn ApplianceUpdateApi,
        settings: ScenarioSettings,
    ) -> Self {
        Self {
            lcm,
            appliance,
            settings,
        }
    }

    pub async fn run(
        &self,
        kind: ScenarioKind,
        request: &UpgradeRequest,
    ) -> Result<ScenarioOutcome> {
        info!("Running scenario {:?}", kind);
        match kind {
            ScenarioKind::Readiness => self.readiness(request).await,
            ScenarioKind::FullUpgrade => self.full_upgrade(request).await,
            ScenarioKind::UberUpgrade => self.uber_upgrade(request).await,
            ScenarioKind::TwoPhase => self.two_phase(request).await,
            ScenarioKind::Cancellation => self.cancellation(request).await,
        }
    }

    fn rdu(&self, monitor: MonitorSettings) -> Rdu<'a> {
        Rdu::new(self.lcm)
            .with_precheck_budget(self.settings.precheck_budget)
            .with_monitor_settings(monitor)
    }

    /// Checks whether the environment is ready, without upgrading.
    async fn readiness(&self, request: &UpgradeRequest) -> Result<ScenarioOutcome> {
        const STEPS: &[&str] = &[
            "Update lifecycle manager plug-in",
            "Create init spec",
            "Run pre-checks against the init spec",
        ];
        let rdu = self.rdu(self.settings.monitor);

        print_step(0, STEPS);
        self.update_plugin(request).await?;

        print_step(1, STEPS);
        let init = request
            .init
            .clone()
            .with_autocancellation(false)
            .with_preserve_original_name(false)
            .with_uber_vc(None);
        info!(
            "Init spec can be further customized than what is shown here. For details check the API documentation."
        );

        print_step(2, STEPS);
        ensure_prechecks_passed(&rdu.precheck(Some(&init)).await?)?;
        Ok(ScenarioOutcome::PrecheckPassed)
    }

    async fn full_upgrade(&self, request: &UpgradeRequest) -> Result<ScenarioOutcome> {
        const STEPS: &[&str] = &[
            "Update lifecycle manager plug-in",
            "Run pre-checks against the init spec",
            "Configure the upgrade",
            "Run pre-checks against the configured upgrade",
            "Run the upgrade",
            "Monitor the upgrade",
        ];
        let rdu = self.rdu(self.settings.monitor);
        let init = request.init.clone().with_uber_vc(None);
        let apply = ApplySpec::new(request.switchover_in_hours, false)?;

        print_step(0, STEPS);
        self.update_plugin(request).await?;

        print_step(1, STEPS);
        ensure_prechecks_passed(&rdu.precheck(Some(&init)).await?)?;

        print_step(2, STEPS);
        rdu.configure(&init).await?;

        print_step(3, STEPS);
        ensure_prechecks_passed(&rdu.precheck(None).await?)?;

        print_step(4, STEPS);
        self.confirm_apply()?;
        let payload = rdu.apply(&apply).await?;

        print_step(5, STEPS);
        monitor_with_recovery(&rdu, init.autocancellation, &payload, true).await
    }

    /// Upgrade an instance whose VM is managed by an external vCenter.
    async fn uber_upgrade(&self, request: &UpgradeRequest) -> Result<ScenarioOutcome> {
        const STEPS: &[&str] = &[
            "Update lifecycle manager plug-in",
            "Configure the upgrade",
            "Run the upgrade",
            "Monitor the upgrade",
        ];
        if request.init.uber_vc.is_none() {
            return Err(RduError::InvalidConfig(
                "uber-upgrade requires --uber-vc-hostname, --uber-vc-username and --uber-vc-password"
                    .to_string(),
            )
            .into());
        }
        let rdu = self.rdu(self.settings.monitor);
        let apply = ApplySpec::new(request.switchover_in_hours, false)?;

        print_step(0, STEPS);
        self.update_plugin(request).await?;

        print_step(1, STEPS);
        rdu.configure(&request.init).await?;

        print_step(2, STEPS);
        self.confirm_apply()?;
        let payload = rdu.apply(&apply).await?;

        print_step(3, STEPS);
        monitor_with_recovery(&rdu, request.init.autocancellation, &payload, true).await
    }

    /// Replicate with a pause before switchover, then run the switchover.
    async fn two_phase(&self, request: &UpgradeRequest) -> Result<ScenarioOutcome> {
        const STEPS: &[&str] = &[
            "Update lifecycle manager plug-in",
            "Configure the upgrade",
            "Run the preparation",
            "Monitor the upgrade until it pauses before switchover",
            "Run the switchover",
            "Monitor the upgrade",
        ];
        let rdu = self.rdu(self.settings.monitor);
        let init = request.init.clone().with_uber_vc(None);

        print_step(0, STEPS);
        self.update_plugin(request).await?;

        print_step(1, STEPS);
        rdu.configure(&init).await?;

        print_step(2, STEPS);
        self.confirm_apply()?;
        let prepare = rdu.apply(&ApplySpec::pause_before_switchover()).await?;

        print_step(3, STEPS);
        match rdu.monitor(init.autocancellation, &prepare).await? {
            MonitorOutcome::PausedBeforeSwitchover => {}
            outcome => {
                info!("Upgrade did not stop at the pause point ({:?}).", outcome);
                return Ok(ScenarioOutcome::Finished(outcome));
            }
        }

        print_step(4, STEPS);
        let switchover = rdu.apply(&ApplySpec::run_through()).await?;

        print_step(5, STEPS);
        monitor_with_recovery(&rdu, init.autocancellation, &switchover, true).await
    }

    /// Start an upgrade and cancel it shortly after.
    async fn cancellation(&self, request: &UpgradeRequest) -> Result<ScenarioOutcome> {
        const STEPS: &[&str] = &[
            "Update lifecycle manager plug-in",
            "Configure the upgrade",
            "Run pre-checks",
            "Run the upgrade",
            "Cancel the upgrade",
            "Monitor the upgrade cancellation",
        ];
        let rdu = self.rdu(self.settings.cancellation_monitor);
        let init = request.init.clone().with_uber_vc(None);
        let apply = ApplySpec::new(request.switchover_in_hours, false)?;

        print_step(0, STEPS);
        self.update_plugin(request).await?;

        print_step(1, STEPS);
        rdu.configure(&init).await?;

        print_step(2, STEPS);
        ensure_prechecks_passed(&rdu.precheck(None).await?)?;

        print_step(3, STEPS);
        self.confirm_apply()?;
        let payload = rdu.apply(&apply).await?;
        self.wait_before_cancel().await;

        print_step(4, STEPS);
        rdu.cancel().await?;

        print_step(5, STEPS);
        monitor_with_recovery(&rdu, init.autocancellation, &payload, false).await
    }

    /// An already current plugin does not stop the scenario.
    async fn update_plugin(&self, request: &UpgradeRequest) -> Result<()> {
        let outcome = plugin::update_lifecycle_plugin(
            self.appliance,
            &request.init.target_upgrade_repo,
            self.settings.plugin_budget,
        )
        .await?;
        info!("Lifecycle plugin update: {:?}", outcome);
        Ok(())
    }

    fn confirm_apply(&self) -> Result<()> {
        if self.settings.assume_yes {
            return Ok(());
        }

        println!(
            "{}",
            "This will start the upgrade of the vCenter appliance.".yellow().bold()
        );
        if !Confirm::new()
            .with_prompt("Continue?")
            .default(false)
            .interact()?
        {
            return Err(RduError::UserCancelled.into());
        }
        Ok(())
    }

    async fn wait_before_cancel(&self) {
        let wait = self.settings.cancel_after;
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!(
            "Letting the upgrade run for {} seconds before cancelling",
            wait.as_secs()
        ));
        pb.enable_steady_tick(Duration::from_millis(100));

        tokio::time::sleep(wait).await;
        pb.finish_and_clear();
    }
}

/// Fail when the pre-checks reported errors; render the notifications either way.
fn ensure_prechecks_passed(result: &CheckResult) -> Result<()> {
    print_notifications(&result.notifications);

    if result.notifications.has_errors() {
        error!(
            "Provided init spec didn't pass the prechecks. Check the prechecks result for problems and try again:\n{}",
            notifications_to_string(Some(&result.notifications), 1)
        );
        let messages = result
            .notifications
            .errors
            .iter()
            .map(|n| n.message.default_message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RduError::PrecheckFailed(messages).into());
    }

    Ok(())
}

/// Run the final monitor and apply the recovery for its failure, if any.
async fn monitor_with_recovery(
    rdu: &Rdu<'_>,
    autocancellation: bool,
    payload: &ApplySpecPayload,
    reapply_on_failure: bool,
) -> Result<ScenarioOutcome> {
    let err = match rdu.monitor(autocancellation, payload).await {
        Ok(outcome) => return Ok(ScenarioOutcome::Finished(outcome)),
        Err(err) => err,
    };

    match err.downcast_ref::<RduError>() {
        Some(RduError::CancellationFailed(_)) => {
            error!("Cancellation has failed. Retrying the cancel operation again.");
            rdu.cancel().await?;
            Ok(ScenarioOutcome::CancelRetried)
        }
        Some(RduError::UpgradeFailed(_)) if reapply_on_failure => {
            error!("Upgrade has failed. Fix the problems and retry.");
            info!("Retrying the upgrade with the same apply spec.");
            rdu.apply_payload(payload).await?;
            Ok(ScenarioOutcome::UpgradeReapplied)
        }
        _ => Err(err),
    }
}

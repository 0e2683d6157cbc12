//! Upgrade driver: the individual steps of a Reduced Downtime Upgrade.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::output::status_report;
use crate::poll::PollBudget;
use crate::rdu::apply_spec::ApplySpec;
use crate::rdu::init_spec::InitSpec;
use crate::rdu::monitor::{self, MonitorOutcome, MonitorSettings};
use crate::rdu::precheck::{self, PRECHECK_BUDGET};
use crate::vcenter::api::UpgradeApi;
use crate::vcenter::types::{ApplySpecPayload, CheckResult, UpgradeStatus};

/// Drives one upgrade through the lifecycle manager.
pub struct Rdu<'a> {
    api: &'a dyn UpgradeApi,
    precheck_budget: PollBudget,
    monitor: MonitorSettings,
}

impl<'a> Rdu<'a> {
    pub fn new(api: &'a dyn UpgradeApi) -> Self {
        Self {
            api,
            precheck_budget: PRECHECK_BUDGET,
            monitor: MonitorSettings::default(),
        }
    }

    pub fn with_monitor_settings(mut self, settings: MonitorSettings) -> Self {
        self.monitor = settings;
        self
    }

    pub fn with_precheck_budget(mut self, budget: PollBudget) -> Self {
        self.precheck_budget = budget;
        self
    }

    /// Whether an upgrade has already been configured.
    pub async fn is_initialized(&self) -> Result<bool> {
        let initialized = self
            .api
            .is_initialized()
            .await
            .context("Failed to query the upgrade")?;
        info!("Upgrade initialized: {}", initialized);
        Ok(initialized)
    }

    /// Configure the upgrade with an init spec.
    pub async fn configure(&self, spec: &InitSpec) -> Result<()> {
        info!("Configure the upgrade.");
        self.api
            .configure(&spec.to_payload())
            .await
            .context("Failed to configure the upgrade")?;
        info!("Upgrade is configured.");
        Ok(())
    }

    /// Run the pre-checks, against `spec` or against the configured upgrade.
    pub async fn precheck(&self, spec: Option<&InitSpec>) -> Result<CheckResult> {
        let payload = spec.map(InitSpec::to_payload);
        precheck::run_prechecks(self.api, payload.as_ref(), self.precheck_budget).await
    }

    /// Start or resume the upgrade. Returns the payload that was sent, which
    /// carries the resolved switchover time.
    pub async fn apply(&self, spec: &ApplySpec) -> Result<ApplySpecPayload> {
        let payload = spec.to_payload(Utc::now())?;
        self.apply_payload(&payload).await?;
        Ok(payload)
    }

    /// Send an already resolved apply payload again, keeping its switchover time.
    pub async fn apply_payload(&self, payload: &ApplySpecPayload) -> Result<()> {
        match (&payload.start_switchover, &payload.pause) {
            (Some(at), _) => info!(
                "Apply the upgrade with switchover scheduled at {}.",
                at.to_rfc3339()
            ),
            (None, Some(pause)) => info!("Apply the upgrade with pause point {}.", pause),
            (None, None) => info!("Apply the upgrade."),
        }

        self.api
            .apply(payload)
            .await
            .context("Failed to apply the upgrade")?;
        info!("Upgrade has been started.");
        Ok(())
    }

    /// Request cancellation of the running upgrade.
    pub async fn cancel(&self) -> Result<()> {
        info!("Cancel the upgrade.");
        self.api
            .cancel()
            .await
            .context("Failed to cancel the upgrade")?;
        info!("Cancellation has been requested.");
        Ok(())
    }

    /// Fetch the upgrade status and log the report.
    pub async fn status(&self) -> Result<UpgradeStatus> {
        let status = self
            .api
            .status()
            .await
            .context("Failed to get the upgrade status")?;
        info!("Upgrade status: {}", status_report(&status));
        Ok(status)
    }

    /// Watch the upgrade until it completes, is canceled or pauses.
    pub async fn monitor(
        &self,
        autocancellation: bool,
        apply: &ApplySpecPayload,
    ) -> Result<MonitorOutcome> {
        monitor::monitor_upgrade(self.api, &self.monitor, autocancellation, apply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RduError;
    use crate::testing::{FakeUpgradeApi, upgraded};
    use crate::vcenter::types::PausePolicy;
    use secrecy::SecretString;

    fn init_spec() -> InitSpec {
        InitSpec::new(
            SecretString::from("pw".to_string()),
            "9.0.1.0000",
            "https://repo/vcsa.ova",
            "https://repo/upgrade",
        )
    }

    #[tokio::test]
    async fn test_apply_returns_sent_payload() {
        let api = FakeUpgradeApi::new();
        let rdu = Rdu::new(&api);

        let payload = rdu
            .apply(&ApplySpec::pause_before_switchover())
            .await
            .unwrap();

        assert_eq!(payload.pause, Some(PausePolicy::BeforeSwitchover));
        assert_eq!(api.calls(), vec!["apply_paused"]);
    }

    #[tokio::test]
    async fn test_scheduled_apply_resolves_time() {
        let api = FakeUpgradeApi::new();
        let before = Utc::now();

        let payload = Rdu::new(&api)
            .apply(&ApplySpec::new(Some(2), false).unwrap())
            .await
            .unwrap();

        let at = payload.start_switchover.unwrap();
        assert!(at >= before + chrono::Duration::hours(2));
        assert!(at <= Utc::now() + chrono::Duration::hours(2));
    }

    #[tokio::test]
    async fn test_configure_and_cancel() {
        let api = FakeUpgradeApi::new();
        let rdu = Rdu::new(&api);

        rdu.configure(&init_spec()).await.unwrap();
        rdu.cancel().await.unwrap();

        assert_eq!(api.calls(), vec!["configure", "cancel"]);
    }

    #[tokio::test]
    async fn test_status_passes_through() {
        let api = FakeUpgradeApi::new();
        api.push_statuses([upgraded()]);

        let status = Rdu::new(&api).status().await.unwrap();
        assert_eq!(status, upgraded());
    }

    #[tokio::test]
    async fn test_status_error_keeps_cause() {
        let api = FakeUpgradeApi::new();
        api.push_status(Err(RduError::NotFound("status".to_string())));

        let err = Rdu::new(&api).status().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RduError>(),
            Some(RduError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_is_initialized() {
        let api = FakeUpgradeApi::initialized();
        assert!(Rdu::new(&api).is_initialized().await.unwrap());
    }
}

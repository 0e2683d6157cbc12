//! Lifecycle-manager plugin update.
//!
//! The plugin must be at the target version before any pre-check or upgrade
//! step. It ships as the `vlcm` component of an appliance update; the name is
//! unrelated to the host lifecycle service.

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::error::RduError;
use crate::poll::PollBudget;
use crate::vcenter::api::ApplianceUpdateApi;
use crate::vcenter::types::{ApplianceUpdateState, PolicyConfig};

/// Component name of the lifecycle-manager plugin.
pub const VLCM_COMPONENT: &str = "vlcm";

/// 20 checks, 30 seconds apart.
pub const PLUGIN_BUDGET: PollBudget = PollBudget::new(20, 30);

/// How a plugin update ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginUpdate {
    /// The repository offers no update.
    NoUpdates,
    /// The pending update does not touch the plugin.
    NotApplicable { version: String },
    /// The plugin was installed from the given update version.
    Installed { version: String },
}

/// Update the lifecycle-manager plugin from `plugin_repo`.
pub async fn update_lifecycle_plugin(
    api: &dyn ApplianceUpdateApi,
    plugin_repo: &str,
    budget: PollBudget,
) -> Result<PluginUpdate> {
    info!("Update plug-in step 1: Setting the repository needed for the update");
    let policy = PolicyConfig {
        custom_url: plugin_repo.to_string(),
        auto_stage: false,
        certificate_check: true,
        check_schedule: Vec::new(),
    };
    api.set_policy(&policy)
        .await
        .context("Failed to set the appliance update policy")?;

    info!("Update plug-in step 2: Check if there are any available updates.");
    let pending = match api.list_pending().await {
        Ok(pending) => pending,
        Err(RduError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e).context("Failed to list the pending updates"),
    };

    let Some(target) = pending.first() else {
        warn!(
            "There are no available updates in the passed repository {}",
            plugin_repo
        );
        return Ok(PluginUpdate::NoUpdates);
    };
    let version = target.version.clone();
    info!(
        "Available updates: {}",
        pending
            .iter()
            .map(|u| u.version.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let components = api
        .list_upgradeable_components(&version)
        .await
        .context("Failed to list the upgradeable components")?;
    info!(
        "Upgradeable components for update version {}: {}",
        version,
        components
            .iter()
            .map(|c| c.component.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if !components.iter().any(|c| c.component == VLCM_COMPONENT) {
        info!(
            "{} is not listed as an upgradeable component.",
            VLCM_COMPONENT
        );
        return Ok(PluginUpdate::NotApplicable { version });
    }

    info!("Update plug-in step 3: Starting the update of the service.");
    api.stage_and_install(&version, VLCM_COMPONENT)
        .await
        .context("Failed to start the plugin update")?;

    info!("Update plug-in step 4: Checking the status of the update");
    monitor_update(api, budget).await?;

    Ok(PluginUpdate::Installed { version })
}

/// Poll the appliance update state until it is up to date again.
async fn monitor_update(api: &dyn ApplianceUpdateApi, budget: PollBudget) -> Result<()> {
    for _ in 0..budget.retries {
        let status = api.update_status().await?;

        match status.state {
            ApplianceUpdateState::UpToDate => {
                info!("Update has completed successfully");
                return Ok(());
            }
            ApplianceUpdateState::InstallFailed => {
                error!("Update has failed");
                return Err(RduError::PluginUpdateFailed(
                    "appliance reported INSTALL_FAILED".to_string(),
                )
                .into());
            }
            state if state.is_in_progress() => info!("Update is in progress"),
            _ => {}
        }

        tokio::time::sleep(budget.delay).await;
    }

    error!(
        "Update has timed-out after {} seconds",
        budget.total().as_secs()
    );
    Err(budget.timeout("lifecycle plugin update").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApplianceApi;

    #[tokio::test(start_paused = true)]
    async fn test_installs_plugin() {
        let api = FakeApplianceApi::new(&["9.0.1.0000", "9.0.0.0100"], &["vlcm", "vpxd"]);
        api.push_states([
            ApplianceUpdateState::StageInProgress,
            ApplianceUpdateState::InstallInProgress,
            ApplianceUpdateState::UpToDate,
        ]);

        let outcome = update_lifecycle_plugin(&api, "https://repo/plugin", PLUGIN_BUDGET)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            PluginUpdate::Installed {
                version: "9.0.1.0000".to_string()
            }
        );
        assert_eq!(
            api.calls(),
            vec![
                "set_policy:https://repo/plugin",
                "list_pending",
                "list_components:9.0.1.0000",
                "stage_and_install:9.0.1.0000:vlcm",
                "update_status",
                "update_status",
                "update_status",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pending_list_is_not_an_error() {
        let api = FakeApplianceApi::not_found();

        let outcome = update_lifecycle_plugin(&api, "https://repo/plugin", PLUGIN_BUDGET)
            .await
            .unwrap();

        assert_eq!(outcome, PluginUpdate::NoUpdates);
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pending_list() {
        let api = FakeApplianceApi::new(&[], &[]);

        let outcome = update_lifecycle_plugin(&api, "https://repo/plugin", PLUGIN_BUDGET)
            .await
            .unwrap();

        assert_eq!(outcome, PluginUpdate::NoUpdates);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_without_plugin_component() {
        let api = FakeApplianceApi::new(&["9.0.1.0000"], &["vpxd"]);

        let outcome = update_lifecycle_plugin(&api, "https://repo/plugin", PLUGIN_BUDGET)
            .await
            .unwrap();

        assert!(matches!(outcome, PluginUpdate::NotApplicable { .. }));
        assert!(!api.calls().iter().any(|c| c.starts_with("stage_and_install")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_failure() {
        let api = FakeApplianceApi::new(&["9.0.1.0000"], &["vlcm"]);
        api.push_states([
            ApplianceUpdateState::InstallInProgress,
            ApplianceUpdateState::InstallFailed,
        ]);

        let err = update_lifecycle_plugin(&api, "https://repo/plugin", PLUGIN_BUDGET)
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RduError>(),
            Some(RduError::PluginUpdateFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_times_out() {
        let api = FakeApplianceApi::new(&["9.0.1.0000"], &["vlcm"]);

        let err = update_lifecycle_plugin(&api, "https://repo/plugin", PollBudget::new(3, 30))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<RduError>(),
            Some(RduError::Timeout { .. })
        ));
        assert_eq!(
            api.calls().iter().filter(|c| *c == "update_status").count(),
            3
        );
    }
}

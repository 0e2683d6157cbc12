//! Remote service seams.
//!
//! Pollers and scenarios only talk to these traits, so the REST clients in
//! [`super::client`] can be swapped for scripted fakes in tests.

use async_trait::async_trait;

use super::types::{
    ApplianceUpdateStatus, ApplySpecPayload, InitSpecPayload, PolicyConfig, TaskInfo,
    UpdateSummary, UpgradeStatus, UpgradeableComponent,
};
use crate::error::RduError;

/// Lifecycle-manager migration upgrade service.
#[async_trait]
pub trait UpgradeApi: Send + Sync {
    /// Whether an upgrade has been configured on the source vCenter.
    async fn is_initialized(&self) -> Result<bool, RduError>;

    /// Store the init spec used by the upgrade.
    async fn configure(&self, spec: &InitSpecPayload) -> Result<(), RduError>;

    /// Start the pre-checks and return the task id.
    ///
    /// Without a spec the checks run against the configured upgrade.
    async fn start_check(&self, spec: Option<&InitSpecPayload>) -> Result<String, RduError>;

    /// Fetch a task snapshot.
    async fn task_info(&self, task_id: &str) -> Result<TaskInfo, RduError>;

    /// Start or reconfigure the running upgrade.
    async fn apply(&self, spec: &ApplySpecPayload) -> Result<(), RduError>;

    /// Request cancellation of the running upgrade.
    async fn cancel(&self) -> Result<(), RduError>;

    /// Fetch the upgrade status snapshot.
    async fn status(&self) -> Result<UpgradeStatus, RduError>;
}

/// Appliance self-update service (port 5480).
#[async_trait]
pub trait ApplianceUpdateApi: Send + Sync {
    async fn set_policy(&self, policy: &PolicyConfig) -> Result<(), RduError>;

    /// Pending updates from local and online sources, major versions included.
    async fn list_pending(&self) -> Result<Vec<UpdateSummary>, RduError>;

    async fn list_upgradeable_components(
        &self,
        version: &str,
    ) -> Result<Vec<UpgradeableComponent>, RduError>;

    async fn stage_and_install(&self, version: &str, component: &str) -> Result<(), RduError>;

    async fn update_status(&self) -> Result<ApplianceUpdateStatus, RduError>;
}

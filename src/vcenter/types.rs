//! Wire types for the lifecycle-manager and appliance-update REST APIs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Shared
// ============================================================================

/// A server-side localizable message; only the default text is rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizableMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub default_message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl LocalizableMessage {
    #[cfg(test)]
    pub fn new(default_message: impl Into<String>) -> Self {
        Self {
            default_message: default_message.into(),
            ..Default::default()
        }
    }
}

/// Error payload attached to failed tasks and upgrades.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub messages: Vec<LocalizableMessage>,
}

impl ErrorInfo {
    /// Default texts of every message, in server order.
    pub fn default_messages(&self) -> Vec<&str> {
        self.messages
            .iter()
            .map(|m| m.default_message.as_str())
            .collect()
    }
}

/// A single notification with an optional suggested resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    pub message: LocalizableMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<LocalizableMessage>,
}

/// Notifications grouped by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifications {
    #[serde(default)]
    pub errors: Vec<Notification>,
    #[serde(default)]
    pub warnings: Vec<Notification>,
    #[serde(default)]
    pub info: Vec<Notification>,
}

impl Notifications {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.info.is_empty()
    }
}

/// Progress counters reported by tasks and the upgrade status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub completed: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<LocalizableMessage>,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)?;
        if let Some(message) = &self.message {
            write!(f, " ({})", message.default_message)?;
        }
        Ok(())
    }
}

/// Overall status of a task or of the upgrade operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Pending,
    Running,
    Blocked,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Blocked => "BLOCKED",
            OperationStatus::Succeeded => "SUCCEEDED",
            OperationStatus::Failed => "FAILED",
            OperationStatus::Canceled => "CANCELED",
            OperationStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Migration upgrade status
// ============================================================================

/// Server-side state of the migration upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeState {
    Initialized,
    Deployed,
    Prepared,
    Switchover,
    Upgraded,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpgradeState::Initialized => "INITIALIZED",
            UpgradeState::Deployed => "DEPLOYED",
            UpgradeState::Prepared => "PREPARED",
            UpgradeState::Switchover => "SWITCHOVER",
            UpgradeState::Upgraded => "UPGRADED",
            UpgradeState::Canceled => "CANCELED",
            UpgradeState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Where the upgrade stops and waits for another apply call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PausePolicy {
    BeforeSwitchover,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PausePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PausePolicy::BeforeSwitchover => f.write_str("BEFORE_SWITCHOVER"),
            PausePolicy::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// Upgrade configuration as echoed back by the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<PausePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_switchover: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_replication_data: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Snapshot of the remote upgrade, read-only on this side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeStatus {
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_state: Option<UpgradeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<UpgradeState>,
    #[serde(default)]
    pub upgrade_info: UpgradeInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<Notifications>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Client-side lifecycle phase derived from an [`UpgradeStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePhase {
    NotInitialized,
    Running,
    PausedBeforeSwitchover,
    Upgraded,
    Canceled,
    Failed,
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpgradePhase::NotInitialized => "not initialized",
            UpgradePhase::Running => "running",
            UpgradePhase::PausedBeforeSwitchover => "paused before switchover",
            UpgradePhase::Upgraded => "upgraded",
            UpgradePhase::Canceled => "canceled",
            UpgradePhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl UpgradeStatus {
    /// Classify the snapshot. Terminal states win over the overall status.
    pub fn phase(&self) -> UpgradePhase {
        match self.current_state {
            Some(UpgradeState::Upgraded) => return UpgradePhase::Upgraded,
            Some(UpgradeState::Canceled) => return UpgradePhase::Canceled,
            Some(UpgradeState::Prepared)
                if self.upgrade_info.pause == Some(PausePolicy::BeforeSwitchover) =>
            {
                return UpgradePhase::PausedBeforeSwitchover;
            }
            _ => {}
        }

        match self.status {
            OperationStatus::Failed => UpgradePhase::Failed,
            OperationStatus::Pending => UpgradePhase::NotInitialized,
            _ => UpgradePhase::Running,
        }
    }

    /// Default texts of the top-level error, if any.
    pub fn error_messages(&self) -> Vec<&str> {
        self.error
            .as_ref()
            .map(ErrorInfo::default_messages)
            .unwrap_or_default()
    }
}

// ============================================================================
// Check task
// ============================================================================

/// Result of the upgrade pre-checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub notifications: Notifications,
}

/// Snapshot of a CIS task running the pre-checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckResult>,
}

// ============================================================================
// Request payloads
// ============================================================================

/// Credentials of a vCenter the lifecycle manager connects to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VcenterLocation {
    pub connection: Connection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub vcenter: VcenterLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvaInfo {
    pub location: String,
    pub ssl_verify: bool,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceDeployment {
    pub root_password: String,
    pub ova_info: OvaInfo,
}

impl fmt::Debug for ApplianceDeployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplianceDeployment")
            .field("root_password", &"[REDACTED]")
            .field("ova_info", &self.ova_info)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub appliance: ApplianceDeployment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_container: Option<Connection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationPolicy {
    pub automatic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameVmPolicy {
    pub preserve_original_vm_name: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostUpgradeConfiguration {
    pub rename_vm_policy: RenameVmPolicy,
}

/// Body of the configure and check calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitSpecPayload {
    pub version: String,
    pub deployment: DeploymentConfig,
    pub repository: RepositorySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_policy: Option<CancellationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_upgrade_configuration: Option<PostUpgradeConfiguration>,
}

/// Body of the apply call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySpecPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_switchover: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause: Option<PausePolicy>,
}

// ============================================================================
// Appliance self-update
// ============================================================================

/// Update policy of the management appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub custom_url: String,
    pub auto_stage: bool,
    pub certificate_check: bool,
    pub check_schedule: Vec<String>,
}

/// A pending appliance update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSummary {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A component that can be updated on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeableComponent {
    pub component: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAndInstallRequest {
    pub user_data: serde_json::Map<String, serde_json::Value>,
    pub component: String,
}

/// State of the appliance self-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplianceUpdateState {
    UpToDate,
    UpdatesPending,
    StageInProgress,
    InstallInProgress,
    InstallFailed,
    RollbackInProgress,
    #[serde(other)]
    Unknown,
}

impl ApplianceUpdateState {
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            ApplianceUpdateState::StageInProgress | ApplianceUpdateState::InstallInProgress
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplianceUpdateStatus {
    pub state: ApplianceUpdateState,
}

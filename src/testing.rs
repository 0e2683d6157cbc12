//! Scripted fakes of the remote services for poller and scenario tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RduError;
use crate::vcenter::api::{ApplianceUpdateApi, UpgradeApi};
use crate::vcenter::types::{
    ApplianceUpdateState, ApplianceUpdateStatus, ApplySpecPayload, CheckResult, ErrorInfo,
    InitSpecPayload, LocalizableMessage, OperationStatus, PausePolicy, PolicyConfig, TaskInfo,
    UpdateSummary, UpgradeInfo, UpgradeState, UpgradeStatus, UpgradeableComponent,
};

pub fn upgrade_status(status: OperationStatus, state: Option<UpgradeState>) -> UpgradeStatus {
    UpgradeStatus {
        status,
        current_state: state,
        desired_state: None,
        upgrade_info: UpgradeInfo::default(),
        progress: None,
        notifications: None,
        error: None,
    }
}

pub fn running() -> UpgradeStatus {
    upgrade_status(OperationStatus::Running, Some(UpgradeState::Deployed))
}

pub fn upgraded() -> UpgradeStatus {
    upgrade_status(OperationStatus::Succeeded, Some(UpgradeState::Upgraded))
}

pub fn paused() -> UpgradeStatus {
    let mut status = upgrade_status(OperationStatus::Running, Some(UpgradeState::Prepared));
    status.upgrade_info.pause = Some(PausePolicy::BeforeSwitchover);
    status
}

pub fn failed(message: &str) -> UpgradeStatus {
    let mut status = upgrade_status(OperationStatus::Failed, Some(UpgradeState::Deployed));
    status.error = Some(ErrorInfo {
        messages: vec![LocalizableMessage::new(message)],
    });
    status
}

pub fn task(status: OperationStatus, result: Option<CheckResult>) -> TaskInfo {
    TaskInfo {
        status,
        progress: None,
        error: None,
        result,
    }
}

pub fn connection_error() -> RduError {
    RduError::Connection("fake".to_string(), "connection refused".to_string())
}

/// Lifecycle manager fake. Queued responses are served in order; an empty
/// status queue keeps answering "running".
#[derive(Default)]
pub struct FakeUpgradeApi {
    initialized: bool,
    statuses: Mutex<VecDeque<Result<UpgradeStatus, RduError>>>,
    tasks: Mutex<VecDeque<Result<TaskInfo, RduError>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeUpgradeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialized() -> Self {
        Self {
            initialized: true,
            ..Self::default()
        }
    }

    pub fn push_status(&self, status: Result<UpgradeStatus, RduError>) -> &Self {
        self.statuses.lock().unwrap().push_back(status);
        self
    }

    pub fn push_statuses(&self, statuses: impl IntoIterator<Item = UpgradeStatus>) -> &Self {
        for status in statuses {
            self.push_status(Ok(status));
        }
        self
    }

    pub fn push_task(&self, task: Result<TaskInfo, RduError>) -> &Self {
        self.tasks.lock().unwrap().push_back(task);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait]
impl UpgradeApi for FakeUpgradeApi {
    async fn is_initialized(&self) -> Result<bool, RduError> {
        self.record("is_initialized");
        Ok(self.initialized)
    }

    async fn configure(&self, _spec: &InitSpecPayload) -> Result<(), RduError> {
        self.record("configure");
        Ok(())
    }

    async fn start_check(&self, spec: Option<&InitSpecPayload>) -> Result<String, RduError> {
        self.record(if spec.is_some() {
            "check_with_spec"
        } else {
            "check"
        });
        Ok("task-1".to_string())
    }

    async fn task_info(&self, _task_id: &str) -> Result<TaskInfo, RduError> {
        self.record("task_info");
        self.tasks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(task(OperationStatus::Running, None)))
    }

    async fn apply(&self, spec: &ApplySpecPayload) -> Result<(), RduError> {
        self.record(if spec.pause.is_some() {
            "apply_paused"
        } else {
            "apply"
        });
        Ok(())
    }

    async fn cancel(&self) -> Result<(), RduError> {
        self.record("cancel");
        Ok(())
    }

    async fn status(&self) -> Result<UpgradeStatus, RduError> {
        self.record("status");
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(running()))
    }
}

/// Appliance update fake.
pub struct FakeApplianceApi {
    pub pending: Result<Vec<UpdateSummary>, ()>,
    pub components: Vec<String>,
    states: Mutex<VecDeque<ApplianceUpdateState>>,
    calls: Mutex<Vec<String>>,
}

impl FakeApplianceApi {
    pub fn new(pending: &[&str], components: &[&str]) -> Self {
        Self {
            pending: Ok(pending
                .iter()
                .map(|v| UpdateSummary {
                    version: v.to_string(),
                    name: None,
                })
                .collect()),
            components: components.iter().map(|c| c.to_string()).collect(),
            states: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pending list answers 404.
    pub fn not_found() -> Self {
        Self {
            pending: Err(()),
            ..Self::new(&[], &[])
        }
    }

    pub fn push_states(&self, states: impl IntoIterator<Item = ApplianceUpdateState>) -> &Self {
        self.states.lock().unwrap().extend(states);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ApplianceUpdateApi for FakeApplianceApi {
    async fn set_policy(&self, policy: &PolicyConfig) -> Result<(), RduError> {
        self.record(format!("set_policy:{}", policy.custom_url));
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<UpdateSummary>, RduError> {
        self.record("list_pending".to_string());
        self.pending
            .clone()
            .map_err(|_| RduError::NotFound("api/appliance/update/pending".to_string()))
    }

    async fn list_upgradeable_components(
        &self,
        version: &str,
    ) -> Result<Vec<UpgradeableComponent>, RduError> {
        self.record(format!("list_components:{}", version));
        Ok(self
            .components
            .iter()
            .map(|c| UpgradeableComponent {
                component: c.clone(),
            })
            .collect())
    }

    async fn stage_and_install(&self, version: &str, component: &str) -> Result<(), RduError> {
        self.record(format!("stage_and_install:{}:{}", version, component));
        Ok(())
    }

    async fn update_status(&self) -> Result<ApplianceUpdateStatus, RduError> {
        self.record("update_status".to_string());
        let state = self
            .states
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ApplianceUpdateState::InstallInProgress);
        Ok(ApplianceUpdateStatus { state })
    }
}

//! Session-authenticated REST clients for the lifecycle-manager and
//! appliance-update services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::api::{ApplianceUpdateApi, UpgradeApi};
use super::types::{
    ApplianceUpdateStatus, ApplySpecPayload, InitSpecPayload, PolicyConfig,
    StageAndInstallRequest, TaskInfo, UpdateSummary, UpgradeStatus, UpgradeableComponent,
};
use crate::error::RduError;

const SESSION_HEADER: &str = "vmware-api-session-id";
const MIGRATION_UPGRADE: &str = "vcenter/lcm/deployment/migration-upgrade";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Port of the appliance management interface.
pub const APPLIANCE_PORT: u16 = 5480;

const PENDING_UPDATES_PATH: &str = concat!(
    "api/appliance/update/pending",
    "?source_type=LOCAL_AND_ONLINE",
    "&enable_list_major_upgrade_versions=true"
);

/// Base URL of the lifecycle-manager API on a vCenter.
pub fn lcm_base_url(server: &str) -> String {
    format!("https://{}/lcm/api", server)
}

/// Base URL of the appliance management interface on a vCenter.
pub fn appliance_base_url(server: &str) -> String {
    format!("https://{}:{}", server, APPLIANCE_PORT)
}

/// An authenticated API session against one base URL.
#[derive(Clone)]
pub struct Session {
    http: Client,
    base_url: String,
    session_id: String,
}

impl Session {
    /// Create a session with basic credentials.
    ///
    /// `session_path` is relative to `base_url`.
    pub async fn connect(
        base_url: &str,
        session_path: &str,
        username: &str,
        password: &SecretString,
        skip_verification: bool,
    ) -> Result<Self, RduError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(skip_verification)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RduError::http(module_path!(), e))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let url = format!("{}/{}", base_url, session_path);
        info!("Connecting on endpoint: {}", base_url);

        let response = http
            .post(&url)
            .basic_auth(username, Some(password.expose_secret()))
            .send()
            .await
            .map_err(|e| RduError::http(module_path!(), e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RduError::Authentication(format!(
                "{} rejected the credentials for {}",
                base_url, username
            )));
        }
        if !status.is_success() {
            return Err(api_error(response).await);
        }

        let session_id: String = response
            .json()
            .await
            .map_err(|e| RduError::http(module_path!(), e))?;
        debug!("Authenticated against {}", base_url);

        Ok(Self {
            http,
            base_url,
            session_id,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, RduError> {
        let response = request
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await
            .map_err(|e| RduError::http(module_path!(), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RduError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RduError> {
        debug!("GET {}", path);
        let response = self.send(path, self.http.get(self.url(path))).await?;
        response
            .json()
            .await
            .map_err(|e| RduError::http(module_path!(), e))
    }

    async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), RduError> {
        debug!("PUT {}", path);
        self.send(path, self.http.put(self.url(path)).json(body))
            .await?;
        Ok(())
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, RduError> {
        debug!("POST {}", path);
        let mut request = self.http.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(path, request).await
    }
}

async fn api_error(response: Response) -> RduError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RduError::Api {
        component: module_path!().to_string(),
        status,
        body,
    }
}

// ============================================================================
// Lifecycle manager
// ============================================================================

/// Client for the migration upgrade service of the lifecycle manager.
#[derive(Clone)]
pub struct LcmClient {
    session: Session,
}

impl LcmClient {
    pub async fn connect(
        base_url: &str,
        username: &str,
        password: &SecretString,
        skip_verification: bool,
    ) -> Result<Self, RduError> {
        let session =
            Session::connect(base_url, "session", username, password, skip_verification).await?;
        Ok(Self { session })
    }
}

#[async_trait]
impl UpgradeApi for LcmClient {
    async fn is_initialized(&self) -> Result<bool, RduError> {
        match self
            .session
            .get::<serde_json::Value>(MIGRATION_UPGRADE)
            .await
        {
            Ok(_) => Ok(true),
            Err(RduError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn configure(&self, spec: &InitSpecPayload) -> Result<(), RduError> {
        self.session.put(MIGRATION_UPGRADE, spec).await
    }

    async fn start_check(&self, spec: Option<&InitSpecPayload>) -> Result<String, RduError> {
        let path = format!("{}?action=check&vmw-task=true", MIGRATION_UPGRADE);
        let response = self.session.post(&path, spec).await?;
        response
            .json()
            .await
            .map_err(|e| RduError::http(module_path!(), e))
    }

    async fn task_info(&self, task_id: &str) -> Result<TaskInfo, RduError> {
        self.session.get(&format!("cis/tasks/{}", task_id)).await
    }

    async fn apply(&self, spec: &ApplySpecPayload) -> Result<(), RduError> {
        let path = format!("{}?action=apply", MIGRATION_UPGRADE);
        self.session.post(&path, Some(spec)).await?;
        Ok(())
    }

    async fn cancel(&self) -> Result<(), RduError> {
        let path = format!("{}?action=cancel", MIGRATION_UPGRADE);
        self.session.post::<()>(&path, None).await?;
        Ok(())
    }

    async fn status(&self) -> Result<UpgradeStatus, RduError> {
        self.session
            .get(&format!("{}/status", MIGRATION_UPGRADE))
            .await
    }
}

// ============================================================================
// Appliance self-update
// ============================================================================

/// Client for the appliance self-update endpoints.
#[derive(Clone)]
pub struct ApplianceClient {
    session: Session,
}

impl ApplianceClient {
    pub async fn connect(
        base_url: &str,
        username: &str,
        password: &SecretString,
        skip_verification: bool,
    ) -> Result<Self, RduError> {
        let session = Session::connect(
            base_url,
            "api/session",
            username,
            password,
            skip_verification,
        )
        .await?;
        Ok(Self { session })
    }
}

#[async_trait]
impl ApplianceUpdateApi for ApplianceClient {
    async fn set_policy(&self, policy: &PolicyConfig) -> Result<(), RduError> {
        self.session.put("api/appliance/update/policy", policy).await
    }

    async fn list_pending(&self) -> Result<Vec<UpdateSummary>, RduError> {
        self.session.get(PENDING_UPDATES_PATH).await
    }

    async fn list_upgradeable_components(
        &self,
        version: &str,
    ) -> Result<Vec<UpgradeableComponent>, RduError> {
        self.session
            .get(&format!(
                "api/appliance/update/pending/{}/upgradeable-components",
                version
            ))
            .await
    }

    async fn stage_and_install(&self, version: &str, component: &str) -> Result<(), RduError> {
        let path = format!(
            "api/appliance/update/pending/{}?action=stage-and-install",
            version
        );
        let body = StageAndInstallRequest {
            user_data: serde_json::Map::new(),
            component: component.to_string(),
        };
        self.session.post(&path, Some(&body)).await?;
        Ok(())
    }

    async fn update_status(&self) -> Result<ApplianceUpdateStatus, RduError> {
        // Served by the legacy REST surface only.
        self.session.get("rest/appliance/update").await
    }
}

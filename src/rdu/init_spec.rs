//! Init spec used to configure the upgrade.

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::vcenter::types::{
    ApplianceDeployment, CancellationPolicy, Connection, DeploymentConfig, InitSpecPayload,
    Location, OvaInfo, PostUpgradeConfiguration, RenameVmPolicy, RepositorySpec, VcenterLocation,
};

/// Credentials of the vCenter managing the source appliance.
#[derive(Debug, Clone)]
pub struct UberVc {
    pub hostname: String,
    pub username: String,
    pub password: SecretString,
}

impl UberVc {
    /// Returns a connection only when hostname, username and password are all set.
    pub fn from_parts(
        hostname: Option<&str>,
        username: Option<&str>,
        password: Option<&SecretString>,
    ) -> Option<Self> {
        match (hostname, username, password) {
            (Some(h), Some(u), Some(p))
                if !h.is_empty() && !u.is_empty() && !p.expose_secret().is_empty() =>
            {
                Some(Self {
                    hostname: h.to_string(),
                    username: u.to_string(),
                    password: p.clone(),
                })
            }
            _ => None,
        }
    }

    fn connection(&self) -> Connection {
        Connection {
            hostname: self.hostname.clone(),
            username: self.username.clone(),
            password: self.password.expose_secret().to_string(),
        }
    }
}

/// Parameters of an upgrade, translated once into an [`InitSpecPayload`].
#[derive(Debug, Clone)]
pub struct InitSpec {
    pub root_password: SecretString,
    pub target_version: String,
    pub target_ova: String,
    pub target_upgrade_repo: String,
    pub autocancellation: bool,
    pub preserve_original_name: bool,
    pub uber_vc: Option<UberVc>,
}

impl InitSpec {
    /// Spec with only the mandatory fields; everything else defaults remotely.
    pub fn new(
        root_password: SecretString,
        target_version: impl Into<String>,
        target_ova: impl Into<String>,
        target_upgrade_repo: impl Into<String>,
    ) -> Self {
        Self {
            root_password,
            target_version: target_version.into(),
            target_ova: target_ova.into(),
            target_upgrade_repo: target_upgrade_repo.into(),
            autocancellation: false,
            preserve_original_name: false,
            uber_vc: None,
        }
    }

    pub fn with_autocancellation(mut self, enabled: bool) -> Self {
        self.autocancellation = enabled;
        self
    }

    pub fn with_preserve_original_name(mut self, enabled: bool) -> Self {
        self.preserve_original_name = enabled;
        self
    }

    pub fn with_uber_vc(mut self, uber_vc: Option<UberVc>) -> Self {
        self.uber_vc = uber_vc;
        self
    }

    /// Build the request body.
    ///
    /// Fields left unset here are populated by the lifecycle manager from
    /// the source vCenter.
    pub fn to_payload(&self) -> InitSpecPayload {
        info!("Creating init spec for upgrade to {}", self.target_version);

        let (location, source_container) = match &self.uber_vc {
            Some(uber) => {
                let connection = uber.connection();
                (
                    Some(Location {
                        vcenter: VcenterLocation {
                            connection: connection.clone(),
                        },
                    }),
                    Some(connection),
                )
            }
            None => {
                info!(
                    "Missing the full information for the uber vCenter. Assuming the source vCenter is self-managed."
                );
                (None, None)
            }
        };

        InitSpecPayload {
            version: self.target_version.clone(),
            deployment: DeploymentConfig {
                appliance: ApplianceDeployment {
                    root_password: self.root_password.expose_secret().to_string(),
                    ova_info: OvaInfo {
                        location: self.target_ova.clone(),
                        ssl_verify: false,
                    },
                },
                location,
                source_container,
            },
            repository: RepositorySpec {
                address: self.target_upgrade_repo.clone(),
            },
            cancellation_policy: self
                .autocancellation
                .then_some(CancellationPolicy { automatic: true }),
            post_upgrade_configuration: self.preserve_original_name.then_some(
                PostUpgradeConfiguration {
                    rename_vm_policy: RenameVmPolicy {
                        preserve_original_vm_name: true,
                    },
                },
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn base_spec() -> InitSpec {
        InitSpec::new(
            secret("TempPass!1"),
            "9.0.1.0000",
            "https://repo.example.com/vcsa.ova",
            "https://repo.example.com/upgrade",
        )
    }

    #[test]
    fn test_minimal_payload_omits_optionals() {
        let value = serde_json::to_value(base_spec().to_payload()).unwrap();

        assert_eq!(
            value,
            json!({
                "version": "9.0.1.0000",
                "deployment": {
                    "appliance": {
                        "root_password": "TempPass!1",
                        "ova_info": {
                            "location": "https://repo.example.com/vcsa.ova",
                            "ssl_verify": false
                        }
                    }
                },
                "repository": {"address": "https://repo.example.com/upgrade"}
            })
        );
    }

    #[test]
    fn test_policies_set_when_enabled() {
        let payload = base_spec()
            .with_autocancellation(true)
            .with_preserve_original_name(true)
            .to_payload();

        assert_eq!(
            payload.cancellation_policy,
            Some(CancellationPolicy { automatic: true })
        );
        assert!(
            payload
                .post_upgrade_configuration
                .unwrap()
                .rename_vm_policy
                .preserve_original_vm_name
        );
    }

    #[test]
    fn test_uber_vc_populates_location_and_source() {
        let uber = UberVc::from_parts(
            Some("uber.example.com"),
            Some("administrator@vsphere.local"),
            Some(&secret("UberPass")),
        );
        let payload = base_spec().with_uber_vc(uber).to_payload();

        let location = payload.deployment.location.unwrap();
        assert_eq!(location.vcenter.connection.hostname, "uber.example.com");
        assert_eq!(
            payload.deployment.source_container.unwrap().password,
            "UberPass"
        );
    }

    #[test]
    fn test_uber_vc_requires_all_parts() {
        assert!(UberVc::from_parts(Some("uber"), Some("admin"), None).is_none());
        assert!(UberVc::from_parts(None, Some("admin"), Some(&secret("p"))).is_none());
        assert!(UberVc::from_parts(Some("uber"), Some(""), Some(&secret("p"))).is_none());
        assert!(UberVc::from_parts(Some("uber"), Some("admin"), Some(&secret("p"))).is_some());
    }

    #[test]
    fn test_payload_debug_hides_passwords() {
        let uber = UberVc::from_parts(Some("uber"), Some("admin"), Some(&secret("UberPass")));
        let payload = base_spec().with_uber_vc(uber).to_payload();
        let debug = format!("{:?}", payload);

        assert!(!debug.contains("TempPass!1"));
        assert!(!debug.contains("UberPass"));
    }
}

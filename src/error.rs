//! Custom error types for rdu.

use thiserror::Error;

/// Errors that can occur while driving a Reduced Downtime Upgrade.
#[derive(Error, Debug)]
pub enum RduError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("[{0}] connection failed: {1}")]
    Connection(String, String),

    #[error("[{0}] HTTP request failed: {1}")]
    Http(String, String),

    #[error("[{component}] API returned {status}: {body}")]
    Api {
        component: String,
        status: u16,
        body: String,
    },

    #[error("[{0}] resource not found")]
    NotFound(String),

    #[error("[{0}] failed to decode response: {1}")]
    Decode(String, String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connectivity issue while fetching {0} after {1} attempts")]
    Connectivity(String, u32),

    #[error(
        "Timeout waiting for {operation}: {details} (the operation may still be running, re-run the monitor)"
    )]
    Timeout { operation: String, details: String },

    #[error("Upgrade pre-checks failed: {0}")]
    PrecheckFailed(String),

    #[error(
        "No result was returned from the upgrade pre-checks, most probably the checks didn't start"
    )]
    PrecheckNoResult,

    #[error("Upgrade has failed: {0}")]
    UpgradeFailed(String),

    #[error("Upgrade cancellation has failed: {0}")]
    CancellationFailed(String),

    #[error("Lifecycle plugin update has failed: {0}")]
    PluginUpdateFailed(String),

    #[error("Operation cancelled by user")]
    UserCancelled,
}

impl RduError {
    /// Classify a transport error from the HTTP client.
    ///
    /// Connect and timeout failures, and requests or bodies cut off before
    /// a response status arrived, are kept apart from other transport errors
    /// so pollers can retry them while the appliance address moves.
    pub fn http(component: &str, err: reqwest::Error) -> Self {
        let component = component.to_string();
        let dropped = (err.is_request() || err.is_body()) && err.status().is_none();
        if err.is_connect() || err.is_timeout() || dropped {
            return RduError::Connection(component, err.to_string());
        }
        if err.is_decode() {
            return RduError::Decode(component, err.to_string());
        }
        RduError::Http(component, err.to_string())
    }

    /// Returns true for errors worth retrying during the network switchover.
    pub fn is_connection(&self) -> bool {
        matches!(self, RduError::Connection(_, _))
    }
}

//! Reduced Downtime Upgrade operations.

pub mod apply_spec;
pub mod init_spec;
pub mod monitor;
pub mod precheck;
pub mod steps;

//! CLI configuration and argument parsing.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use secrecy::SecretString;

use crate::error::RduError;
use crate::rdu::apply_spec::ApplySpec;
use crate::rdu::init_spec::{InitSpec, UberVc};
use crate::scenario::{ScenarioKind, UpgradeRequest};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: &str = env!("BUILD_COMMIT");
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// vCenter Reduced Downtime Upgrade CLI tool.
///
/// Updates the lifecycle-manager plugin, configures and pre-checks the
/// upgrade, starts it and follows it through the switchover.
#[derive(Parser, Debug, Clone)]
#[command(name = "rdu")]
#[command(about = "vCenter Reduced Downtime Upgrade CLI tool")]
#[command(version = const_format::formatcp!(
    "{} (commit: {}, build date: {})",
    VERSION, COMMIT, BUILD_DATE
))]
pub struct Args {
    /// vCenter hostname or IP address
    #[arg(short, long)]
    pub server: String,

    /// vCenter username
    #[arg(short, long, env = "VC_USERNAME")]
    pub username: String,

    /// vCenter password
    #[arg(short, long, env = "VC_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Skip TLS certificate verification
    #[arg(short = 'k', long, default_value = "false")]
    pub skip_verification: bool,

    /// Skip confirmation prompts
    #[arg(short, long, default_value = "false")]
    pub yes: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RDU_LOG_LEVEL")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a single upgrade step
    Step {
        #[arg(value_enum)]
        step: StepKind,

        #[command(flatten)]
        upgrade: UpgradeArgs,

        /// Schedule the switchover this many hours from now
        #[arg(long, value_name = "HOURS")]
        start_switchover: Option<u32>,

        /// Pause the upgrade before it enters the switchover
        #[arg(long, default_value = "false")]
        pause_before_switchover: bool,

        #[command(flatten)]
        uber: UberArgs,
    },

    /// Update the lifecycle-manager plugin
    UpdatePlugin {
        /// URL of the lifecycle plugin repository
        #[arg(long)]
        plugin_repo: String,
    },

    /// Run an end-to-end scenario
    Scenario {
        #[arg(value_enum)]
        kind: ScenarioKind,

        #[command(flatten)]
        upgrade: UpgradeArgs,

        /// Schedule the switchover this many hours from now (full-upgrade,
        /// uber-upgrade and cancellation only)
        #[arg(long, value_name = "HOURS")]
        start_switchover: Option<u32>,

        #[command(flatten)]
        uber: UberArgs,
    },
}

/// Single upgrade steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StepKind {
    /// Configure the init spec used by the upgrade
    Configure,
    /// Run the upgrade pre-checks
    Precheck,
    /// Start or resume the upgrade
    Apply,
    /// Cancel a running upgrade
    Cancel,
    /// Show the upgrade status
    Status,
    /// Follow the upgrade until it finishes, fails or is cancelled
    MonitorUpgrade,
}

/// Target of the upgrade.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct UpgradeArgs {
    /// Temporary root password of the deployed target appliance
    #[arg(long, env = "RDU_TARGET_TEMP_PASSWORD", hide_env_values = true)]
    pub target_temp_password: Option<String>,

    /// Target version in format A.B.C.DDDD
    #[arg(long)]
    pub target_version: Option<String>,

    /// URL of the target upgrade repository
    #[arg(long)]
    pub target_upgrade_repo: Option<String>,

    /// URL of the target appliance OVA
    #[arg(long)]
    pub target_ova: Option<String>,

    /// Cancel automatically if the upgrade fails
    #[arg(long, default_value = "false")]
    pub autocancellation: bool,

    /// Keep the original name of the source VM
    #[arg(long, default_value = "false")]
    pub preserve_original_name: bool,
}

/// Managing vCenter of the source appliance.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct UberArgs {
    /// Hostname of the managing vCenter
    #[arg(long)]
    pub uber_vc_hostname: Option<String>,

    /// Username for the managing vCenter
    #[arg(long)]
    pub uber_vc_username: Option<String>,

    /// Password for the managing vCenter
    #[arg(long, env = "UBER_VC_PASSWORD", hide_env_values = true)]
    pub uber_vc_password: Option<String>,
}

/// What the invocation should do.
#[derive(Debug, Clone)]
pub enum Action {
    Step {
        step: StepKind,
        init: Option<InitSpec>,
        apply: ApplySpec,
        autocancellation: bool,
    },
    UpdatePlugin {
        plugin_repo: String,
    },
    Scenario {
        kind: ScenarioKind,
        request: UpgradeRequest,
    },
}

/// Application configuration derived from CLI args.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: String,
    pub username: String,
    pub password: SecretString,
    pub skip_verification: bool,
    pub yes: bool,
    pub log_level: String,
    pub action: Action,
}

impl Config {
    /// Create config from CLI arguments.
    pub fn from_args(args: Args) -> Result<Self, RduError> {
        let action = match args.command {
            Command::Step {
                step,
                upgrade,
                start_switchover,
                pause_before_switchover,
                uber,
            } => {
                let apply = ApplySpec::new(start_switchover, pause_before_switchover)?;
                let init = init_spec(&upgrade, &uber)?;
                if init.is_none() && step == StepKind::Configure {
                    return Err(missing_target_error(&upgrade));
                }
                Action::Step {
                    step,
                    init,
                    apply,
                    autocancellation: upgrade.autocancellation,
                }
            }
            Command::UpdatePlugin { plugin_repo } => Action::UpdatePlugin { plugin_repo },
            Command::Scenario {
                kind,
                upgrade,
                start_switchover,
                uber,
            } => {
                let switchover_in_hours = start_switchover.filter(|h| *h > 0);
                if switchover_in_hours.is_some()
                    && matches!(kind, ScenarioKind::Readiness | ScenarioKind::TwoPhase)
                {
                    return Err(RduError::InvalidConfig(format!(
                        "--start-switchover does not apply to the {:?} scenario",
                        kind
                    )));
                }
                ApplySpec::new(switchover_in_hours, false)?;

                let init = init_spec(&upgrade, &uber)?
                    .ok_or_else(|| missing_target_error(&upgrade))?;
                Action::Scenario {
                    kind,
                    request: UpgradeRequest {
                        init,
                        switchover_in_hours,
                    },
                }
            }
        };

        Ok(Self {
            server: args.server,
            username: args.username,
            password: SecretString::from(args.password),
            skip_verification: args.skip_verification,
            yes: args.yes,
            log_level: args.log_level,
            action,
        })
    }
}

/// Build the init spec when every target option is set.
///
/// Returns `None` when none is set, and an error when only some are.
fn init_spec(upgrade: &UpgradeArgs, uber: &UberArgs) -> Result<Option<InitSpec>, RduError> {
    let (Some(password), Some(version), Some(ova), Some(repo)) = (
        upgrade.target_temp_password.as_deref(),
        upgrade.target_version.as_deref(),
        upgrade.target_ova.as_deref(),
        upgrade.target_upgrade_repo.as_deref(),
    ) else {
        if missing_target_options(upgrade).len() < 4 {
            return Err(missing_target_error(upgrade));
        }
        return Ok(None);
    };

    let uber_password = uber.uber_vc_password.clone().map(SecretString::from);
    let uber_vc = UberVc::from_parts(
        uber.uber_vc_hostname.as_deref(),
        uber.uber_vc_username.as_deref(),
        uber_password.as_ref(),
    );

    Ok(Some(
        InitSpec::new(SecretString::from(password.to_string()), version, ova, repo)
            .with_autocancellation(upgrade.autocancellation)
            .with_preserve_original_name(upgrade.preserve_original_name)
            .with_uber_vc(uber_vc),
    ))
}

fn missing_target_options(upgrade: &UpgradeArgs) -> Vec<&'static str> {
    [
        ("--target-temp-password", upgrade.target_temp_password.is_none()),
        ("--target-version", upgrade.target_version.is_none()),
        ("--target-upgrade-repo", upgrade.target_upgrade_repo.is_none()),
        ("--target-ova", upgrade.target_ova.is_none()),
    ]
    .into_iter()
    .filter_map(|(flag, missing)| missing.then_some(flag))
    .collect()
}

fn missing_target_error(upgrade: &UpgradeArgs) -> RduError {
    RduError::InvalidConfig(format!(
        "missing required upgrade options: {}",
        missing_target_options(upgrade).join(", ")
    ))
}

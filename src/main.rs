//! rdu - vCenter Reduced Downtime Upgrade CLI tool.
//!
//! Drives an upgrade through the lifecycle manager with:
//! - Lifecycle-manager plugin update
//! - Upgrade pre-checks
//! - Configure, apply and cancel steps
//! - Monitoring through the switchover
//! - End-to-end scenarios

mod config;
mod error;
mod output;
mod plugin;
mod poll;
mod rdu;
mod scenario;
#[cfg(test)]
mod testing;
mod vcenter;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::{debug, error, info};

use config::{Action, Args, Config, StepKind};
use error::RduError;
use output::{notifications_to_string, print_notifications};
use plugin::{PLUGIN_BUDGET, PluginUpdate};
use rdu::apply_spec::ApplySpec;
use rdu::init_spec::InitSpec;
use rdu::monitor::MonitorOutcome;
use rdu::steps::Rdu;
use scenario::{ScenarioOutcome, ScenarioRunner, ScenarioSettings};
use vcenter::client::{ApplianceClient, LcmClient, appliance_base_url, lcm_base_url};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!("Starting rdu - vCenter Reduced Downtime Upgrade Tool");

    if let Err(e) = run(&config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber.
fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// Main application logic.
async fn run(config: &Config) -> Result<()> {
    match &config.action {
        Action::Step {
            step,
            init,
            apply,
            autocancellation,
        } => run_step(config, *step, init.as_ref(), apply, *autocancellation).await,
        Action::UpdatePlugin { plugin_repo } => {
            let appliance = connect_appliance(config).await?;
            let outcome =
                plugin::update_lifecycle_plugin(&appliance, plugin_repo, PLUGIN_BUDGET).await?;
            print_plugin_update(&outcome);
            Ok(())
        }
        Action::Scenario { kind, request } => {
            let lcm = connect_lcm(config).await?;
            let appliance = connect_appliance(config).await?;
            let settings = ScenarioSettings {
                assume_yes: config.yes,
                ..Default::default()
            };

            let outcome = ScenarioRunner::new(&lcm, &appliance, settings)
                .run(*kind, request)
                .await?;
            print_scenario_outcome(outcome);
            Ok(())
        }
    }
}

async fn connect_lcm(config: &Config) -> Result<LcmClient, RduError> {
    LcmClient::connect(
        &lcm_base_url(&config.server),
        &config.username,
        &config.password,
        config.skip_verification,
    )
    .await
}

async fn connect_appliance(config: &Config) -> Result<ApplianceClient, RduError> {
    ApplianceClient::connect(
        &appliance_base_url(&config.server),
        &config.username,
        &config.password,
        config.skip_verification,
    )
    .await
}

/// Run a single upgrade step.
async fn run_step(
    config: &Config,
    step: StepKind,
    init: Option<&InitSpec>,
    apply: &ApplySpec,
    autocancellation: bool,
) -> Result<()> {
    let lcm = connect_lcm(config).await?;
    let rdu = Rdu::new(&lcm);

    match step {
        StepKind::Configure => {
            let init = init.ok_or_else(|| {
                RduError::InvalidConfig("configure requires the upgrade target".to_string())
            })?;
            rdu.configure(init).await?;
        }
        StepKind::Precheck => {
            // Checks run against the configured spec once the upgrade is initialized.
            let init = if rdu.is_initialized().await? {
                None
            } else {
                Some(init.ok_or_else(|| {
                    RduError::InvalidConfig(
                        "the upgrade is not configured yet, pre-checks require the upgrade target"
                            .to_string(),
                    )
                })?)
            };

            let result = rdu.precheck(init).await?;
            info!(
                "Upgrade prechecks result:\n{}",
                notifications_to_string(Some(&result.notifications), 1)
            );
            print_notifications(&result.notifications);
        }
        StepKind::Apply => {
            rdu.apply(apply).await?;
        }
        StepKind::Cancel => {
            rdu.cancel().await?;
        }
        StepKind::Status => {
            rdu.status().await?;
        }
        StepKind::MonitorUpgrade => {
            let payload = apply.to_payload(chrono::Utc::now())?;
            let outcome = rdu.monitor(autocancellation, &payload).await?;
            print_monitor_outcome(outcome);
        }
    }

    Ok(())
}

fn print_monitor_outcome(outcome: MonitorOutcome) {
    let line = match outcome {
        MonitorOutcome::Upgraded => "Upgrade completed".green().bold(),
        MonitorOutcome::Canceled => "Upgrade canceled".yellow().bold(),
        MonitorOutcome::PausedBeforeSwitchover => {
            "Upgrade paused before switchover, apply again to continue"
                .cyan()
                .bold()
        }
    };
    println!();
    println!("{}", line);
}

fn print_plugin_update(outcome: &PluginUpdate) {
    println!();
    match outcome {
        PluginUpdate::Installed { version } => println!(
            "{} Lifecycle plugin updated from {}",
            "✓".green(),
            version.bold()
        ),
        PluginUpdate::NotApplicable { version } => println!(
            "{} Update {} does not include the lifecycle plugin",
            "-".yellow(),
            version
        ),
        PluginUpdate::NoUpdates => println!("{} No plugin updates available", "-".yellow()),
    }
}

fn print_scenario_outcome(outcome: ScenarioOutcome) {
    match outcome {
        ScenarioOutcome::PrecheckPassed => {
            println!();
            println!("{}", "Environment is ready for the upgrade".green().bold());
        }
        ScenarioOutcome::Finished(outcome) => print_monitor_outcome(outcome),
        ScenarioOutcome::CancelRetried => {
            println!();
            println!(
                "{}",
                "Cancellation failed and was requested again. Check the status for progress."
                    .yellow()
                    .bold()
            );
        }
        ScenarioOutcome::UpgradeReapplied => {
            println!();
            println!(
                "{}",
                "Upgrade failed and was applied again. Monitor it to follow the retry."
                    .yellow()
                    .bold()
            );
        }
    }
}

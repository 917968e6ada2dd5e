//! CLI entry point for storm-hal
//!
//! Runs the module hub headless:
//! - `run` starts every configured module, optionally switches to a named
//!   parameter set and applies edits, then prints the parameters of record
//! - `check-config` loads and validates the configuration
//!
//! # Usage
//!
//! ```bash
//! storm-hal --config config/hal.toml run --select fast --set stage.x_velocity=2.0
//! storm-hal check-config
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{info, warn};

use storm_hal::config::{HalConfig, DEFAULT_CONFIG_PATH};
use storm_hal::hub::{Hub, HubActor, UiOutcome};
use storm_hal::logging::{self, OutputFormat, TracingConfig};
use storm_hal::modules::{ModuleRegistry, UiAction, UiReply};
use storm_hal::parameters::{ParameterSet, ParameterValue};
use storm_hal::protocol::{Payload, SetSelector};
use storm_hal::settings::SETTINGS_MODULE;

#[derive(Parser)]
#[command(name = "storm-hal")]
#[command(about = "Headless microscope module hub with coordinated parameter changes", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the configured log format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<OutputFormat>,

    /// Log when dispatch and coordinator spans open and close
    #[arg(long, global = true)]
    trace_spans: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hub, apply changes, print the parameters of record
    Run {
        /// Edit a value of the current set, e.g. `stage.x_velocity=2.0`
        #[arg(long = "set", value_name = "PATH=VALUE")]
        set: Vec<String>,

        /// Switch to a parameter set by name before editing
        #[arg(long)]
        select: Option<String>,

        /// Print parameters as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = HalConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;

    match cli.command {
        Commands::Run { set, select, json } => {
            let mut tracing = TracingConfig::from_config(&config)?
                .with_span_events(cli.trace_spans)
                .with_ansi(std::io::stdout().is_terminal());
            if let Some(format) = cli.log_format {
                tracing = tracing.with_format(format);
            }
            logging::init(tracing)?;
            run(config, set, select, json).await
        }
        Commands::CheckConfig => check_config(&config),
    }
}

fn check_config(config: &HalConfig) -> Result<()> {
    let registry = ModuleRegistry::with_builtin();
    for module in config.enabled_modules() {
        if !registry.list_types().contains(&module.r#type) {
            bail!("module '{}' has unknown type '{}'", module.name, module.r#type);
        }
        module.initial_parameters()?;
    }
    println!(
        "{}: {} module(s), parameters in {}",
        config.application.name,
        config.enabled_modules().len(),
        config.settings.directory.display()
    );
    Ok(())
}

fn parse_assignment(raw: &str) -> Result<(String, ParameterValue)> {
    let Some((path, value)) = raw.split_once('=') else {
        bail!("expected PATH=VALUE, got '{raw}'");
    };
    Ok((path.trim().to_string(), ParameterValue::parse_literal(value.trim())))
}

fn report_rejections(outcome: &UiOutcome) -> bool {
    let mut rejected = false;
    for report in &outcome.reports {
        if matches!(report.payload(), Payload::NewParameters { .. }) && report.has_errors() {
            rejected = true;
            for error in &report.errors {
                warn!(source = %error.source, "{}", error.message);
            }
        }
    }
    rejected
}

async fn run(config: HalConfig, set: Vec<String>, select: Option<String>, json: bool) -> Result<()> {
    info!(name = %config.application.name, "starting");

    let registry = ModuleRegistry::with_builtin();
    let hub = Hub::from_config(&config, &registry)?;
    let (handle, task) = HubActor::spawn(hub, config.hub.mailbox_capacity);
    info!(modules = ?handle.module_names().await?, "hub running");

    if let Some(name) = select {
        let outcome = handle
            .ui(SETTINGS_MODULE, UiAction::SelectParameters(SetSelector::Name(name)))
            .await?;
        if report_rejections(&outcome) {
            warn!("selection was rolled back");
        }
    }

    if !set.is_empty() {
        let mut edited = match handle.ui(SETTINGS_MODULE, UiAction::CurrentParameters).await?.reply {
            UiReply::Parameters(p) => p,
            other => bail!("unexpected reply {other:?}"),
        };
        for raw in &set {
            let (path, value) = parse_assignment(raw)?;
            edited
                .set_path(&path, value)
                .with_context(|| format!("setting {path}"))?;
        }
        let outcome = handle
            .ui(SETTINGS_MODULE, UiAction::EditParameters(edited))
            .await?;
        if report_rejections(&outcome) {
            warn!("edit was rolled back");
        }
    }

    let current: ParameterSet = match handle.ui(SETTINGS_MODULE, UiAction::CurrentParameters).await?.reply {
        UiReply::Parameters(p) => p,
        other => bail!("unexpected reply {other:?}"),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&current.to_json())?);
    } else {
        println!("# {}", current.name());
        println!("{}", current.to_toml_string()?);
    }

    handle.shutdown().await?;
    task.await?;
    Ok(())
}

mod client;
mod config;
mod firewall;
mod pce;
mod prompt;
mod provision;
mod report;
mod scope;
mod workflow;

use crate::config::{default_config_path, load_or_create};
use crate::firewall::Comparison;
use crate::pce::PceApi;
use crate::prompt::TerminalPrompter;
use crate::provision::DEFAULT_DESCRIPTION;
use crate::scope::ResolveOptions;
use crate::workflow::{ProvisionPolicy, RunOptions, ScopeSource};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "rhc-enable",
    version,
    about = "Enable rule hit count on a PCE (report template, firewall scopes, provisioning)"
)]
struct Cli {
    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the configuration file (defaults to the user config dir)"
    )]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Named PCE profile to use (otherwise the default profile)"
    )]
    pce: Option<String>,

    #[arg(long, help = "Ignore TLS certificate errors")]
    insecure: bool,

    #[arg(
        long,
        value_name = "VALUE",
        help = "Scope without prompting: 'all', 'disable' or a label value (repeat for several labels)"
    )]
    scope: Vec<String>,

    #[arg(
        long,
        value_name = "N",
        default_value_t = 3,
        help = "Attempts per label before giving up (0 = keep asking)"
    )]
    max_label_attempts: u32,

    #[arg(
        long,
        help = "Only compare scope counts and sizes when deciding whether to update"
    )]
    shallow_compare: bool,

    #[arg(long, conflicts_with = "no_provision", help = "Provision without asking")]
    yes: bool,

    #[arg(long, help = "Never provision; leave the change in draft")]
    no_provision: bool,

    #[arg(
        long,
        value_name = "TEXT",
        default_value = DEFAULT_DESCRIPTION,
        help = "Update description used when provisioning"
    )]
    description: String,

    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        help = "Log level (RUST_LOG takes precedence)"
    )]
    log_level: String,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            scope: if self.scope.is_empty() {
                ScopeSource::Interactive
            } else {
                ScopeSource::Args(self.scope.clone())
            },
            resolve: ResolveOptions {
                max_label_attempts: self.max_label_attempts,
            },
            comparison: if self.shallow_compare {
                Comparison::Shallow
            } else {
                Comparison::Exact
            },
            provision: if self.yes {
                ProvisionPolicy::Always
            } else if self.no_provision {
                ProvisionPolicy::Never
            } else {
                ProvisionPolicy::Ask
            },
            description: self.description.clone(),
        }
    }
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };

    let mut prompter = TerminalPrompter::new();
    let profile = load_or_create(&path, cli.pce.as_deref(), &mut prompter)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    if cli.insecure {
        warn!("TLS certificate verification is disabled");
    }
    info!(pce = %profile.name, url = %profile.base_url(), org = %profile.org_id, "using PCE");

    let api = PceApi::from_profile(&profile, cli.insecure)?;
    let summary = workflow::run(&api, &mut prompter, &cli.run_options())?;
    println!("{summary}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

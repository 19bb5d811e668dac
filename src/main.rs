//! runbook - playbook runner CLI.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use runbook::config::Config;
use runbook::runner::{Runner, RunnerOptions};

/// Run playbooks against an inventory.
#[derive(Parser, Debug)]
#[command(
    name = "runbook",
    version,
    about = "Run configuration-management playbooks over local, SSH and WinRM transports",
    after_help = "Examples:\n  runbook -i inventory.ini site.yml\n  runbook -i hosts deploy.yml --check --diff\n  runbook -i inventory/ site.yml -l 'web:!web02' -e env=prod --json"
)]
struct Cli {
    /// Playbook file(s) to run, in order
    #[arg(required = true)]
    playbooks: Vec<PathBuf>,

    /// Inventory file or directory
    #[arg(short = 'i', long = "inventory")]
    inventory: PathBuf,

    /// Limit execution to hosts matching this pattern
    #[arg(short = 'l', long = "limit")]
    limit: Option<String>,

    /// Number of parallel host executions per task
    #[arg(short = 'f', long = "forks")]
    forks: Option<usize>,

    /// Dry-run: report what would change without changing it
    #[arg(short = 'C', long = "check")]
    check: bool,

    /// Show diffs for file-mutating modules
    #[arg(long = "diff")]
    diff: bool,

    /// Only run tasks tagged with one of these (comma-separated)
    #[arg(short = 't', long = "tags", value_delimiter = ',')]
    tags: Vec<String>,

    /// Skip tasks tagged with one of these (comma-separated)
    #[arg(long = "skip-tags", value_delimiter = ',')]
    skip_tags: Vec<String>,

    /// Extra variables: JSON object, key=value, or @file (repeatable)
    #[arg(short = 'e', long = "extra-vars")]
    extra_vars: Vec<String>,

    /// Emit one machine-readable JSON document instead of text output
    #[arg(long = "json")]
    json: bool,

    /// Directory to receive run artifacts (result.json, run.log)
    #[arg(long = "artifacts-dir")]
    artifacts_dir: Option<PathBuf>,

    /// File holding the at-rest-secret passphrase
    #[arg(long = "vault-password-file")]
    vault_password_file: Option<PathBuf>,

    /// Configuration file (default: ./runbook.toml)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref()).unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config: {}", e);
        Config::default()
    });

    let options = RunnerOptions {
        inventory: cli.inventory,
        playbooks: cli.playbooks,
        forks: cli.forks.unwrap_or(config.defaults.forks),
        limit: cli.limit,
        check_mode: cli.check,
        diff_mode: cli.diff,
        tags: cli.tags,
        skip_tags: cli.skip_tags,
        extra_vars: cli.extra_vars,
        json_output: cli.json,
        verbosity: cli.verbose,
        artifacts_dir: cli.artifacts_dir,
        vault_password_file: cli.vault_password_file,
    };

    let exit_code = match Runner::new(options) {
        Ok(runner) => runner.run(),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

/// Verbosity-driven log filter: warn by default, up to trace at -vvv.
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}

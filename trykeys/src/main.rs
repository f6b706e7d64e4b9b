use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scpi_web::{RelayOptions, WebRelay};
use std::path::{Path, PathBuf};
use telnet_shell::{TelnetOptions, TelnetSession};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;
use trykeys_core::search::{self, RunState};
use trykeys_core::{report, CandidateKeys, SearchSettings};

mod config;

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_else(|_| String::new())
}

#[derive(Debug, Parser)]
#[command(name = "trykeys", version, about = "Recover lost Siglent SDS X-E license keys from a candidate key list")]
struct Cli {
    /// Configuration file (JSON, or YAML by extension). Defaults to ./trykeys.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log diagnostics (SCPI traffic, telnet timeouts) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Try every candidate key against the scope (default)
    Run {
        /// Do not reboot the scope after a bandwidth change
        #[arg(long, default_value_t = false)]
        no_reboot: bool,
    },
    /// Report installed licenses and current bandwidth without trying keys
    Status,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command.unwrap_or(Commands::Run { no_reboot: false }) {
        Commands::Version => {
            println!("trykeys {} (core {})", env!("CARGO_PKG_VERSION"), trykeys_core::version());
        }
        Commands::Run { no_reboot } => run(cli.config.as_deref(), no_reboot)?,
        Commands::Status => status(cli.config.as_deref())?,
    }
    Ok(())
}

fn open_telnet(settings: &config::Settings) -> Result<TelnetSession> {
    TelnetSession::open(
        &settings.scope_ip,
        settings.port,
        &settings.username,
        &settings.password,
        TelnetOptions::default(),
    )
    .with_context(|| {
        format!("Unable to establish telnet connection on port {} to scope", settings.port)
    })
}

fn open_relay(settings: &config::Settings) -> Result<WebRelay> {
    WebRelay::connect(&settings.scope_ip, &RelayOptions::default())
        .context("Unable to reach the scope's SCPI web control page")
}

fn run(config_path: Option<&Path>, no_reboot: bool) -> Result<()> {
    let settings = config::load_settings(config_path)?;
    let keys = CandidateKeys::load(&settings.key_file)?;
    info!(keys = keys.len(), scope = %settings.scope_ip, "configuration loaded");

    println!("Execution starts @ {}", now_rfc3339());
    let mut shell = open_telnet(&settings)?;
    let mut relay = open_relay(&settings)?;

    let search_settings = SearchSettings { max_bandwidth: settings.max_bandwidth };
    let report = search::run(&mut shell, &mut relay, keys, &search_settings);
    report::finish(&mut shell, &report, !no_reboot)?;

    println!("\nExecution ends @ {}", now_rfc3339());
    Ok(())
}

fn status(config_path: Option<&Path>) -> Result<()> {
    let settings = config::load_settings(config_path)?;
    let mut shell = open_telnet(&settings)?;
    let mut relay = open_relay(&settings)?;

    let mut state = RunState::default();
    search::survey_options(&mut shell, &mut state);
    search::read_installed_bandwidth_key(&mut shell, &mut state);
    match search::query_bandwidth(&mut relay) {
        Some(mhz) => match settings.max_bandwidth {
            Some(max) => println!("Scope bandwidth currently licensed: {}M of {}M", mhz, max),
            None => println!("Scope bandwidth currently licensed: {}M", mhz),
        },
        None => println!("Scope bandwidth could not be determined"),
    }
    Ok(())
}

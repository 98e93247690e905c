//! batisync command line driver
//!
//! Thin shell over the flow functions: parse arguments, initialize logging,
//! load configuration, open the connections a command needs and print the
//! outcome. Exit code is nonzero whenever a flow reports failure.

use anyhow::{Context, Result};
use batisync::buffer::BufferStore;
use batisync::config::AppConfig;
use batisync::erp;
use batisync::flows::{self, SyncOutcome};
use batisync::remote::BatiSimplyClient;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "batisync")]
#[command(about = "Batigest/Codial <-> BatiSimply synchronization connector")]
#[command(version)]
struct Cli {
    /// Configuration file (platform config directory when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the buffer tables if they do not exist
    Init,
    /// Probe the ERP, buffer and remote connections
    Check,
    /// Report staged and pending row counts per buffer table
    Status,
    /// Full synchronization passes
    Sync {
        #[command(subcommand)]
        direction: SyncDirection,
    },
    /// Stage open ERP chantiers into the buffer
    PullChantiers,
    /// Send pending buffer chantiers to the remote API
    PushChantiers,
    /// Stage won ERP devis into the buffer
    PullDevis,
    /// Send pending buffer devis to the remote API
    PushDevis,
    /// Stage remote time slots into the buffer
    PullHeures,
    /// Place validated buffer time slots into the ERP day sheet
    PushHeures,
}

#[derive(Subcommand)]
enum SyncDirection {
    /// ERP -> buffer -> remote, for the configured mode
    ToRemote,
    /// Remote -> buffer -> ERP, for time slots
    FromRemote,
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    match run(cli) {
        Ok(outcome) => {
            println!("{}", outcome.message);
            if !outcome.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(cli: Cli) -> Result<SyncOutcome> {
    let path = match cli.config {
        Some(path) => path,
        None => AppConfig::default_path()?,
    };
    let config = AppConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    match cli.command {
        Command::Init => {
            open_buffer(&config)?;
            Ok(SyncOutcome::ok(format!(
                "buffer ready at {}",
                config.buffer_path()?.display()
            )))
        }
        Command::Check => Ok(flows::check_connections(&config)),
        Command::Status => status(&config),
        Command::Sync { direction } => match direction {
            SyncDirection::ToRemote => {
                let mut erp = erp::connect(&config.erp)?;
                let mut store = open_buffer(&config)?;
                let remote = BatiSimplyClient::connect(&config.remote)?;
                Ok(flows::sync_to_remote(
                    erp.as_mut(),
                    &mut store,
                    &remote,
                    config.erp.kind,
                    config.sync.mode,
                    config.remote.head_quarter_id,
                ))
            }
            SyncDirection::FromRemote => {
                let mut erp = erp::connect(&config.erp)?;
                let mut store = open_buffer(&config)?;
                let remote = BatiSimplyClient::connect(&config.remote)?;
                Ok(flows::sync_from_remote(
                    erp.as_mut(),
                    &mut store,
                    &remote,
                    config.sync.heures_days_back,
                ))
            }
        },
        Command::PullChantiers => {
            let mut erp = erp::connect(&config.erp)?;
            let mut store = open_buffer(&config)?;
            Ok(flows::pull_chantiers(
                erp.as_mut(),
                &mut store,
                config.erp.kind,
            ))
        }
        Command::PushChantiers => {
            let mut store = open_buffer(&config)?;
            let remote = BatiSimplyClient::connect(&config.remote)?;
            if flows::push_chantiers(&mut store, &remote, config.remote.head_quarter_id) {
                Ok(SyncOutcome::ok("chantier push complete"))
            } else {
                Ok(SyncOutcome::failed(
                    "chantier push incomplete, pending rows will retry on the next run",
                ))
            }
        }
        Command::PullDevis => {
            let mut erp = erp::connect(&config.erp)?;
            let mut store = open_buffer(&config)?;
            Ok(flows::pull_devis(erp.as_mut(), &mut store))
        }
        Command::PushDevis => {
            let mut store = open_buffer(&config)?;
            let remote = BatiSimplyClient::connect(&config.remote)?;
            if flows::push_devis(&mut store, &remote, config.remote.head_quarter_id) {
                Ok(SyncOutcome::ok("devis push complete"))
            } else {
                Ok(SyncOutcome::failed(
                    "devis push incomplete, pending rows will retry on the next run",
                ))
            }
        }
        Command::PullHeures => {
            let mut store = open_buffer(&config)?;
            let remote = BatiSimplyClient::connect(&config.remote)?;
            Ok(flows::pull_heures(
                &remote,
                &mut store,
                config.sync.heures_days_back,
            ))
        }
        Command::PushHeures => {
            let mut erp = erp::connect(&config.erp)?;
            let mut store = open_buffer(&config)?;
            match flows::push_heures(&mut store, erp.as_mut()) {
                Ok(placed) => Ok(SyncOutcome::ok(format!(
                    "{placed} time slot(s) placed in the ERP day sheet"
                ))),
                Err(e) => Ok(SyncOutcome::failed(format!("timesheet push failed: {e}"))),
            }
        }
    }
}

/// Open the buffer database, creating its directory and tables when absent
fn open_buffer(config: &AppConfig) -> Result<BufferStore> {
    let path = config.buffer_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating buffer directory {}", dir.display()))?;
    }
    let store = BufferStore::open(&path)?;
    store.init_schema()?;
    Ok(store)
}

fn status(config: &AppConfig) -> Result<SyncOutcome> {
    let store = open_buffer(config)?;
    let (chantiers, chantiers_pending) = store.chantier_counts()?;
    let (devis, devis_pending) = store.devis_counts()?;
    let (heures, heures_pending, heures_placeable) = store.heure_counts()?;
    Ok(SyncOutcome::ok(format!(
        "chantiers: {chantiers} staged, {chantiers_pending} pending\n\
         devis: {devis} staged, {devis_pending} pending\n\
         heures: {heures} staged, {heures_pending} pending, {heures_placeable} placeable"
    )))
}

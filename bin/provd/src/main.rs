//! ---
//! prov_section: "01-core-functionality"
//! prov_subsection: "binary"
//! prov_type: "source"
//! prov_scope: "code"
//! prov_description: "Binary entrypoint for the provisioning daemon."
//! prov_version: "v0.0.0-prealpha"
//! prov_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use prov_api::{spawn_api_server, ApiServer, ApiState};
use prov_common::config::{AppConfig, Mode};
use prov_common::logging::init_tracing;
use prov_core::{Adapters, ProvisioningOrchestrator};
use prov_metrics::{new_registry, spawn_http_server, DaemonMetrics, ProvisioningMetrics};
use prov_persistence::{FileProjectStore, ProjectStore};
use prov_testharness::RecordingBackend;
use tokio::signal;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Project provisioning daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[arg(long, help = "Leave created resources in place when a run fails")]
    no_cleanup: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the provisioning API")]
    Run,
    #[command(about = "Validate the configuration and print the effective values")]
    CheckConfig,
    #[command(about = "List stored project records, upgrading legacy ones")]
    ListProjects,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/provd.toml"));
    candidates.push(PathBuf::from("configs/provd.example.toml"));

    let load_started = Instant::now();
    let loaded_config = AppConfig::load_with_source(&candidates)?;
    let mut config = loaded_config.config;
    let load_duration = load_started.elapsed();

    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    if cli.no_cleanup {
        config.provisioning.cleanup_allowed = false;
    }
    init_tracing("provd", &config.logging)?;
    info!(config_path = %loaded_config.source.display(), mode = ?config.mode, "configuration loaded");

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config, load_duration.as_secs_f64()).await?,
        Commands::CheckConfig => {
            let rendered = serde_json::to_string_pretty(&config)
                .context("failed to render configuration")?;
            println!("{rendered}");
        }
        Commands::ListProjects => {
            let store = FileProjectStore::open(&config.storage.directory)?;
            for record in store.list()? {
                println!(
                    "{}\t{}\t{} repositories\t{} quickstarters",
                    record.project_key,
                    record.project_name,
                    record.repositories.len(),
                    record.quickstarters.len()
                );
            }
        }
    }

    Ok(())
}

fn build_adapters(mode: Mode) -> Result<Adapters> {
    match mode {
        Mode::Simulation => {
            warn!("simulation mode: external systems are replaced by an in-memory backend");
            Ok(RecordingBackend::for_simulation().adapters())
        }
        Mode::Production => bail!(
            "production mode needs adapters for the tracker, wiki, repo host and build system; \
             none are linked into this build, start with --mode simulation"
        ),
    }
}

async fn run_daemon(config: AppConfig, config_load_seconds: f64) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let api_settings = config.api.clone();

    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.observe_config_load(config_load_seconds);
    daemon_metrics.inc_start();

    let metrics_server = if metrics_settings.enabled {
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry.clone(), metrics_settings.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };
    let provisioning_metrics = metrics_settings
        .enabled
        .then(|| ProvisioningMetrics::new(registry.clone()))
        .transpose()?;

    let adapters = build_adapters(config.mode)?;
    let store: Arc<dyn ProjectStore> = Arc::new(
        FileProjectStore::open(&config.storage.directory).with_context(|| {
            format!(
                "failed to open project store {}",
                config.storage.directory.display()
            )
        })?,
    );
    let orchestrator = ProvisioningOrchestrator::with_metrics(
        config.provisioning.clone(),
        adapters,
        store,
        provisioning_metrics,
    );
    info!(
        cleanup_allowed = config.provisioning.cleanup_allowed,
        store = %config.storage.directory.display(),
        "orchestrator ready"
    );

    let mut api_server: Option<ApiServer> = None;
    if api_settings.enabled {
        let state = Arc::new(ApiState::new(orchestrator, config.mode));
        match spawn_api_server(state, api_settings.listen) {
            Ok(server) => {
                info!(address = %server.addr(), "api server listening");
                api_server = Some(server);
            }
            Err(err) => {
                warn!(error = %err, "failed to start api server");
            }
        }
    } else {
        info!("api server disabled by configuration");
    }

    info!(mode = ?config.mode, "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    Ok(())
}

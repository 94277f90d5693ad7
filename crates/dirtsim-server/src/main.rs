//! Server entry point.

use anyhow::{Context, Result};
use clap::Parser;
use dirtproto::WebSocketService;
use dirtsim_server::evolution::GenomeRepository;
use dirtsim_server::scenario::ScenarioRegistry;
use dirtsim_server::settings::UserSettings;
use dirtsim_server::{register_handlers, StateMachine};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dirtsim-server", version, about = "DirtSim simulation server")]
struct Args {
    /// WebSocket port to listen on.
    #[arg(long, default_value_t = dirtproto::ports::SERVER)]
    port: u16,

    /// Data directory (genome repository, user settings).
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Directory holding logging-config.json.
    #[arg(long, default_value = ".")]
    config_dir: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let logging = dirtconf::LoggingConfig::load_or_create(&args.config_dir)
        .context("load logging config")?;
    dirtconf::init_logging(&logging);

    let work_dir = match &args.data_dir {
        Some(dir) => dirtconf::WorkDir::open(dir)?,
        None => dirtconf::WorkDir::default_for("server")?,
    };
    let settings = UserSettings::load(work_dir.root());
    info!(
        target: "network",
        data_dir = %work_dir.root().display(),
        volume = settings.master_volume_percent,
        "Server starting"
    );

    let repository = GenomeRepository::open(work_dir.subdir("genomes")?)
        .map_err(|e| anyhow::anyhow!(e.message))?;
    let registry = ScenarioRegistry::create_default();

    let service = WebSocketService::new("server");
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    register_handlers(&service, tx);

    service
        .listen(args.port)
        .await
        .map_err(|e| anyhow::anyhow!("listen: {e}"))?;

    let machine = StateMachine::new(registry, repository, Some(service));

    tokio::select! {
        _ = machine.run(rx) => {}
        _ = tokio::signal::ctrl_c() => info!(target: "network", "Signal received; shutting down"),
    }

    Ok(())
}

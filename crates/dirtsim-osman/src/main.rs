//! OS-manager entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dirtproto::api::global::QuitApplication;
use dirtproto::api::osman::{
    RemoteCliRun, ServiceControl, TrustBundleGet, TrustPeer, UntrustPeer,
};
use dirtproto::WebSocketService;
use dirtsim_osman::{
    local_trust_bundle, service_control, PeerAdvertiser, PeerTrustStore, RemoteSshExecutor,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dirtsim-osman", version, about = "DirtSim OS manager")]
struct Args {
    /// WebSocket port to listen on.
    #[arg(long, default_value_t = 5050)]
    port: u16,

    /// Work directory (allowlist, SSH client keys).
    #[arg(long)]
    work_dir: Option<std::path::PathBuf>,

    /// SSH user peers authenticate as.
    #[arg(long, default_value = "dirtsim")]
    ssh_user: String,

    /// Advertised role for peer discovery.
    #[arg(long, default_value = "unknown")]
    role: String,

    /// Path to this user's authorized_keys file.
    #[arg(long)]
    authorized_keys: Option<std::path::PathBuf>,

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

    let work_dir = match &args.work_dir {
        Some(dir) => dirtconf::WorkDir::open(dir)?,
        None => dirtconf::WorkDir::default_for("osman")?,
    };
    let authorized_keys = args.authorized_keys.clone().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| std::path::PathBuf::from(home).join(".ssh/authorized_keys"))
            .unwrap_or_else(|| work_dir.path("authorized_keys"))
    });

    let store = Arc::new(PeerTrustStore::new(work_dir.root(), authorized_keys));
    let executor = Arc::new(RemoteSshExecutor::new(
        work_dir.path(dirtsim_osman::keys::CLIENT_KEY_FILE),
    ));
    let work_root = work_dir.root().to_path_buf();

    // Key material exists before the first remote exec, not lazily on
    // the first TrustBundleGet.
    if let Err(e) = dirtsim_osman::ensure_client_keys(&work_root) {
        tracing::warn!(target: "osman", "Client key setup failed: {}", e.message);
    }

    let mut advertiser = PeerAdvertiser::start("dirtsim-osman", &args.role, args.port);
    info!(
        target: "osman",
        advertising = advertiser.is_running(),
        work_dir = %work_root.display(),
        "OS manager starting"
    );

    let (quit_tx, mut quit_rx) = tokio::sync::mpsc::channel::<()>(1);
    let service = WebSocketService::new("osman");

    {
        let store = Arc::clone(&store);
        service.register_handler::<TrustPeer, _>(move |cmd, reply, _ctx| {
            reply.send(store.trust(cmd.bundle));
        });
    }
    {
        let store = Arc::clone(&store);
        service.register_handler::<UntrustPeer, _>(move |cmd, reply, _ctx| {
            reply.send(store.untrust(&cmd.host));
        });
    }
    {
        let work_root = work_root.clone();
        let ssh_user = args.ssh_user.clone();
        service.register_handler::<TrustBundleGet, _>(move |_cmd, reply, _ctx| {
            reply.send(local_trust_bundle(&work_root, &ssh_user));
        });
    }
    {
        let store = Arc::clone(&store);
        let executor = Arc::clone(&executor);
        service.register_handler::<RemoteCliRun, _>(move |cmd, reply, _ctx| {
            let store = Arc::clone(&store);
            let executor = Arc::clone(&executor);
            // SSH exec is blocking I/O; keep it off the async reactor.
            tokio::task::spawn_blocking(move || {
                let result = store.load().and_then(|_| {
                    let peer = store.find(&cmd.host)?;
                    executor.run(&peer, &cmd.args, cmd.timeout_ms)
                });
                reply.send(result);
            });
        });
    }
    service.register_handler::<ServiceControl, _>(|cmd, reply, _ctx| {
        reply.send(service_control::control(&cmd.service, &cmd.action));
    });
    {
        let quit_tx = quit_tx.clone();
        service.register_handler::<QuitApplication, _>(move |_cmd, reply, _ctx| {
            reply.ok(());
            let _ = quit_tx.try_send(());
        });
    }

    service
        .listen(args.port)
        .await
        .map_err(|e| anyhow::anyhow!("listen: {e}"))?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!(target: "osman", "Signal received; shutting down"),
        _ = quit_rx.recv() => info!(target: "osman", "QuitApplication received; shutting down"),
    }

    advertiser.stop();
    Ok(())
}

//! UI entry point.

use anyhow::{Context, Result};
use clap::Parser;
use dirtproto::api::global::{GetFps, QuitApplication, StateGet};
use dirtproto::api::ui::{
    MouseDown, MouseMove, MouseUp, ScreenGrab, SimPause, SimStop, SynthKeyPress,
    TrainingResultDiscard,
};
use dirtproto::WebSocketService;
use dirtsim_ui::{AudioLink, ServerLink, UiEvent, UiMachine};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dirtsim-ui", version, about = "DirtSim UI process")]
struct Args {
    /// WebSocket port to listen on.
    #[arg(long, default_value_t = dirtproto::ports::UI)]
    port: u16,

    /// Simulation server URL.
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Audio service URL.
    #[arg(long, default_value = "ws://127.0.0.1:6060")]
    audio: String,

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

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<UiEvent>();

    let server_link = ServerLink::new(args.server.clone(), tx.clone());
    let audio_link = AudioLink::new(args.audio.clone());
    tokio::spawn(server_link.clone().run(tx.clone()));
    tokio::spawn(audio_link.clone().run());

    let service = WebSocketService::new("ui");
    macro_rules! forward {
        ($cmd:ty, $variant:expr) => {{
            let tx = tx.clone();
            service.register_handler::<$cmd, _>(move |_cmd, reply, _ctx| {
                let _ = tx.send($variant(reply));
            });
        }};
    }
    macro_rules! forward_with_body {
        ($cmd:ty, $variant:expr) => {{
            let tx = tx.clone();
            service.register_handler::<$cmd, _>(move |cmd, reply, _ctx| {
                let _ = tx.send($variant(cmd, reply));
            });
        }};
    }

    forward_with_body!(ScreenGrab, UiEvent::ScreenGrab);
    forward_with_body!(MouseDown, UiEvent::MouseDown);
    forward_with_body!(MouseUp, UiEvent::MouseUp);
    forward_with_body!(MouseMove, UiEvent::MouseMove);
    forward_with_body!(SynthKeyPress, UiEvent::SynthKeyPress);
    forward!(SimPause, UiEvent::SimPause);
    forward!(SimStop, UiEvent::SimStop);
    forward!(TrainingResultDiscard, UiEvent::TrainingResultDiscard);
    forward!(StateGet, UiEvent::StateGet);
    forward!(GetFps, UiEvent::GetFps);
    forward!(QuitApplication, UiEvent::Quit);

    service
        .listen(args.port)
        .await
        .map_err(|e| anyhow::anyhow!("listen: {e}"))?;

    let machine = UiMachine::new(Some(server_link), Some(audio_link));

    tokio::select! {
        _ = machine.run(rx) => {}
        _ = tokio::signal::ctrl_c() => info!(target: "ui", "Signal received; shutting down"),
    }

    Ok(())
}

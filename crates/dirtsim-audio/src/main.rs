//! Audio service entry point: engine + WebSocket command surface.

use anyhow::{Context, Result};
use clap::Parser;
use dirtproto::api::audio::{
    AudioDeviceList, AudioDeviceListOkay, AudioStatusGet, MasterVolumeSet, NoteOff, NoteOn,
    NoteOnOkay,
};
use dirtproto::api::global::QuitApplication;
use dirtproto::WebSocketService;
use dirtsim_audio::{list_output_devices, AudioEngine, AudioEngineConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dirtsim-audio", version, about = "DirtSim audio service")]
struct Args {
    /// WebSocket port to listen on.
    #[arg(long, default_value_t = dirtproto::ports::AUDIO)]
    port: u16,

    /// Output device name; probes when omitted.
    #[arg(long)]
    device: Option<String>,

    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 2)]
    channels: u16,

    #[arg(long, default_value_t = 1024)]
    buffer_frames: u32,

    /// Directory holding logging-config.json.
    #[arg(long, default_value = ".")]
    config_dir: std::path::PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logging = dirtconf::LoggingConfig::load_or_create(&args.config_dir)
        .context("load logging config")?;
    dirtconf::init_logging(&logging);

    // Engine start failure is terminal: no device and no fallback means
    // there is nothing to serve.
    let engine = AudioEngine::start(AudioEngineConfig {
        device_name: args.device.clone(),
        sample_rate: args.sample_rate,
        channels: args.channels,
        buffer_frames: args.buffer_frames,
    })
    .context("start audio engine")?;
    let handle = engine.handle();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    runtime.block_on(async move {
        let (quit_tx, mut quit_rx) = tokio::sync::mpsc::channel::<()>(1);

        let service = WebSocketService::new("audio");

        {
            let handle = handle.clone();
            service.register_handler::<NoteOn, _>(move |cmd, reply, _ctx| {
                let note_id = handle.note_on(cmd);
                reply.ok(NoteOnOkay { note_id });
            });
        }
        {
            let handle = handle.clone();
            service.register_handler::<NoteOff, _>(move |cmd, reply, _ctx| {
                handle.note_off(cmd.note_id);
                reply.ok(());
            });
        }
        {
            let handle = handle.clone();
            service.register_handler::<AudioStatusGet, _>(move |_cmd, reply, _ctx| {
                reply.ok(handle.status());
            });
        }
        {
            let handle = handle.clone();
            service.register_handler::<MasterVolumeSet, _>(move |cmd, reply, _ctx| {
                handle.set_master_volume(cmd.volume_percent);
                reply.ok(());
            });
        }
        service.register_handler::<AudioDeviceList, _>(|_cmd, reply, _ctx| {
            reply.ok(AudioDeviceListOkay {
                devices: list_output_devices(),
            });
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
            _ = tokio::signal::ctrl_c() => info!(target: "audio", "Signal received; shutting down"),
            _ = quit_rx.recv() => info!(target: "audio", "QuitApplication received; shutting down"),
        }
        Ok::<_, anyhow::Error>(())
    })?;

    drop(engine);
    Ok(())
}

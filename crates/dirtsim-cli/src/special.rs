//! Special CLI forms: canned multi-command workflows and local self
//! tests.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dirtproto::api::audio::AudioDeviceList;
use dirtproto::api::server::{
    GetSimStats, ScenarioList, SimRun, SimStop, StatusGet, TrainingResultDiscard,
};
use dirtproto::api::ui::ScreenGrab;
use dirtproto::scenario::ScenarioId;
use dirtproto::{ApiCommand, Envelope, Wire, WebSocketService};

use crate::dispatch::Target;

fn exit_error(message: impl std::fmt::Display) -> ! {
    println!("{}", serde_json::json!({ "error": message.to_string() }));
    std::process::exit(1);
}

async fn connect(address: &Option<String>, target: Target, timeout: u64) -> WebSocketService {
    let url = address
        .clone()
        .unwrap_or_else(|| target.default_url().to_string());
    let service = WebSocketService::new("cli");
    if let Err(e) = service.connect(&url, timeout).await {
        exit_error(format!("Connect to {url} failed: {e}"));
    }
    service
}

async fn call<C: ApiCommand>(
    service: &WebSocketService,
    command: &C,
    timeout: u64,
) -> C::Okay {
    match service.send_command(command, timeout).await {
        Ok(Ok(okay)) => okay,
        Ok(Err(api_error)) => exit_error(format!("{}: {}", C::NAME, api_error.message)),
        Err(transport) => exit_error(format!("{}: {}", C::NAME, transport)),
    }
}

/// Run the benchmark scenario for a fixed number of steps and report
/// the resulting stats.
pub async fn benchmark(address: &Option<String>, timeout: u64) -> Result<()> {
    let service = connect(address, Target::Server, timeout).await;

    call(
        &service,
        &SimRun {
            scenario_id: ScenarioId::Benchmark,
            scenario_config: None,
            timestep: 0.016,
            max_steps: 500,
            max_frame_ms: None,
        },
        timeout,
    )
    .await;

    // Let the run finish, then read the final stats.
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    let stats = call(&service, &GetSimStats::default(), timeout).await;

    println!(
        "{}",
        serde_json::json!({
            "value": {
                "steps": stats.steps,
                "sim_time": stats.sim_time,
                "fps": stats.fps,
            }
        })
    );
    Ok(())
}

/// Return the server to Idle, discarding anything unsaved.
pub async fn cleanup(address: &Option<String>, timeout: u64) -> Result<()> {
    let service = connect(address, Target::Server, timeout).await;
    // Best effort on both: either may be invalid for the current state.
    let _ = service.send_command(&SimStop::default(), timeout).await;
    let _ = service
        .send_command(&TrainingResultDiscard::default(), timeout)
        .await;
    println!("{}", serde_json::json!({ "value": { "cleaned": true } }));
    Ok(())
}

/// Exercise the round trip: status, scenario listing, a short run.
pub async fn integration_test(address: &Option<String>, timeout: u64) -> Result<()> {
    let service = connect(address, Target::Server, timeout).await;

    let status = call(&service, &StatusGet::default(), timeout).await;
    let scenarios = call(&service, &ScenarioList::default(), timeout).await;
    call(
        &service,
        &SimRun {
            scenario_id: ScenarioId::Empty,
            scenario_config: None,
            timestep: 0.016,
            max_steps: 5,
            max_frame_ms: None,
        },
        timeout,
    )
    .await;
    let _ = service.send_command(&SimStop::default(), timeout).await;

    println!(
        "{}",
        serde_json::json!({
            "value": {
                "state": status.state,
                "scenario_count": scenarios.scenarios.len(),
                "passed": true,
            }
        })
    );
    Ok(())
}

pub async fn run_all(address: &Option<String>, timeout: u64) -> Result<()> {
    integration_test(address, timeout).await?;
    benchmark(address, timeout).await
}

/// Local envelope codec self-test; needs no running service.
pub fn test_binary() -> Result<()> {
    let command = StatusGet::default();
    let envelope = Envelope::command(1, StatusGet::NAME, command.to_wire_bytes());
    let bytes = envelope.to_wire_bytes();
    let decoded = Envelope::from_wire_bytes(&bytes)
        .unwrap_or_else(|e| exit_error(format!("Envelope decode failed: {e}")));
    if decoded != envelope {
        exit_error("Envelope round-trip mismatch");
    }
    println!(
        "{}",
        serde_json::json!({ "value": { "passed": true, "bytes": bytes.len() } })
    );
    Ok(())
}

/// Grab the UI's screen and write the decoded PNG to a file.
pub async fn screenshot(address: &Option<String>, timeout: u64, file: &str) -> Result<()> {
    let service = connect(address, Target::Ui, timeout).await;
    let grab = call(&service, &ScreenGrab::default(), timeout).await;

    let bytes = BASE64
        .decode(&grab.data)
        .unwrap_or_else(|e| exit_error(format!("Screenshot payload is not base64: {e}")));
    std::fs::write(file, &bytes)
        .unwrap_or_else(|e| exit_error(format!("Write {file} failed: {e}")));

    println!(
        "{}",
        serde_json::json!({
            "value": {
                "file": file,
                "width": grab.width,
                "height": grab.height,
                "bytes": bytes.len(),
            }
        })
    );
    Ok(())
}

pub async fn list_devices(address: &Option<String>, timeout: u64) -> Result<()> {
    let service = connect(address, Target::Audio, timeout).await;
    let devices = call(&service, &AudioDeviceList::default(), timeout).await;
    println!(
        "{}",
        serde_json::json!({ "value": { "devices": devices.devices } })
    );
    Ok(())
}

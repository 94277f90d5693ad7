//! dirtsim-cli - one command per invocation against any DirtSim service.
//!
//! Exit codes: 0 on success, 1 on transport/protocol failure or a
//! command error. Output is always a single JSON object.

mod dispatch;
mod special;

use anyhow::Result;
use clap::Parser;
use dispatch::{CommandDispatcher, Target};
use dirtproto::WebSocketService;

#[derive(Parser, Debug)]
#[command(
    name = "dirtsim-cli",
    version,
    about = "DirtSim command-line client",
    after_help = "Special forms: benchmark, cleanup, integration_test, run-all, \
                  screenshot <file>, test_binary, list-devices"
)]
struct Args {
    /// Target service (server, ui, audio, os-manager) or a special form.
    target: String,

    /// Command name (e.g. StatusGet) or the special form's argument.
    command: Option<String>,

    /// JSON command body.
    body: Option<String>,

    /// Override the service URL (ws://host:port).
    #[arg(long)]
    address: Option<String>,

    /// Response timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout: u64,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn fail(message: impl std::fmt::Display) -> ! {
    println!("{}", serde_json::json!({ "error": message.to_string() }));
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Special forms take the target position.
    match args.target.as_str() {
        "benchmark" => return special::benchmark(&args.address, args.timeout).await,
        "cleanup" => return special::cleanup(&args.address, args.timeout).await,
        "integration_test" => {
            return special::integration_test(&args.address, args.timeout).await
        }
        "run-all" => return special::run_all(&args.address, args.timeout).await,
        "test_binary" => return special::test_binary(),
        "screenshot" => {
            let Some(file) = &args.command else {
                fail("screenshot requires an output file");
            };
            return special::screenshot(&args.address, args.timeout, file).await;
        }
        "list-devices" => return special::list_devices(&args.address, args.timeout).await,
        _ => {}
    }

    let Some(target) = Target::parse(&args.target) else {
        fail(format!("Unknown target '{}'", args.target));
    };
    let Some(command) = &args.command else {
        let dispatcher = CommandDispatcher::new();
        fail(format!(
            "Missing command; available: {}",
            dispatcher.command_names(target).join(", ")
        ));
    };

    let body = match &args.body {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => fail(format!("Command body is not valid JSON: {e}")),
        },
        None => serde_json::Value::Null,
    };

    let url = args
        .address
        .clone()
        .unwrap_or_else(|| target.default_url().to_string());
    let service = WebSocketService::new("cli");
    if let Err(e) = service.connect(&url, args.timeout).await {
        fail(format!("Connect to {url} failed: {e}"));
    }

    let dispatcher = CommandDispatcher::new();
    match dispatcher
        .dispatch(target, service, command, body, args.timeout)
        .await
    {
        Ok(output) => {
            println!("{}", output.body);
            if !output.ok {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(message) => fail(message),
    }
}

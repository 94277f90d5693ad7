//! Typed command dispatch for the CLI.
//!
//! A runtime table from command names to closures, built from the
//! compile-time command types. Separate tables per target let the same
//! name (SimPause on server and UI) resolve to different response types.

use std::collections::BTreeMap;

use dirtproto::{ApiCommand, WebSocketService};
use futures::future::BoxFuture;
use serde_json::Value;

/// Which service a command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Target {
    Server,
    Ui,
    Audio,
    OsManager,
}

impl Target {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "server" => Some(Self::Server),
            "ui" => Some(Self::Ui),
            "audio" => Some(Self::Audio),
            "os-manager" => Some(Self::OsManager),
            _ => None,
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            Self::Server => "ws://127.0.0.1:8080",
            Self::Ui => "ws://127.0.0.1:7070",
            Self::Audio => "ws://127.0.0.1:6060",
            Self::OsManager => "ws://127.0.0.1:5050",
        }
    }
}

/// The result of one dispatched command: the JSON to print, plus whether
/// the remote handler succeeded.
pub struct DispatchOutput {
    pub body: Value,
    pub ok: bool,
}

type Handler = Box<
    dyn Fn(WebSocketService, Value, u64) -> BoxFuture<'static, Result<DispatchOutput, String>>
        + Send
        + Sync,
>;

pub struct CommandDispatcher {
    tables: BTreeMap<Target, BTreeMap<&'static str, Handler>>,
}

impl CommandDispatcher {
    /// Build the full table of every known command.
    pub fn new() -> Self {
        use dirtproto::api::{audio, global, osman, server, ui};

        let mut dispatcher = Self {
            tables: BTreeMap::new(),
        };

        // Server
        dispatcher.register::<server::StatusGet>(Target::Server);
        dispatcher.register::<global::StateGet>(Target::Server);
        dispatcher.register::<global::GetFps>(Target::Server);
        dispatcher.register::<server::GetSimStats>(Target::Server);
        dispatcher.register::<server::SimRun>(Target::Server);
        dispatcher.register::<server::SimPause>(Target::Server);
        dispatcher.register::<server::SimResume>(Target::Server);
        dispatcher.register::<server::SimStop>(Target::Server);
        dispatcher.register::<server::SimReset>(Target::Server);
        dispatcher.register::<server::ScenarioList>(Target::Server);
        dispatcher.register::<server::ScenarioConfigGet>(Target::Server);
        dispatcher.register::<server::ScenarioConfigSet>(Target::Server);
        dispatcher.register::<server::RenderFormatSet>(Target::Server);
        dispatcher.register::<server::PixelRendererToggle>(Target::Server);
        dispatcher.register::<server::EvolutionStart>(Target::Server);
        dispatcher.register::<server::EvolutionStop>(Target::Server);
        dispatcher.register::<server::TrainingResultAvailable>(Target::Server);
        dispatcher.register::<server::TrainingResultSave>(Target::Server);
        dispatcher.register::<server::TrainingResultDiscard>(Target::Server);
        dispatcher.register::<server::TrainingBestSnapshotGet>(Target::Server);
        dispatcher.register::<server::GenomeList>(Target::Server);
        dispatcher.register::<global::QuitApplication>(Target::Server);

        // UI
        dispatcher.register::<ui::ScreenGrab>(Target::Ui);
        dispatcher.register::<ui::MouseDown>(Target::Ui);
        dispatcher.register::<ui::MouseUp>(Target::Ui);
        dispatcher.register::<ui::MouseMove>(Target::Ui);
        dispatcher.register::<ui::SynthKeyPress>(Target::Ui);
        dispatcher.register::<ui::SimPause>(Target::Ui);
        dispatcher.register::<ui::SimStop>(Target::Ui);
        dispatcher.register::<ui::TrainingResultDiscard>(Target::Ui);
        dispatcher.register::<global::StateGet>(Target::Ui);
        dispatcher.register::<global::GetFps>(Target::Ui);
        dispatcher.register::<global::QuitApplication>(Target::Ui);

        // Audio
        dispatcher.register::<audio::NoteOn>(Target::Audio);
        dispatcher.register::<audio::NoteOff>(Target::Audio);
        dispatcher.register::<audio::AudioStatusGet>(Target::Audio);
        dispatcher.register::<audio::MasterVolumeSet>(Target::Audio);
        dispatcher.register::<audio::AudioDeviceList>(Target::Audio);
        dispatcher.register::<global::QuitApplication>(Target::Audio);

        // OS manager
        dispatcher.register::<osman::TrustPeer>(Target::OsManager);
        dispatcher.register::<osman::UntrustPeer>(Target::OsManager);
        dispatcher.register::<osman::TrustBundleGet>(Target::OsManager);
        dispatcher.register::<osman::RemoteCliRun>(Target::OsManager);
        dispatcher.register::<osman::ServiceControl>(Target::OsManager);
        dispatcher.register::<global::QuitApplication>(Target::OsManager);

        dispatcher
    }

    fn register<C: ApiCommand + Sync>(&mut self, target: Target) {
        let handler: Handler = Box::new(|service, body, timeout_ms| {
            Box::pin(async move {
                let body = if body.is_null() {
                    Value::Object(serde_json::Map::new())
                } else {
                    body
                };
                let command: C = serde_json::from_value(body)
                    .map_err(|e| format!("Failed to parse command body: {e}"))?;

                match service.send_command(&command, timeout_ms).await {
                    Ok(Ok(okay)) => Ok(DispatchOutput {
                        body: serde_json::json!({
                            "value": serde_json::to_value(okay)
                                .unwrap_or(Value::Null),
                        }),
                        ok: true,
                    }),
                    Ok(Err(api_error)) => Ok(DispatchOutput {
                        body: serde_json::json!({ "error": api_error.message }),
                        ok: false,
                    }),
                    Err(transport) => Err(transport.to_string()),
                }
            })
        });

        self.tables
            .entry(target)
            .or_default()
            .insert(C::NAME, handler);
    }

    pub fn has_command(&self, target: Target, name: &str) -> bool {
        self.tables
            .get(&target)
            .map(|table| table.contains_key(name))
            .unwrap_or(false)
    }

    pub fn command_names(&self, target: Target) -> Vec<&'static str> {
        self.tables
            .get(&target)
            .map(|table| table.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Execute one command against a connected service.
    pub async fn dispatch(
        &self,
        target: Target,
        service: WebSocketService,
        name: &str,
        body: Value,
        timeout_ms: u64,
    ) -> Result<DispatchOutput, String> {
        let handler = self
            .tables
            .get(&target)
            .and_then(|table| table.get(name))
            .ok_or_else(|| format!("Unknown command '{name}' for target {target:?}"))?;
        handler(service, body, timeout_ms).await
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

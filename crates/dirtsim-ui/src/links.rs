//! Outbound links to the server and audio services.
//!
//! The server link keeps reconnecting with backoff; on each connect it
//! re-subscribes to render frames and reports connectivity changes into
//! the state machine's event queue.

use std::time::Duration;

use dirtproto::api::audio::{NoteOff, NoteOn};
use dirtproto::api::server::RenderFormatSet;
use dirtproto::render::{RenderFormat, RenderMessageFull};
use dirtproto::{ApiCommand, WebSocketService};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::machine::UiEvent;

pub const COMMAND_TIMEOUT_MS: u64 = 5_000;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const LINK_POLL: Duration = Duration::from_millis(500);

/// Client connection to the simulation server.
#[derive(Clone)]
pub struct ServerLink {
    service: WebSocketService,
    url: String,
}

impl ServerLink {
    pub fn new(url: String, events: UnboundedSender<UiEvent>) -> Self {
        let service = WebSocketService::new("ui-server-link");
        {
            let events = events.clone();
            service.register_event_handler::<RenderMessageFull, _>(move |frame| {
                let _ = events.send(UiEvent::Frame(Box::new(frame)));
            });
        }
        {
            let events = events.clone();
            service.register_event_handler::<dirtproto::api::events::EvolutionProgress, _>(
                move |progress| {
                    let _ = events.send(UiEvent::EvolutionProgress(progress));
                },
            );
        }
        Self { service, url }
    }

    /// Connection-keeper task: dial, subscribe, watch, repeat.
    pub async fn run(self, events: UnboundedSender<UiEvent>) {
        loop {
            match self.service.connect(&self.url, COMMAND_TIMEOUT_MS).await {
                Ok(()) => {
                    debug!(target: "ui", url = %self.url, "Server link up");
                    let subscribed = self
                        .service
                        .send_command(
                            &RenderFormatSet {
                                format: RenderFormat::Basic,
                            },
                            COMMAND_TIMEOUT_MS,
                        )
                        .await;
                    if let Err(e) = subscribed {
                        warn!(target: "ui", "Render subscription failed: {e}");
                    }
                    let _ = events.send(UiEvent::ServerConnected);

                    while self.service.is_connected() {
                        tokio::time::sleep(LINK_POLL).await;
                    }
                    warn!(target: "ui", "Server link lost");
                    let _ = events.send(UiEvent::ServerDisconnected);
                }
                Err(e) => {
                    debug!(target: "ui", "Server connect failed: {e}");
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Fire a command at the server from a synchronous handler; failures
    /// are logged, not surfaced.
    pub fn send_detached<C: ApiCommand + Sync>(&self, command: C) {
        let service = self.service.clone();
        tokio::spawn(async move {
            match service.send_command(&command, COMMAND_TIMEOUT_MS).await {
                Ok(Err(api_err)) => {
                    warn!(target: "ui", command = C::NAME, "Server refused: {api_err}")
                }
                Err(transport) => {
                    warn!(target: "ui", command = C::NAME, "Server unreachable: {transport}")
                }
                Ok(Ok(_)) => {}
            }
        });
    }

    /// Await a command's typed result.
    pub async fn send<C: ApiCommand>(
        &self,
        command: &C,
    ) -> Result<Result<C::Okay, dirtproto::ApiError>, dirtproto::TransportError> {
        self.service.send_command(command, COMMAND_TIMEOUT_MS).await
    }
}

/// Client connection to the audio service. Note ids are allocated by the
/// UI so NoteOff never has to wait for a NoteOn response.
#[derive(Clone)]
pub struct AudioLink {
    service: WebSocketService,
    url: String,
}

impl AudioLink {
    pub fn new(url: String) -> Self {
        Self {
            service: WebSocketService::new("ui-audio-link"),
            url,
        }
    }

    pub async fn run(self) {
        loop {
            if let Err(e) = self.service.connect(&self.url, COMMAND_TIMEOUT_MS).await {
                debug!(target: "ui", "Audio connect failed: {e}");
            } else {
                debug!(target: "ui", url = %self.url, "Audio link up");
                while self.service.is_connected() {
                    tokio::time::sleep(LINK_POLL).await;
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    pub fn note_on(&self, note: NoteOn) {
        let service = self.service.clone();
        tokio::spawn(async move {
            if let Err(e) = service.send_command(&note, COMMAND_TIMEOUT_MS).await {
                warn!(target: "ui", "NoteOn failed: {e}");
            }
        });
    }

    pub fn note_off(&self, note_id: u32) {
        let service = self.service.clone();
        tokio::spawn(async move {
            if let Err(e) = service
                .send_command(&NoteOff { note_id }, COMMAND_TIMEOUT_MS)
                .await
            {
                warn!(target: "ui", "NoteOff failed: {e}");
            }
        });
    }
}

//! The UI state machine.
//!
//! Same runtime shape as the server: one queue, serial handlers, global
//! commands first. Screen regions stand in for the widget layer; the
//! toolkit seam draws whatever the framebuffer holds.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dirtproto::api::audio::{NoteOn, Waveform};
use dirtproto::api::events::EvolutionProgress;
use dirtproto::api::global::{FpsOkay, StateOkay};
use dirtproto::api::ui::{MouseDown, MouseMove, MouseUp, ScreenGrab, ScreenGrabOkay, SynthKeyPress};
use dirtproto::error::ApiError;
use dirtproto::render::RenderMessageFull;
use dirtproto::service::Reply;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::links::{AudioLink, ServerLink};
use crate::screen::{Framebuffer, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::synth::key_frequency;

/// UI-allocated note ids live in the high half so they can never collide
/// with ids the audio engine allocates itself.
const UI_NOTE_ID_BASE: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    Startup,
    Disconnected,
    StartMenu,
    SimRunning,
    Paused,
    Synth,
    SynthConfig,
    Training,
    Shutdown,
}

impl UiState {
    pub fn name(&self) -> &'static str {
        match self {
            UiState::Startup => "Startup",
            UiState::Disconnected => "Disconnected",
            UiState::StartMenu => "StartMenu",
            UiState::SimRunning => "SimRunning",
            UiState::Paused => "Paused",
            UiState::Synth => "Synth",
            UiState::SynthConfig => "SynthConfig",
            UiState::Training => "Training",
            UiState::Shutdown => "Shutdown",
        }
    }
}

pub enum UiEvent {
    // Commands from the WebSocket surface.
    ScreenGrab(ScreenGrab, Reply<ScreenGrabOkay>),
    MouseDown(MouseDown, Reply<()>),
    MouseUp(MouseUp, Reply<()>),
    MouseMove(MouseMove, Reply<()>),
    SynthKeyPress(SynthKeyPress, Reply<()>),
    SimPause(Reply<()>),
    SimStop(Reply<()>),
    TrainingResultDiscard(Reply<()>),
    StateGet(Reply<StateOkay>),
    GetFps(Reply<FpsOkay>),
    Quit(Reply<()>),
    // Internal transitions.
    ServerConnected,
    ServerDisconnected,
    Frame(Box<RenderMessageFull>),
    EvolutionProgress(EvolutionProgress),
}

/// A clickable screen region; the widget layer's stand-in.
#[derive(Debug, Clone, Copy)]
struct Region {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

impl Region {
    const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }
}

const BUTTON_SANDBOX: Region = Region::new(40.0, 80.0, 200.0, 80.0);
const BUTTON_RAINING: Region = Region::new(40.0, 180.0, 200.0, 80.0);
const BUTTON_SYNTH: Region = Region::new(40.0, 280.0, 200.0, 80.0);
const BUTTON_PAUSE: Region = Region::new(700.0, 8.0, 80.0, 36.0);
const BUTTON_STOP: Region = Region::new(610.0, 8.0, 80.0, 36.0);
const BUTTON_SYNTH_CONFIG: Region = Region::new(700.0, 8.0, 80.0, 36.0);
const BUTTON_SYNTH_BACK: Region = Region::new(8.0, 436.0, 120.0, 36.0);

struct FrameFps {
    frames: u32,
    window_start: Instant,
    fps: f64,
}

pub struct UiMachine {
    state: UiState,
    framebuffer: Framebuffer,
    server: Option<ServerLink>,
    audio: Option<AudioLink>,
    held_notes: HashMap<String, u32>,
    next_note_id: u32,
    cursor: (f64, f64),
    fps: FrameFps,
}

impl UiMachine {
    pub fn new(server: Option<ServerLink>, audio: Option<AudioLink>) -> Self {
        let mut machine = Self {
            state: UiState::Startup,
            framebuffer: Framebuffer::new(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            server,
            audio,
            held_notes: HashMap::new(),
            next_note_id: UI_NOTE_ID_BASE,
            cursor: (0.0, 0.0),
            fps: FrameFps {
                frames: 0,
                window_start: Instant::now(),
                fps: 0.0,
            },
        };
        machine.framebuffer.clear(0x10, 0x10, 0x18);
        machine.transition(UiState::Disconnected);
        machine
    }

    pub fn state(&self) -> UiState {
        self.state
    }

    pub fn held_note_count(&self) -> usize {
        self.held_notes.len()
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<UiEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event);
            if self.state == UiState::Shutdown {
                break;
            }
        }
        info!(target: "ui", "UI state machine stopped");
    }

    fn transition(&mut self, new: UiState) {
        if new == self.state {
            return;
        }
        self.on_exit();
        let old = self.state;
        self.state = new;
        self.on_enter();
        debug!(target: "ui", from = old.name(), to = new.name(), "State transition");
    }

    fn on_exit(&mut self) {
        if self.state == UiState::Synth {
            // Leaving the synth silences everything we started.
            let ids: Vec<u32> = self.held_notes.drain().map(|(_, id)| id).collect();
            if let Some(audio) = &self.audio {
                for id in ids {
                    audio.note_off(id);
                }
            }
        }
    }

    fn on_enter(&mut self) {
        match self.state {
            UiState::Disconnected => self.framebuffer.clear(0x10, 0x10, 0x18),
            UiState::StartMenu => self.framebuffer.clear(0x20, 0x28, 0x30),
            _ => {}
        }
    }

    pub fn handle_event(&mut self, event: UiEvent) {
        match event {
            // --- global ---
            UiEvent::StateGet(reply) => reply.send(Ok(StateOkay {
                state: self.state.name().to_string(),
            })),
            UiEvent::GetFps(reply) => reply.send(Ok(FpsOkay { fps: self.fps.fps })),
            UiEvent::Quit(reply) => {
                reply.send(Ok(()));
                self.transition(UiState::Shutdown);
            }
            UiEvent::ScreenGrab(cmd, reply) => reply.send(self.cmd_screen_grab(cmd)),
            UiEvent::MouseMove(cmd, reply) => {
                self.cursor = (cmd.x, cmd.y);
                reply.send(Ok(()));
            }
            UiEvent::MouseUp(cmd, reply) => {
                self.cursor = (cmd.x, cmd.y);
                reply.send(Ok(()));
            }
            UiEvent::ServerConnected => {
                if matches!(self.state, UiState::Startup | UiState::Disconnected) {
                    self.transition(UiState::StartMenu);
                }
            }
            UiEvent::ServerDisconnected => {
                if self.state != UiState::Shutdown {
                    self.transition(UiState::Disconnected);
                }
            }
            UiEvent::Frame(frame) => {
                self.framebuffer.draw_frame(&frame.message);
                self.on_frame();
            }
            UiEvent::EvolutionProgress(progress) => {
                if matches!(
                    self.state,
                    UiState::StartMenu | UiState::SimRunning | UiState::Paused
                ) {
                    info!(
                        target: "ui",
                        generation = progress.generation,
                        "Training in progress; showing training view"
                    );
                    self.transition(UiState::Training);
                }
            }

            // --- per-state ---
            UiEvent::MouseDown(cmd, reply) => {
                self.cursor = (cmd.x, cmd.y);
                self.cmd_mouse_down(cmd.x, cmd.y);
                reply.send(Ok(()));
            }
            UiEvent::SynthKeyPress(cmd, reply) => reply.send(self.cmd_synth_key(cmd)),
            UiEvent::SimPause(reply) => reply.send(self.cmd_sim_pause()),
            UiEvent::SimStop(reply) => reply.send(self.cmd_sim_stop()),
            UiEvent::TrainingResultDiscard(reply) => {
                reply.send(self.cmd_training_result_discard())
            }
        }
    }

    fn invalid_state(&self, command: &str) -> ApiError {
        ApiError::new(format!(
            "Command {command} not valid in state {}",
            self.state.name()
        ))
    }

    fn on_frame(&mut self) {
        self.fps.frames += 1;
        let elapsed = self.fps.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.fps.fps = self.fps.frames as f64 / elapsed.as_secs_f64();
            self.fps.frames = 0;
            self.fps.window_start = Instant::now();
        }
    }

    fn cmd_screen_grab(&mut self, cmd: ScreenGrab) -> Result<ScreenGrabOkay, ApiError> {
        if cmd.format != "png" {
            return Err(ApiError::new(format!(
                "Unsupported screenshot format '{}'",
                cmd.format
            )));
        }
        self.framebuffer.grab_png()
    }

    fn cmd_mouse_down(&mut self, x: f64, y: f64) {
        match self.state {
            UiState::StartMenu => {
                if BUTTON_SANDBOX.contains(x, y) {
                    self.start_scenario(dirtproto::scenario::ScenarioId::Sandbox);
                } else if BUTTON_RAINING.contains(x, y) {
                    self.start_scenario(dirtproto::scenario::ScenarioId::Raining);
                } else if BUTTON_SYNTH.contains(x, y) {
                    self.transition(UiState::Synth);
                }
            }
            UiState::SimRunning => {
                if BUTTON_PAUSE.contains(x, y) {
                    let _ = self.cmd_sim_pause();
                } else if BUTTON_STOP.contains(x, y) {
                    let _ = self.cmd_sim_stop();
                }
            }
            UiState::Paused => {
                if BUTTON_PAUSE.contains(x, y) {
                    let _ = self.cmd_sim_pause();
                } else if BUTTON_STOP.contains(x, y) {
                    let _ = self.cmd_sim_stop();
                }
            }
            UiState::Synth => {
                if BUTTON_SYNTH_CONFIG.contains(x, y) {
                    self.transition(UiState::SynthConfig);
                } else if BUTTON_SYNTH_BACK.contains(x, y) {
                    self.transition(UiState::StartMenu);
                }
            }
            UiState::SynthConfig => self.transition(UiState::Synth),
            _ => debug!(target: "ui", state = self.state.name(), "Click ignored"),
        }
    }

    fn start_scenario(&mut self, scenario_id: dirtproto::scenario::ScenarioId) {
        if let Some(server) = &self.server {
            server.send_detached(dirtproto::api::server::SimRun {
                scenario_id,
                scenario_config: None,
                timestep: 0.016,
                max_steps: -1,
                max_frame_ms: Some(16),
            });
        }
        self.transition(UiState::SimRunning);
    }

    fn cmd_synth_key(&mut self, cmd: SynthKeyPress) -> Result<(), ApiError> {
        if self.state != UiState::Synth {
            return Err(self.invalid_state("SynthKeyPress"));
        }
        let Some(frequency_hz) = key_frequency(&cmd.key) else {
            return Err(ApiError::new(format!("Unknown synth key '{}'", cmd.key)));
        };

        if cmd.pressed {
            let note_id = self.next_note_id;
            self.next_note_id += 1;
            self.held_notes.insert(cmd.key.clone(), note_id);
            if let Some(audio) = &self.audio {
                audio.note_on(NoteOn {
                    note_id,
                    frequency_hz,
                    amplitude: 0.6,
                    attack_s: 0.01,
                    duration_s: 0.0,
                    release_s: 0.15,
                    waveform: Waveform::Saw,
                });
            }
        } else if let Some(note_id) = self.held_notes.remove(&cmd.key) {
            if let Some(audio) = &self.audio {
                audio.note_off(note_id);
            }
        } else {
            warn!(target: "ui", key = %cmd.key, "Release for a key that was never pressed");
        }
        Ok(())
    }

    fn cmd_sim_pause(&mut self) -> Result<(), ApiError> {
        match self.state {
            UiState::SimRunning => {
                if let Some(server) = &self.server {
                    server.send_detached(dirtproto::api::server::SimPause::default());
                }
                self.transition(UiState::Paused);
                Ok(())
            }
            UiState::Paused => {
                if let Some(server) = &self.server {
                    server.send_detached(dirtproto::api::server::SimResume::default());
                }
                self.transition(UiState::SimRunning);
                Ok(())
            }
            _ => Err(self.invalid_state("SimPause")),
        }
    }

    fn cmd_sim_stop(&mut self) -> Result<(), ApiError> {
        match self.state {
            UiState::SimRunning | UiState::Paused => {
                if let Some(server) = &self.server {
                    server.send_detached(dirtproto::api::server::SimStop::default());
                }
                self.transition(UiState::StartMenu);
                Ok(())
            }
            _ => Err(self.invalid_state("SimStop")),
        }
    }

    fn cmd_training_result_discard(&mut self) -> Result<(), ApiError> {
        match self.state {
            UiState::Training => {
                if let Some(server) = &self.server {
                    server.send_detached(dirtproto::api::server::TrainingResultDiscard::default());
                }
                self.transition(UiState::StartMenu);
                Ok(())
            }
            _ => Err(self.invalid_state("TrainingResultDiscard")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn machine() -> UiMachine {
        UiMachine::new(None, None)
    }

    #[test]
    fn startup_lands_in_disconnected() {
        assert_eq!(machine().state(), UiState::Disconnected);
    }

    #[test]
    fn connect_and_disconnect_cycle() {
        let mut m = machine();
        m.handle_event(UiEvent::ServerConnected);
        assert_eq!(m.state(), UiState::StartMenu);
        m.handle_event(UiEvent::ServerDisconnected);
        assert_eq!(m.state(), UiState::Disconnected);
    }

    #[test]
    fn start_menu_buttons_route_clicks() {
        let mut m = machine();
        m.handle_event(UiEvent::ServerConnected);
        m.cmd_mouse_down(100.0, 100.0); // sandbox button
        assert_eq!(m.state(), UiState::SimRunning);
    }

    #[test]
    fn synth_key_lifecycle_tracks_held_notes() {
        let mut m = machine();
        m.handle_event(UiEvent::ServerConnected);
        m.cmd_mouse_down(100.0, 300.0); // synth button
        assert_eq!(m.state(), UiState::Synth);

        m.cmd_synth_key(SynthKeyPress {
            key: "C4".into(),
            pressed: true,
        })
        .unwrap();
        m.cmd_synth_key(SynthKeyPress {
            key: "E4".into(),
            pressed: true,
        })
        .unwrap();
        assert_eq!(m.held_note_count(), 2);

        m.cmd_synth_key(SynthKeyPress {
            key: "C4".into(),
            pressed: false,
        })
        .unwrap();
        assert_eq!(m.held_note_count(), 1);
    }

    #[test]
    fn leaving_synth_releases_everything() {
        let mut m = machine();
        m.handle_event(UiEvent::ServerConnected);
        m.cmd_mouse_down(100.0, 300.0);
        m.cmd_synth_key(SynthKeyPress {
            key: "A4".into(),
            pressed: true,
        })
        .unwrap();
        m.cmd_mouse_down(20.0, 450.0); // back button
        assert_eq!(m.state(), UiState::StartMenu);
        assert_eq!(m.held_note_count(), 0);
    }

    #[test]
    fn synth_keys_rejected_outside_synth() {
        let mut m = machine();
        m.handle_event(UiEvent::ServerConnected);
        let err = m
            .cmd_synth_key(SynthKeyPress {
                key: "C4".into(),
                pressed: true,
            })
            .unwrap_err();
        assert!(err.message.contains("not valid in state StartMenu"));
    }

    #[test]
    fn pause_toggles_and_stop_returns_to_menu() {
        let mut m = machine();
        m.handle_event(UiEvent::ServerConnected);
        m.cmd_mouse_down(100.0, 100.0);
        assert_eq!(m.state(), UiState::SimRunning);

        m.cmd_sim_pause().unwrap();
        assert_eq!(m.state(), UiState::Paused);
        m.cmd_sim_pause().unwrap();
        assert_eq!(m.state(), UiState::SimRunning);

        m.cmd_sim_stop().unwrap();
        assert_eq!(m.state(), UiState::StartMenu);
    }

    #[test]
    fn evolution_progress_enters_training() {
        let mut m = machine();
        m.handle_event(UiEvent::ServerConnected);
        m.handle_event(UiEvent::EvolutionProgress(EvolutionProgress {
            generation: 1,
            generations_total: 5,
            best_fitness: 1.0,
            mean_fitness: 0.5,
            evaluated: 8,
        }));
        assert_eq!(m.state(), UiState::Training);

        m.cmd_training_result_discard().unwrap();
        assert_eq!(m.state(), UiState::StartMenu);
    }

    #[test]
    fn screen_grab_rejects_unknown_format() {
        let mut m = machine();
        let err = m
            .cmd_screen_grab(ScreenGrab {
                format: "bmp".into(),
            })
            .unwrap_err();
        assert!(err.message.contains("Unsupported screenshot format"));
    }

    #[test]
    fn screen_grab_returns_png() {
        let mut m = machine();
        let okay = m.cmd_screen_grab(ScreenGrab::default()).unwrap();
        assert_eq!(okay.format, "png");
        assert!(okay.width > 0 && okay.height > 0);
    }
}

//! The server state machine: a single task draining one event queue,
//! ticking the active session, and broadcasting render frames.
//!
//! Events arrive from the network dispatcher (each carrying its one-shot
//! reply) and from the internal tick timer; handlers run serially, so no
//! two ever overlap. Global commands (quit, fps, stats, state) are
//! answered before per-state dispatch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dirtproto::api::events::{
    EvolutionProgress, TrainingBestPlaybackFrame, TrainingBestSnapshot, TrainingResultReady,
};
use dirtproto::api::global::{FpsOkay, StateOkay};
use dirtproto::api::server::{
    EvolutionStart, GenomeListOkay, ScenarioConfigOkay, ScenarioConfigSet, ScenarioListOkay,
    SimRun, SimRunOkay, SimStats, StatusOkay, TrainingResultAvailableOkay, TrainingResultSave,
    TrainingResultSaveOkay,
};
use dirtproto::error::ApiError;
use dirtproto::render::{RenderFormat, RenderMessageFull};
use dirtproto::service::{ConnectionId, Reply, WebSocketService};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::evolution::{EvolutionRun, GenomeRepository, StepOutcome, TrainingResult};
use crate::render::pack_render_message;
use crate::scenario::ScenarioRegistry;
use crate::session::ScenarioSession;

/// Parameters of an active simulation run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub timestep: f64,
    pub max_steps: i64,
    pub steps_done: i64,
    pub max_frame_ms: Option<u32>,
}

pub enum State {
    Startup,
    Idle,
    SimRunning(RunParams),
    Paused(RunParams),
    Evolution(Box<EvolutionRun>),
    UnsavedTrainingResult(TrainingResult),
    Error(String),
    Shutdown,
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Startup => "Startup",
            State::Idle => "Idle",
            State::SimRunning(_) => "SimRunning",
            State::Paused(_) => "Paused",
            State::Evolution(_) => "Evolution",
            State::UnsavedTrainingResult(_) => "UnsavedTrainingResult",
            State::Error(_) => "Error",
            State::Shutdown => "Shutdown",
        }
    }
}

/// Everything the event queue can carry.
pub enum ServerEvent {
    StatusGet(Reply<StatusOkay>),
    StateGet(Reply<StateOkay>),
    GetFps(Reply<FpsOkay>),
    GetSimStats(Reply<SimStats>),
    Quit(Reply<()>),
    SimRun(SimRun, Reply<SimRunOkay>),
    SimPause(Reply<()>),
    SimResume(Reply<()>),
    SimStop(Reply<()>),
    SimReset(Reply<()>),
    ScenarioList(Reply<ScenarioListOkay>),
    ScenarioConfigGet(Reply<ScenarioConfigOkay>),
    ScenarioConfigSet(ScenarioConfigSet, Reply<()>),
    RenderFormatSet(RenderFormat, ConnectionId, Reply<()>),
    PixelRendererToggle(ConnectionId, Reply<()>),
    EvolutionStart(EvolutionStart, Reply<()>),
    EvolutionStop(Reply<()>),
    TrainingResultAvailable(Reply<TrainingResultAvailableOkay>),
    TrainingResultSave(TrainingResultSave, Reply<TrainingResultSaveOkay>),
    TrainingResultDiscard(Reply<()>),
    TrainingBestSnapshotGet(Reply<Option<TrainingBestSnapshot>>),
    GenomeList(Reply<GenomeListOkay>),
}

struct FpsTracker {
    frames: u32,
    window_start: Instant,
    fps: f64,
}

impl FpsTracker {
    fn new() -> Self {
        Self {
            frames: 0,
            window_start: Instant::now(),
            fps: 0.0,
        }
    }

    fn on_frame(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            self.fps = self.frames as f64 / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = Instant::now();
        }
    }
}

pub struct StateMachine {
    state: State,
    session: ScenarioSession,
    registry: ScenarioRegistry,
    repository: GenomeRepository,
    subscribers: HashMap<ConnectionId, RenderFormat>,
    service: Option<WebSocketService>,
    fps: FpsTracker,
    best_snapshot: Option<TrainingBestSnapshot>,
}

impl StateMachine {
    pub fn new(
        registry: ScenarioRegistry,
        repository: GenomeRepository,
        service: Option<WebSocketService>,
    ) -> Self {
        let mut machine = Self {
            state: State::Startup,
            session: ScenarioSession::new(),
            registry,
            repository,
            subscribers: HashMap::new(),
            service,
            fps: FpsTracker::new(),
            best_snapshot: None,
        };
        machine.transition(State::Idle);
        machine
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Drain events and tick until shutdown.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ServerEvent>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(16));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
                _ = ticker.tick(), if self.wants_tick() => self.on_tick(),
            }
            if matches!(self.state, State::Shutdown) {
                break;
            }
        }
        info!(target: "network", "Server state machine stopped");
    }

    fn wants_tick(&self) -> bool {
        matches!(self.state, State::SimRunning(_) | State::Evolution(_))
    }

    fn transition(&mut self, new: State) {
        let old_name = self.state.name();
        self.on_exit();
        self.state = new;
        self.on_enter();
        debug!(target: "network", from = old_name, to = self.state.name(), "State transition");
    }

    fn on_exit(&mut self) {
        if let State::Evolution(_) = &self.state {
            debug!(target: "evolution", "Leaving evolution");
        }
    }

    fn on_enter(&mut self) {
        match &self.state {
            State::Idle => {}
            State::SimRunning(_) => self.broadcast_frames(),
            State::UnsavedTrainingResult(result) => {
                let candidate_ids = result.candidates.iter().map(|c| c.id.clone()).collect();
                self.broadcast(&TrainingResultReady { candidate_ids });
            }
            _ => {}
        }
    }

    /// Global handlers run first; everything else dispatches per-state.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            // --- global, any state ---
            ServerEvent::StatusGet(reply) => reply.send(Ok(self.status())),
            ServerEvent::StateGet(reply) => reply.send(Ok(StateOkay {
                state: self.state.name().to_string(),
            })),
            ServerEvent::GetFps(reply) => reply.send(Ok(FpsOkay { fps: self.fps.fps })),
            ServerEvent::GetSimStats(reply) => reply.send(Ok(self.sim_stats())),
            ServerEvent::Quit(reply) => {
                reply.send(Ok(()));
                self.transition(State::Shutdown);
            }
            ServerEvent::ScenarioList(reply) => reply.send(Ok(ScenarioListOkay {
                scenarios: self.registry.all_metadata(),
            })),
            ServerEvent::GenomeList(reply) => reply.send(Ok(GenomeListOkay {
                ids: self.repository.list(),
            })),
            ServerEvent::RenderFormatSet(format, connection, reply) => {
                self.subscribers.insert(connection, format);
                reply.send(Ok(()));
            }
            ServerEvent::PixelRendererToggle(connection, reply) => {
                let format = match self.subscribers.get(&connection) {
                    Some(RenderFormat::Basic) => RenderFormat::Debug,
                    _ => RenderFormat::Basic,
                };
                self.subscribers.insert(connection, format);
                reply.send(Ok(()));
            }
            ServerEvent::TrainingResultAvailable(reply) => {
                reply.send(Ok(self.training_result_available()))
            }
            ServerEvent::TrainingBestSnapshotGet(reply) => {
                reply.send(Ok(self.best_snapshot.clone()))
            }

            // --- per-state ---
            ServerEvent::SimRun(cmd, reply) => reply.send(self.cmd_sim_run(cmd)),
            ServerEvent::SimPause(reply) => reply.send(self.cmd_sim_pause()),
            ServerEvent::SimResume(reply) => reply.send(self.cmd_sim_resume()),
            ServerEvent::SimStop(reply) => reply.send(self.cmd_sim_stop()),
            ServerEvent::SimReset(reply) => reply.send(self.cmd_sim_reset()),
            ServerEvent::ScenarioConfigGet(reply) => reply.send(self.cmd_scenario_config_get()),
            ServerEvent::ScenarioConfigSet(cmd, reply) => {
                reply.send(self.cmd_scenario_config_set(cmd))
            }
            ServerEvent::EvolutionStart(cmd, reply) => reply.send(self.cmd_evolution_start(cmd)),
            ServerEvent::EvolutionStop(reply) => reply.send(self.cmd_evolution_stop()),
            ServerEvent::TrainingResultSave(cmd, reply) => {
                reply.send(self.cmd_training_result_save(cmd))
            }
            ServerEvent::TrainingResultDiscard(reply) => {
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

    fn status(&mut self) -> StatusOkay {
        let (width, height) = self.session.world_dimensions();
        StatusOkay {
            scenario_id: self.session.scenario_id(),
            width,
            height,
            timestep: self.session.timestep(),
            state: self.state.name().to_string(),
        }
    }

    fn sim_stats(&mut self) -> SimStats {
        let (width, height) = self.session.world_dimensions();
        SimStats {
            steps: self.session.timestep().max(0) as u64,
            sim_time: self.session.sim_time(),
            fps: self.fps.fps,
            width,
            height,
        }
    }

    fn training_result_available(&self) -> TrainingResultAvailableOkay {
        match &self.state {
            State::UnsavedTrainingResult(result) => TrainingResultAvailableOkay {
                available: true,
                candidate_ids: result.candidates.iter().map(|c| c.id.clone()).collect(),
            },
            _ => TrainingResultAvailableOkay {
                available: false,
                candidate_ids: Vec::new(),
            },
        }
    }

    pub fn cmd_sim_run(&mut self, cmd: SimRun) -> Result<SimRunOkay, ApiError> {
        match self.state {
            State::Idle | State::SimRunning(_) | State::Paused(_) | State::Error(_) => {}
            _ => return Err(self.invalid_state("SimRun")),
        }

        self.session
            .start(&self.registry, cmd.scenario_id, cmd.scenario_config, None)?;

        info!(
            target: "scenario",
            scenario = %cmd.scenario_id,
            timestep = cmd.timestep,
            max_steps = cmd.max_steps,
            "Simulation started"
        );
        self.transition(State::SimRunning(RunParams {
            timestep: cmd.timestep,
            max_steps: cmd.max_steps,
            steps_done: 0,
            max_frame_ms: cmd.max_frame_ms,
        }));
        Ok(SimRunOkay { running: true })
    }

    pub fn cmd_sim_pause(&mut self) -> Result<(), ApiError> {
        match &self.state {
            State::SimRunning(params) => {
                let params = params.clone();
                self.transition(State::Paused(params));
                Ok(())
            }
            _ => Err(self.invalid_state("SimPause")),
        }
    }

    pub fn cmd_sim_resume(&mut self) -> Result<(), ApiError> {
        match &self.state {
            State::Paused(params) => {
                let params = params.clone();
                self.transition(State::SimRunning(params));
                Ok(())
            }
            _ => Err(self.invalid_state("SimResume")),
        }
    }

    pub fn cmd_sim_stop(&mut self) -> Result<(), ApiError> {
        match self.state {
            State::SimRunning(_) | State::Paused(_) | State::Error(_) => {
                self.session.stop();
                self.transition(State::Idle);
                Ok(())
            }
            _ => Err(self.invalid_state("SimStop")),
        }
    }

    pub fn cmd_sim_reset(&mut self) -> Result<(), ApiError> {
        match self.state {
            State::SimRunning(_) | State::Paused(_) => self.session.reset(),
            _ => Err(self.invalid_state("SimReset")),
        }
    }

    pub fn cmd_scenario_config_get(&mut self) -> Result<ScenarioConfigOkay, ApiError> {
        self.session
            .scenario_config()
            .map(|config| ScenarioConfigOkay { config })
            .ok_or_else(|| ApiError::new("No active scenario session"))
    }

    pub fn cmd_scenario_config_set(&mut self, cmd: ScenarioConfigSet) -> Result<(), ApiError> {
        self.session.set_config(cmd.config)
    }

    pub fn cmd_evolution_start(&mut self, cmd: EvolutionStart) -> Result<(), ApiError> {
        match &self.state {
            State::Idle => {}
            State::UnsavedTrainingResult(result) => {
                info!(
                    target: "evolution",
                    discarded = result.candidates.len(),
                    "Unsaved training result discarded by new run"
                );
            }
            _ => return Err(self.invalid_state("EvolutionStart")),
        }

        if cmd.population < 2 {
            return Err(ApiError::new("Population must be at least 2"));
        }
        if cmd.generations == 0 {
            return Err(ApiError::new("Generations must be at least 1"));
        }

        info!(
            target: "evolution",
            scenario = %cmd.scenario_id,
            population = cmd.population,
            generations = cmd.generations,
            "Evolution started"
        );
        self.transition(State::Evolution(Box::new(EvolutionRun::new(cmd))));
        Ok(())
    }

    pub fn cmd_evolution_stop(&mut self) -> Result<(), ApiError> {
        match self.state {
            State::Evolution(_) => {
                self.transition(State::Idle);
                Ok(())
            }
            _ => Err(self.invalid_state("EvolutionStop")),
        }
    }

    pub fn cmd_training_result_save(
        &mut self,
        cmd: TrainingResultSave,
    ) -> Result<TrainingResultSaveOkay, ApiError> {
        let result = match &self.state {
            State::UnsavedTrainingResult(result) => result,
            _ => return Err(self.invalid_state("TrainingResultSave")),
        };

        if cmd.ids.is_empty() {
            return Err(ApiError::new("No candidate ids provided"));
        }

        // Duplicate requests collapse to one save.
        let mut ids: Vec<String> = Vec::new();
        for id in cmd.ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        for id in &ids {
            if !result.candidates.iter().any(|c| &c.id == id) {
                return Err(ApiError::new(format!(
                    "Training candidate id not found: {id}"
                )));
            }
            if self.repository.contains(id) {
                return Err(ApiError::new(format!(
                    "Genome '{id}' already exists in the repository"
                )));
            }
        }

        let candidate_total = result.candidates.len();
        let to_save: Vec<_> = result
            .candidates
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect();
        for candidate in &to_save {
            self.repository
                .save(&candidate.id, &candidate.genome, &candidate.metadata)?;
        }

        let saved: Vec<String> = to_save.into_iter().map(|c| c.id).collect();
        let discarded_count = (candidate_total - saved.len()) as u32;
        info!(
            target: "evolution",
            saved = saved.len(),
            discarded_count,
            "Training result saved"
        );
        self.transition(State::Idle);
        Ok(TrainingResultSaveOkay {
            saved,
            discarded_count,
        })
    }

    pub fn cmd_training_result_discard(&mut self) -> Result<(), ApiError> {
        match &self.state {
            State::UnsavedTrainingResult(result) => {
                info!(
                    target: "evolution",
                    discarded = result.candidates.len(),
                    "Training result discarded"
                );
                self.transition(State::Idle);
                Ok(())
            }
            _ => Err(self.invalid_state("TrainingResultDiscard")),
        }
    }

    /// One tick of whichever active state wants time.
    pub fn on_tick(&mut self) {
        match &self.state {
            State::SimRunning(_) => self.tick_simulation(),
            State::Evolution(_) => self.tick_evolution(),
            _ => {}
        }
    }

    fn tick_simulation(&mut self) {
        // A running state without a session is unrecoverable from inside
        // the tick; park in Error and stay alive for commands.
        if !self.session.has_session() {
            warn!(target: "scenario", "Scenario session lost during run");
            self.transition(State::Error("Scenario session lost during run".into()));
            return;
        }

        let (timestep, finished) = match &mut self.state {
            State::SimRunning(params) => {
                params.steps_done += 1;
                (
                    params.timestep,
                    params.max_steps >= 0 && params.steps_done >= params.max_steps,
                )
            }
            _ => return,
        };

        self.session.tick(timestep);
        self.fps.on_frame();
        self.broadcast_frames();

        if finished {
            info!(target: "scenario", "Run reached max_steps; stopping");
            self.session.stop();
            self.transition(State::Idle);
        }
    }

    fn tick_evolution(&mut self) {
        let (outcome, generation, generations_total) = match &mut self.state {
            State::Evolution(run) => {
                let outcome = run.step();
                (outcome, run.generation(), run.generations_total())
            }
            _ => return,
        };

        match outcome {
            StepOutcome::Evaluated { new_best } => {
                if let Some((fitness, world)) = new_best {
                    let snapshot = TrainingBestSnapshot {
                        world: world.snapshot(),
                        organism_ids: vec![1],
                        fitness,
                        generation,
                        scenario_video_frame: None,
                    };
                    self.best_snapshot = Some(snapshot.clone());
                    self.broadcast(&snapshot);
                }
            }
            StepOutcome::GenerationComplete {
                generation,
                best_fitness,
                mean_fitness,
                evaluated,
            } => {
                self.broadcast(&EvolutionProgress {
                    generation,
                    generations_total,
                    best_fitness,
                    mean_fitness,
                    evaluated,
                });
                self.broadcast_best_playback(generation);
            }
            StepOutcome::RunComplete(result) => {
                info!(
                    target: "evolution",
                    candidates = result.candidates.len(),
                    best = result.best_fitness,
                    "Evolution complete"
                );
                self.transition(State::UnsavedTrainingResult(result));
            }
        }
    }

    fn broadcast_best_playback(&mut self, generation: u32) {
        let Some(snapshot) = &self.best_snapshot else {
            return;
        };
        let message = pack_render_message(&snapshot.world, &[], RenderFormat::Basic, self.fps.fps);
        self.broadcast(&TrainingBestPlaybackFrame {
            generation,
            message,
        });
    }

    /// Pack and push one frame per subscriber in its requested format.
    fn broadcast_frames(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let Some(service) = self.service.clone() else {
            return;
        };
        let Some(world) = self.session.world_data() else {
            return;
        };
        let Some(scenario_id) = self.session.scenario_id() else {
            return;
        };
        let Some(scenario_config) = self.session.scenario_config() else {
            return;
        };

        let organism_grid: Vec<u8> = self.session.organism_grid().to_vec();
        let mut stale = Vec::new();
        for (&connection, &format) in &self.subscribers {
            let message = pack_render_message(&world, &organism_grid, format, self.fps.fps);
            let full = RenderMessageFull {
                scenario_id,
                scenario_config: scenario_config.clone(),
                message,
            };
            if service.push_to(connection, &full).is_err() {
                stale.push(connection);
            }
        }
        for connection in stale {
            debug!(target: "network", %connection, "Dropping stale render subscriber");
            self.subscribers.remove(&connection);
        }
    }

    fn broadcast<E: dirtproto::ApiEvent>(&self, event: &E) {
        if let Some(service) = &self.service {
            service.broadcast(event);
        }
    }
}

/// Wire the command surface to the event queue. Handlers do nothing but
/// enqueue; the state machine task owns all the state.
pub fn register_handlers(service: &WebSocketService, tx: mpsc::UnboundedSender<ServerEvent>) {
    use dirtproto::api::global::{GetFps, QuitApplication, StateGet};
    use dirtproto::api::server::{
        EvolutionStop, GenomeList, PixelRendererToggle, RenderFormatSet, ScenarioConfigGet,
        ScenarioList, SimPause, SimReset, SimResume, SimStop, StatusGet,
        TrainingBestSnapshotGet, TrainingResultAvailable, TrainingResultDiscard,
    };

    macro_rules! forward {
        ($cmd:ty, $variant:expr) => {{
            let tx = tx.clone();
            service.register_handler::<$cmd, _>(move |_cmd, reply, _ctx| {
                if tx.send($variant(reply)).is_err() {
                    warn!(target: "network", "State machine gone; dropping command");
                }
            });
        }};
    }
    macro_rules! forward_with_body {
        ($cmd:ty, $variant:expr) => {{
            let tx = tx.clone();
            service.register_handler::<$cmd, _>(move |cmd, reply, _ctx| {
                if tx.send($variant(cmd, reply)).is_err() {
                    warn!(target: "network", "State machine gone; dropping command");
                }
            });
        }};
    }

    forward!(StatusGet, ServerEvent::StatusGet);
    forward!(StateGet, ServerEvent::StateGet);
    forward!(GetFps, ServerEvent::GetFps);
    forward!(dirtproto::api::server::GetSimStats, ServerEvent::GetSimStats);
    forward!(QuitApplication, ServerEvent::Quit);
    forward!(SimPause, ServerEvent::SimPause);
    forward!(SimResume, ServerEvent::SimResume);
    forward!(SimStop, ServerEvent::SimStop);
    forward!(SimReset, ServerEvent::SimReset);
    forward!(ScenarioList, ServerEvent::ScenarioList);
    forward!(ScenarioConfigGet, ServerEvent::ScenarioConfigGet);
    forward!(EvolutionStop, ServerEvent::EvolutionStop);
    forward!(TrainingResultAvailable, ServerEvent::TrainingResultAvailable);
    forward!(TrainingResultDiscard, ServerEvent::TrainingResultDiscard);
    forward!(TrainingBestSnapshotGet, ServerEvent::TrainingBestSnapshotGet);
    forward!(GenomeList, ServerEvent::GenomeList);

    forward_with_body!(SimRun, ServerEvent::SimRun);
    forward_with_body!(ScenarioConfigSet, ServerEvent::ScenarioConfigSet);
    forward_with_body!(EvolutionStart, ServerEvent::EvolutionStart);
    forward_with_body!(TrainingResultSave, ServerEvent::TrainingResultSave);

    {
        let tx = tx.clone();
        service.register_handler::<RenderFormatSet, _>(move |cmd, reply, ctx| {
            let _ = tx.send(ServerEvent::RenderFormatSet(
                cmd.format,
                ctx.connection_id,
                reply,
            ));
        });
    }
    {
        let tx = tx.clone();
        service.register_handler::<PixelRendererToggle, _>(move |_cmd, reply, ctx| {
            let _ = tx.send(ServerEvent::PixelRendererToggle(ctx.connection_id, reply));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtproto::scenario::ScenarioId;
    use pretty_assertions::assert_eq;

    fn machine() -> StateMachine {
        let dir = tempfile::tempdir().unwrap().into_path();
        let repository = GenomeRepository::open(dir.join("genomes")).unwrap();
        StateMachine::new(ScenarioRegistry::create_default(), repository, None)
    }

    fn sim_run(scenario_id: ScenarioId) -> SimRun {
        SimRun {
            scenario_id,
            scenario_config: None,
            timestep: 0.016,
            max_steps: -1,
            max_frame_ms: Some(16),
        }
    }

    fn evolution_params() -> EvolutionStart {
        EvolutionStart {
            scenario_id: ScenarioId::Sandbox,
            population: 4,
            generations: 1,
            timestep: 0.016,
            steps_per_evaluation: 20,
            seed: Some(3),
        }
    }

    fn run_to_unsaved(machine: &mut StateMachine) {
        machine.cmd_evolution_start(evolution_params()).unwrap();
        for _ in 0..100 {
            machine.on_tick();
            if machine.state_name() == "UnsavedTrainingResult" {
                return;
            }
        }
        panic!("evolution never completed");
    }

    #[test]
    fn startup_enters_idle() {
        let machine = machine();
        assert_eq!(machine.state_name(), "Idle");
    }

    #[test]
    fn sim_lifecycle_transitions() {
        let mut m = machine();
        let okay = m.cmd_sim_run(sim_run(ScenarioId::Sandbox)).unwrap();
        assert!(okay.running);
        assert_eq!(m.state_name(), "SimRunning");

        m.cmd_sim_pause().unwrap();
        assert_eq!(m.state_name(), "Paused");

        m.cmd_sim_resume().unwrap();
        assert_eq!(m.state_name(), "SimRunning");

        m.cmd_sim_stop().unwrap();
        assert_eq!(m.state_name(), "Idle");
    }

    #[test]
    fn pause_outside_running_is_a_state_error() {
        let mut m = machine();
        let err = m.cmd_sim_pause().unwrap_err();
        assert_eq!(err.message, "Command SimPause not valid in state Idle");
    }

    #[test]
    fn max_steps_returns_to_idle() {
        let mut m = machine();
        let mut cmd = sim_run(ScenarioId::Empty);
        cmd.max_steps = 3;
        m.cmd_sim_run(cmd).unwrap();
        for _ in 0..3 {
            m.on_tick();
        }
        assert_eq!(m.state_name(), "Idle");
    }

    #[test]
    fn status_reports_active_session() {
        let mut m = machine();
        m.cmd_sim_run(sim_run(ScenarioId::Sandbox)).unwrap();
        m.on_tick();
        let status = m.status();
        assert_eq!(status.scenario_id, Some(ScenarioId::Sandbox));
        assert_eq!(status.width, 45);
        assert_eq!(status.height, 30);
        assert_eq!(status.timestep, 1);
    }

    #[test]
    fn failed_sim_run_stays_in_current_state() {
        let mut m = machine();
        let err = m
            .cmd_sim_run(sim_run(ScenarioId::NesFlappyParatroopa))
            .unwrap_err();
        assert_eq!(err.message, "ROM path does not exist.");
        assert_eq!(m.state_name(), "Idle");
    }

    #[test]
    fn evolution_reaches_unsaved_result() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        let available = m.training_result_available();
        assert!(available.available);
        assert!(!available.candidate_ids.is_empty());
    }

    #[test]
    fn training_save_happy_path() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        let candidate_ids = m.training_result_available().candidate_ids;
        let total = candidate_ids.len();

        let okay = m
            .cmd_training_result_save(TrainingResultSave {
                ids: vec![candidate_ids[0].clone()],
            })
            .unwrap();
        assert_eq!(okay.saved, vec![candidate_ids[0].clone()]);
        assert_eq!(okay.discarded_count as usize, total - 1);
        assert_eq!(m.state_name(), "Idle");
        assert!(m.repository.contains(&candidate_ids[0]));
    }

    #[test]
    fn training_save_dedups_requested_ids() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        let candidate_ids = m.training_result_available().candidate_ids;

        let okay = m
            .cmd_training_result_save(TrainingResultSave {
                ids: vec![candidate_ids[0].clone(), candidate_ids[0].clone()],
            })
            .unwrap();
        assert_eq!(okay.saved.len(), 1);
    }

    #[test]
    fn training_save_unknown_id_fails() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        let err = m
            .cmd_training_result_save(TrainingResultSave {
                ids: vec!["zzz".into()],
            })
            .unwrap_err();
        assert!(err.message.contains("id not found"));
        assert_eq!(m.state_name(), "UnsavedTrainingResult");
    }

    #[test]
    fn training_save_empty_ids_fails() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        let err = m
            .cmd_training_result_save(TrainingResultSave { ids: Vec::new() })
            .unwrap_err();
        assert!(err.message.contains("No candidate ids"));
    }

    #[test]
    fn training_discard_returns_to_idle() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        m.cmd_training_result_discard().unwrap();
        assert_eq!(m.state_name(), "Idle");
        assert!(!m.training_result_available().available);
    }

    #[test]
    fn evolution_start_discards_unsaved_result() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        m.cmd_evolution_start(evolution_params()).unwrap();
        assert_eq!(m.state_name(), "Evolution");
    }

    #[test]
    fn evolution_rejects_degenerate_parameters() {
        let mut m = machine();
        let mut params = evolution_params();
        params.population = 1;
        assert!(m.cmd_evolution_start(params).is_err());

        let mut params = evolution_params();
        params.generations = 0;
        assert!(m.cmd_evolution_start(params).is_err());
    }

    #[test]
    fn lost_session_parks_in_error_and_recovers() {
        let mut m = machine();
        m.cmd_sim_run(sim_run(ScenarioId::Sandbox)).unwrap();
        m.session.stop();
        m.on_tick();
        assert_eq!(m.state_name(), "Error");

        // Commands still answer, and a fresh run recovers.
        assert!(m.training_result_available().candidate_ids.is_empty());
        m.cmd_sim_run(sim_run(ScenarioId::Empty)).unwrap();
        assert_eq!(m.state_name(), "SimRunning");

        m.session.stop();
        m.on_tick();
        m.cmd_sim_stop().unwrap();
        assert_eq!(m.state_name(), "Idle");
    }

    #[test]
    fn best_snapshot_is_recorded_during_evolution() {
        let mut m = machine();
        run_to_unsaved(&mut m);
        let snapshot = m.best_snapshot.clone().expect("best snapshot");
        assert!(snapshot.fitness > f64::MIN);
        assert_eq!(snapshot.world.width, 45);
    }
}

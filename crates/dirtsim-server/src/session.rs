//! The scenario session: one active pairing of a scenario with the world
//! it owns, either a cell grid or an emulator shim.

use dirtconf::Timers;
use dirtproto::error::ApiError;
use dirtproto::scenario::{ScenarioConfig, ScenarioId, ScenarioKind, ScenarioMetadata};
use dirtproto::world::WorldData;

use crate::scenario::nes::{NesDriver, NesRuntime, NullNesRuntime};
use crate::scenario::{Scenario, ScenarioRegistry};
use crate::world::{OrganismId, World};

/// Pixel size of the display container a client is rendering into; used
/// to derive grid dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}

struct GridWorldSession {
    scenario_id: ScenarioId,
    world: World,
    scenario: Box<dyn Scenario>,
    timers: Timers,
    cached_snapshot: Option<WorldData>,
}

struct NesWorldSession {
    scenario_id: ScenarioId,
    config: ScenarioConfig,
    driver: NesDriver,
    timers: Timers,
}

enum SessionImpl {
    None,
    GridWorld(GridWorldSession),
    NesWorld(NesWorldSession),
}

/// Borrowed access to the grid arm.
pub struct GridWorldAccess<'a> {
    pub world: &'a mut World,
    pub scenario: &'a mut dyn Scenario,
}

impl std::fmt::Debug for GridWorldAccess<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridWorldAccess")
            .field("world", &self.world)
            .field("scenario", &"<dyn Scenario>")
            .finish()
    }
}

/// Borrowed access to the emulator arm.
pub struct NesWorldAccess<'a> {
    pub driver: &'a mut NesDriver,
    pub config: &'a mut ScenarioConfig,
}

pub struct ScenarioSession {
    session: SessionImpl,
}

impl Default for ScenarioSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioSession {
    pub fn new() -> Self {
        Self {
            session: SessionImpl::None,
        }
    }

    pub fn has_session(&self) -> bool {
        !matches!(self.session, SessionImpl::None)
    }

    pub fn is_nes_session(&self) -> bool {
        matches!(self.session, SessionImpl::NesWorld(_))
    }

    pub fn scenario_id(&self) -> Option<ScenarioId> {
        match &self.session {
            SessionImpl::None => None,
            SessionImpl::GridWorld(grid) => Some(grid.scenario_id),
            SessionImpl::NesWorld(nes) => Some(nes.scenario_id),
        }
    }

    pub fn scenario_kind(&self) -> Option<ScenarioKind> {
        match &self.session {
            SessionImpl::None => None,
            SessionImpl::GridWorld(_) => Some(ScenarioKind::GridWorld),
            SessionImpl::NesWorld(_) => Some(ScenarioKind::NesWorld),
        }
    }

    pub fn scenario_config(&self) -> Option<ScenarioConfig> {
        match &self.session {
            SessionImpl::None => None,
            SessionImpl::GridWorld(grid) => Some(grid.scenario.config()),
            SessionImpl::NesWorld(nes) => Some(nes.config.clone()),
        }
    }

    pub fn timers(&self) -> Option<&Timers> {
        match &self.session {
            SessionImpl::None => None,
            SessionImpl::GridWorld(grid) => Some(&grid.timers),
            SessionImpl::NesWorld(nes) => Some(&nes.timers),
        }
    }

    /// Dense world snapshot for the render path.
    pub fn world_data(&mut self) -> Option<WorldData> {
        match &mut self.session {
            SessionImpl::None => None,
            SessionImpl::GridWorld(grid) => {
                if grid.cached_snapshot.is_none() {
                    grid.cached_snapshot = Some(grid.world.snapshot());
                }
                grid.cached_snapshot.clone()
            }
            SessionImpl::NesWorld(nes) => Some(nes.driver.world_data().clone()),
        }
    }

    /// Per-cell organism ids; empty for emulator sessions.
    pub fn organism_grid(&self) -> &[OrganismId] {
        match &self.session {
            SessionImpl::GridWorld(grid) => grid.world.organism_grid(),
            _ => &[],
        }
    }

    pub fn world_dimensions(&self) -> (u32, u32) {
        match &self.session {
            SessionImpl::None => (0, 0),
            SessionImpl::GridWorld(grid) => (grid.world.width(), grid.world.height()),
            SessionImpl::NesWorld(nes) => {
                (nes.driver.world_data().width, nes.driver.world_data().height)
            }
        }
    }

    pub fn timestep(&self) -> i32 {
        match &self.session {
            SessionImpl::None => 0,
            SessionImpl::GridWorld(grid) => grid.world.timestep(),
            SessionImpl::NesWorld(nes) => nes.driver.world_data().timestep,
        }
    }

    pub fn sim_time(&self) -> f64 {
        match &self.session {
            SessionImpl::GridWorld(grid) => grid.world.sim_time(),
            _ => 0.0,
        }
    }

    pub fn require_grid_world(&mut self) -> Result<GridWorldAccess<'_>, ApiError> {
        match &mut self.session {
            SessionImpl::GridWorld(grid) => Ok(GridWorldAccess {
                world: &mut grid.world,
                scenario: grid.scenario.as_mut(),
            }),
            SessionImpl::NesWorld(_) => {
                Err(ApiError::new("Not available in NesWorld scenario"))
            }
            SessionImpl::None => Err(ApiError::new("No active scenario session")),
        }
    }

    pub fn require_nes_world(&mut self) -> Result<NesWorldAccess<'_>, ApiError> {
        match &mut self.session {
            SessionImpl::NesWorld(nes) => Ok(NesWorldAccess {
                driver: &mut nes.driver,
                config: &mut nes.config,
            }),
            SessionImpl::GridWorld(_) => {
                Err(ApiError::new("Not available in GridWorld scenario"))
            }
            SessionImpl::None => Err(ApiError::new("No active scenario session")),
        }
    }

    /// Start a session. A failed start leaves the previous session arm
    /// untouched.
    pub fn start(
        &mut self,
        registry: &ScenarioRegistry,
        scenario_id: ScenarioId,
        config: Option<ScenarioConfig>,
        container_size: Option<ContainerSize>,
    ) -> Result<(), ApiError> {
        let metadata = registry
            .metadata(scenario_id)
            .cloned()
            .ok_or_else(|| ApiError::new(format!("Unknown scenario '{scenario_id}'")))?;

        match metadata.kind {
            ScenarioKind::GridWorld => {
                self.start_grid_world(registry, scenario_id, &metadata, config, container_size)
            }
            ScenarioKind::NesWorld => self.start_nes(scenario_id, config),
        }
    }

    fn start_grid_world(
        &mut self,
        registry: &ScenarioRegistry,
        scenario_id: ScenarioId,
        metadata: &ScenarioMetadata,
        config: Option<ScenarioConfig>,
        container_size: Option<ContainerSize>,
    ) -> Result<(), ApiError> {
        // Container size wins, then the scenario's required dimensions,
        // then the defaults.
        let (width, height) = if let Some(container) = container_size {
            World::dimensions_for_container(container.width, container.height)
        } else if let (Some(w), Some(h)) = (metadata.required_width, metadata.required_height) {
            (w, h)
        } else {
            (World::DEFAULT_WIDTH, World::DEFAULT_HEIGHT)
        };

        let mut scenario = registry
            .create(scenario_id)
            .ok_or_else(|| ApiError::new(format!("Scenario '{scenario_id}' has no factory")))?;
        let mut world = World::new(width, height);

        if let Some(config) = config {
            scenario.set_config(config, &mut world)?;
        }
        scenario.setup(&mut world);

        self.session = SessionImpl::GridWorld(GridWorldSession {
            scenario_id,
            world,
            scenario,
            timers: Timers::new(),
            cached_snapshot: None,
        });
        Ok(())
    }

    fn start_nes(
        &mut self,
        scenario_id: ScenarioId,
        config: Option<ScenarioConfig>,
    ) -> Result<(), ApiError> {
        let config = config.unwrap_or_else(|| ScenarioConfig::default_for(scenario_id));
        let nes_config = match &config {
            ScenarioConfig::NesFlappyParatroopa(c) | ScenarioConfig::NesSuperTiltBro(c) => {
                c.clone()
            }
            other => {
                return Err(ApiError::new(format!(
                    "Config variant '{}' does not match scenario '{}'",
                    other.scenario_id(),
                    scenario_id
                )))
            }
        };

        let driver = NesDriver::start(scenario_id, nes_config, default_nes_runtime())?;

        self.session = SessionImpl::NesWorld(NesWorldSession {
            scenario_id,
            config,
            driver,
            timers: Timers::new(),
        });
        Ok(())
    }

    /// Re-run setup on the active arm, clearing per-frame scratch state.
    pub fn reset(&mut self) -> Result<(), ApiError> {
        match &mut self.session {
            SessionImpl::None => Err(ApiError::new("No active scenario session")),
            SessionImpl::GridWorld(grid) => {
                grid.scenario.reset(&mut grid.world);
                grid.cached_snapshot = None;
                grid.timers.reset();
                Ok(())
            }
            SessionImpl::NesWorld(nes) => {
                nes.driver.reset();
                nes.timers.reset();
                Ok(())
            }
        }
    }

    /// Advance the active arm by one tick.
    pub fn tick(&mut self, dt: f64) {
        match &mut self.session {
            SessionImpl::None => {}
            SessionImpl::GridWorld(grid) => {
                let _scope = grid.timers.scope("tick");
                grid.scenario.tick(&mut grid.world, dt);
                grid.world.tick(dt);
                grid.cached_snapshot = None;
            }
            SessionImpl::NesWorld(nes) => {
                let _scope = nes.timers.scope("tick");
                nes.driver.tick();
            }
        }
    }

    /// Apply a config to the active scenario without restarting it.
    pub fn set_config(&mut self, config: ScenarioConfig) -> Result<(), ApiError> {
        match &mut self.session {
            SessionImpl::None => Err(ApiError::new("No active scenario session")),
            SessionImpl::GridWorld(grid) => {
                grid.scenario.set_config(config, &mut grid.world)
            }
            SessionImpl::NesWorld(nes) => {
                if config.scenario_id() != nes.scenario_id {
                    return Err(ApiError::new(format!(
                        "Config variant '{}' does not match scenario '{}'",
                        config.scenario_id(),
                        nes.scenario_id
                    )));
                }
                nes.config = config;
                Ok(())
            }
        }
    }

    pub fn stop(&mut self) {
        self.session = SessionImpl::None;
    }
}

fn default_nes_runtime() -> Box<dyn NesRuntime> {
    Box::new(NullNesRuntime::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtproto::scenario::NesConfig;

    fn registry() -> ScenarioRegistry {
        ScenarioRegistry::create_default()
    }

    #[test]
    fn start_grid_world_uses_defaults() {
        let mut session = ScenarioSession::new();
        session
            .start(&registry(), ScenarioId::Sandbox, None, None)
            .unwrap();
        assert_eq!(session.world_dimensions(), (45, 30));
        assert_eq!(session.scenario_kind(), Some(ScenarioKind::GridWorld));
    }

    #[test]
    fn container_size_wins_over_defaults() {
        let mut session = ScenarioSession::new();
        session
            .start(
                &registry(),
                ScenarioId::Empty,
                None,
                Some(ContainerSize {
                    width: 320,
                    height: 320,
                }),
            )
            .unwrap();
        assert_eq!(session.world_dimensions(), (20, 20));
    }

    #[test]
    fn failed_nes_start_preserves_previous_arm() {
        let mut session = ScenarioSession::new();
        session
            .start(&registry(), ScenarioId::Sandbox, None, None)
            .unwrap();

        let bad_config = ScenarioConfig::NesFlappyParatroopa(NesConfig {
            rom_path: "/nonexistent/never.nes".into(),
            ..NesConfig::flappy_paratroopa()
        });
        let err = session
            .start(
                &registry(),
                ScenarioId::NesFlappyParatroopa,
                Some(bad_config),
                None,
            )
            .unwrap_err();
        assert_eq!(err.message, "ROM path does not exist.");

        // Still the sandbox grid session.
        assert_eq!(session.scenario_id(), Some(ScenarioId::Sandbox));
        assert_eq!(session.scenario_kind(), Some(ScenarioKind::GridWorld));
    }

    #[test]
    fn require_grid_world_errors_on_wrong_arm() {
        let dir = tempfile::tempdir().unwrap();
        let rom = dir.path().join("ok.nes");
        let mut bytes = vec![0u8; 16 + 16384];
        bytes[..4].copy_from_slice(b"NES\x1a");
        bytes[4] = 1;
        std::fs::write(&rom, bytes).unwrap();

        let mut session = ScenarioSession::new();
        session
            .start(
                &registry(),
                ScenarioId::NesFlappyParatroopa,
                Some(ScenarioConfig::NesFlappyParatroopa(NesConfig {
                    rom_path: rom.to_string_lossy().into_owned(),
                    ..NesConfig::flappy_paratroopa()
                })),
                None,
            )
            .unwrap();

        let err = session.require_grid_world().unwrap_err();
        assert_eq!(err.message, "Not available in NesWorld scenario");
        assert!(session.require_nes_world().is_ok());
    }

    #[test]
    fn tick_advances_and_snapshot_caches_per_tick() {
        let mut session = ScenarioSession::new();
        session
            .start(&registry(), ScenarioId::FallingDirt, None, None)
            .unwrap();
        session.tick(0.016);
        let a = session.world_data().unwrap();
        let b = session.world_data().unwrap();
        assert_eq!(a, b);
        session.tick(0.016);
        assert_eq!(session.timestep(), 2);
    }

    #[test]
    fn reset_clears_timestep() {
        let mut session = ScenarioSession::new();
        session
            .start(&registry(), ScenarioId::Sandbox, None, None)
            .unwrap();
        for _ in 0..5 {
            session.tick(0.016);
        }
        session.reset().unwrap();
        assert_eq!(session.timestep(), 0);
    }

    #[test]
    fn set_config_rejects_wrong_variant() {
        let mut session = ScenarioSession::new();
        session
            .start(&registry(), ScenarioId::Sandbox, None, None)
            .unwrap();
        let err = session
            .set_config(ScenarioConfig::default_for(ScenarioId::Raining))
            .unwrap_err();
        assert!(err.message.contains("does not match"));
    }
}

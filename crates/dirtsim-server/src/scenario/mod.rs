//! Scenario abstraction and registry.
//!
//! A scenario owns the setup/tick/reset behavior of a world; the registry
//! maps ids to metadata plus factories so sessions can instantiate fresh
//! scenarios on demand.

use std::collections::BTreeMap;

use dirtproto::error::ApiError;
use dirtproto::scenario::{ScenarioConfig, ScenarioId, ScenarioMetadata};
use tracing::{debug, warn};

use crate::world::World;

pub mod grid;
pub mod nes;

/// Grid-world scenario behavior. NES scenarios drive their own runtime
/// and never implement this trait.
pub trait Scenario: Send {
    fn metadata(&self) -> ScenarioMetadata;
    fn config(&self) -> ScenarioConfig;

    /// Apply a config. Rejects configs whose variant doesn't match this
    /// scenario.
    fn set_config(&mut self, config: ScenarioConfig, world: &mut World) -> Result<(), ApiError>;

    fn setup(&mut self, world: &mut World);

    fn reset(&mut self, world: &mut World) {
        world.clear();
        self.setup(world);
    }

    fn tick(&mut self, world: &mut World, dt: f64);
}

type ScenarioFactory = Box<dyn Fn() -> Box<dyn Scenario> + Send + Sync>;

struct RegistryEntry {
    metadata: ScenarioMetadata,
    factory: ScenarioFactory,
}

/// Id -> (metadata, factory). Built once at startup.
pub struct ScenarioRegistry {
    entries: BTreeMap<ScenarioId, RegistryEntry>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry with every built-in scenario.
    pub fn create_default() -> Self {
        let mut registry = Self::new();

        registry.register(grid::BenchmarkScenario::default_metadata(), || {
            Box::new(grid::BenchmarkScenario::new())
        });
        registry.register(grid::ClockScenario::default_metadata(), || {
            Box::new(grid::ClockScenario::new())
        });
        registry.register(grid::DamBreakScenario::default_metadata(), || {
            Box::new(grid::DamBreakScenario::new())
        });
        registry.register(grid::EmptyScenario::default_metadata(), || {
            Box::new(grid::EmptyScenario::new())
        });
        registry.register(grid::FallingDirtScenario::default_metadata(), || {
            Box::new(grid::FallingDirtScenario::new())
        });
        registry.register(grid::RainingScenario::default_metadata(), || {
            Box::new(grid::RainingScenario::new())
        });
        registry.register(grid::SandboxScenario::default_metadata(), || {
            Box::new(grid::SandboxScenario::new())
        });
        registry.register(grid::TreeGerminationScenario::default_metadata(), || {
            Box::new(grid::TreeGerminationScenario::new())
        });
        registry.register(grid::WaterEqualizationScenario::default_metadata(), || {
            Box::new(grid::WaterEqualizationScenario::new())
        });

        // NES scenarios register metadata only; their sessions are driven
        // by the emulator driver, not a Scenario impl.
        registry.register_metadata(nes::flappy_paratroopa_metadata());
        registry.register_metadata(nes::super_tilt_bro_metadata());

        registry
    }

    pub fn register(
        &mut self,
        metadata: ScenarioMetadata,
        factory: impl Fn() -> Box<dyn Scenario> + Send + Sync + 'static,
    ) {
        let id = metadata.id;
        if self.entries.contains_key(&id) {
            warn!(target: "scenario", %id, "Scenario already registered, overwriting");
        }
        debug!(target: "scenario", %id, name = %metadata.name, "Registering scenario");
        self.entries.insert(
            id,
            RegistryEntry {
                metadata,
                factory: Box::new(factory),
            },
        );
    }

    /// Metadata-only registration for scenarios without a grid factory.
    pub fn register_metadata(&mut self, metadata: ScenarioMetadata) {
        let id = metadata.id;
        self.entries.insert(
            id,
            RegistryEntry {
                metadata,
                factory: Box::new(move || unreachable!("no grid factory for this scenario")),
            },
        );
    }

    pub fn create(&self, id: ScenarioId) -> Option<Box<dyn Scenario>> {
        let entry = self.entries.get(&id)?;
        if entry.metadata.kind != dirtproto::scenario::ScenarioKind::GridWorld {
            return None;
        }
        Some((entry.factory)())
    }

    pub fn metadata(&self, id: ScenarioId) -> Option<&ScenarioMetadata> {
        self.entries.get(&id).map(|entry| &entry.metadata)
    }

    pub fn ids(&self) -> Vec<ScenarioId> {
        self.entries.keys().copied().collect()
    }

    pub fn all_metadata(&self) -> Vec<ScenarioMetadata> {
        self.entries
            .values()
            .map(|entry| entry.metadata.clone())
            .collect()
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::create_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirtproto::scenario::ScenarioKind;

    #[test]
    fn default_registry_covers_every_id() {
        let registry = ScenarioRegistry::create_default();
        for id in ScenarioId::ALL {
            assert!(registry.metadata(id).is_some(), "{id} missing");
        }
    }

    #[test]
    fn grid_scenarios_have_factories() {
        let registry = ScenarioRegistry::create_default();
        for id in ScenarioId::ALL {
            let metadata = registry.metadata(id).unwrap().clone();
            match metadata.kind {
                ScenarioKind::GridWorld => {
                    let scenario = registry.create(id).expect("factory");
                    assert_eq!(scenario.metadata().id, id);
                }
                ScenarioKind::NesWorld => {
                    assert!(registry.create(id).is_none());
                    assert_eq!(metadata.required_width, Some(256));
                    assert_eq!(metadata.required_height, Some(240));
                }
            }
        }
    }

    #[test]
    fn created_scenarios_report_matching_config_variant() {
        let registry = ScenarioRegistry::create_default();
        for id in ScenarioId::ALL {
            if let Some(scenario) = registry.create(id) {
                assert_eq!(scenario.config().scenario_id(), id);
            }
        }
    }
}

//! Simulation-server command table.

use serde::{Deserialize, Serialize};

use super::ApiCommand;
use crate::impl_wire;
use crate::render::RenderFormat;
use crate::scenario::{ScenarioConfig, ScenarioId, ScenarioMetadata};

/// Snapshot of the active session, cheap enough to poll.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusGet {}
impl_wire!(StatusGet {});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusOkay {
    pub scenario_id: Option<ScenarioId>,
    pub width: u32,
    pub height: u32,
    pub timestep: i32,
    pub state: String,
}
impl_wire!(StatusOkay {
    scenario_id,
    width,
    height,
    timestep,
    state
});

impl ApiCommand for StatusGet {
    const NAME: &'static str = "StatusGet";
    type Okay = StatusOkay;
}

/// Start a scenario and begin ticking.
///
/// `max_steps < 0` means run until stopped. `timestep` is seconds of
/// simulated time per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimRun {
    pub scenario_id: ScenarioId,
    #[serde(default)]
    pub scenario_config: Option<ScenarioConfig>,
    pub timestep: f64,
    pub max_steps: i64,
    #[serde(default)]
    pub max_frame_ms: Option<u32>,
}
impl_wire!(SimRun {
    scenario_id,
    scenario_config,
    timestep,
    max_steps,
    max_frame_ms
});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimRunOkay {
    pub running: bool,
}
impl_wire!(SimRunOkay { running });

impl ApiCommand for SimRun {
    const NAME: &'static str = "SimRun";
    type Okay = SimRunOkay;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimPause {}
impl_wire!(SimPause {});
impl ApiCommand for SimPause {
    const NAME: &'static str = "SimPause";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimResume {}
impl_wire!(SimResume {});
impl ApiCommand for SimResume {
    const NAME: &'static str = "SimResume";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimStop {}
impl_wire!(SimStop {});
impl ApiCommand for SimStop {
    const NAME: &'static str = "SimStop";
    type Okay = ();
}

/// Re-run the active scenario's setup on the existing world.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimReset {}
impl_wire!(SimReset {});
impl ApiCommand for SimReset {
    const NAME: &'static str = "SimReset";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScenarioList {}
impl_wire!(ScenarioList {});

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioListOkay {
    pub scenarios: Vec<ScenarioMetadata>,
}
impl_wire!(ScenarioListOkay { scenarios });

impl ApiCommand for ScenarioList {
    const NAME: &'static str = "ScenarioList";
    type Okay = ScenarioListOkay;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScenarioConfigGet {}
impl_wire!(ScenarioConfigGet {});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfigOkay {
    pub config: ScenarioConfig,
}
impl_wire!(ScenarioConfigOkay { config });

impl ApiCommand for ScenarioConfigGet {
    const NAME: &'static str = "ScenarioConfigGet";
    type Okay = ScenarioConfigOkay;
}

/// Apply a new config to the active scenario without restarting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfigSet {
    pub config: ScenarioConfig,
}
impl_wire!(ScenarioConfigSet { config });
impl ApiCommand for ScenarioConfigSet {
    const NAME: &'static str = "ScenarioConfigSet";
    type Okay = ();
}

/// Subscribe the calling connection to render frames in `format`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RenderFormatSet {
    pub format: RenderFormat,
}
impl_wire!(RenderFormatSet { format });
impl ApiCommand for RenderFormatSet {
    const NAME: &'static str = "RenderFormatSet";
    type Okay = ();
}

/// Legacy alias for [`RenderFormatSet`]; flips the caller's subscription
/// between Basic and Debug. Okay shape matches RenderFormatSet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRendererToggle {}
impl_wire!(PixelRendererToggle {});
impl ApiCommand for PixelRendererToggle {
    const NAME: &'static str = "PixelRendererToggle";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStart {
    pub scenario_id: ScenarioId,
    pub population: u32,
    pub generations: u32,
    pub timestep: f64,
    pub steps_per_evaluation: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}
impl_wire!(EvolutionStart {
    scenario_id,
    population,
    generations,
    timestep,
    steps_per_evaluation,
    seed
});
impl ApiCommand for EvolutionStart {
    const NAME: &'static str = "EvolutionStart";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EvolutionStop {}
impl_wire!(EvolutionStop {});
impl ApiCommand for EvolutionStop {
    const NAME: &'static str = "EvolutionStop";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingResultAvailable {}
impl_wire!(TrainingResultAvailable {});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingResultAvailableOkay {
    pub available: bool,
    pub candidate_ids: Vec<String>,
}
impl_wire!(TrainingResultAvailableOkay {
    available,
    candidate_ids
});

impl ApiCommand for TrainingResultAvailable {
    const NAME: &'static str = "TrainingResultAvailable";
    type Okay = TrainingResultAvailableOkay;
}

/// Persist the named candidates from the unsaved training result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingResultSave {
    pub ids: Vec<String>,
}
impl_wire!(TrainingResultSave { ids });

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingResultSaveOkay {
    pub saved: Vec<String>,
    pub discarded_count: u32,
}
impl_wire!(TrainingResultSaveOkay {
    saved,
    discarded_count
});

impl ApiCommand for TrainingResultSave {
    const NAME: &'static str = "TrainingResultSave";
    type Okay = TrainingResultSaveOkay;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingResultDiscard {}
impl_wire!(TrainingResultDiscard {});
impl ApiCommand for TrainingResultDiscard {
    const NAME: &'static str = "TrainingResultDiscard";
    type Okay = ();
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingBestSnapshotGet {}
impl_wire!(TrainingBestSnapshotGet {});

impl ApiCommand for TrainingBestSnapshotGet {
    const NAME: &'static str = "TrainingBestSnapshotGet";
    type Okay = Option<super::events::TrainingBestSnapshot>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenomeList {}
impl_wire!(GenomeList {});

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenomeListOkay {
    pub ids: Vec<String>,
}
impl_wire!(GenomeListOkay { ids });

impl ApiCommand for GenomeList {
    const NAME: &'static str = "GenomeList";
    type Okay = GenomeListOkay;
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetSimStats {}
impl_wire!(GetSimStats {});

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimStats {
    pub steps: u64,
    pub sim_time: f64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}
impl_wire!(SimStats {
    steps,
    sim_time,
    fps,
    width,
    height
});

impl ApiCommand for GetSimStats {
    const NAME: &'static str = "GetSimStats";
    type Okay = SimStats;
}

//! Push events, broadcast with correlation id 0.

use serde::{Deserialize, Serialize};

use super::ApiEvent;
use crate::impl_wire;
use crate::render::{RenderMessage, RenderMessageFull, ScenarioVideoFrame};
use crate::world::WorldData;

impl ApiEvent for RenderMessageFull {
    const NAME: &'static str = "RenderMessageFull";
}

/// Pushed when a new all-time-best fitness is reached during evolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBestSnapshot {
    pub world: WorldData,
    pub organism_ids: Vec<u8>,
    pub fitness: f64,
    pub generation: u32,
    pub scenario_video_frame: Option<ScenarioVideoFrame>,
}
impl_wire!(TrainingBestSnapshot {
    world,
    organism_ids,
    fitness,
    generation,
    scenario_video_frame
});

impl ApiEvent for TrainingBestSnapshot {
    const NAME: &'static str = "TrainingBestSnapshot";
}

/// Periodic replay frames of the best genome's world during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingBestPlaybackFrame {
    pub generation: u32,
    pub message: RenderMessage,
}
impl_wire!(TrainingBestPlaybackFrame {
    generation,
    message
});

impl ApiEvent for TrainingBestPlaybackFrame {
    const NAME: &'static str = "TrainingBestPlaybackFrame";
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EvolutionProgress {
    pub generation: u32,
    pub generations_total: u32,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub evaluated: u32,
}
impl_wire!(EvolutionProgress {
    generation,
    generations_total,
    best_fitness,
    mean_fitness,
    evaluated
});

impl ApiEvent for EvolutionProgress {
    const NAME: &'static str = "EvolutionProgress";
}

/// Pushed once when an evolution run completes and results await review.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingResultReady {
    pub candidate_ids: Vec<String>,
}
impl_wire!(TrainingResultReady { candidate_ids });

impl ApiEvent for TrainingResultReady {
    const NAME: &'static str = "TrainingResultReady";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Wire;
    use pretty_assertions::assert_eq;

    #[test]
    fn best_snapshot_roundtrip_with_and_without_video() {
        let mut snapshot = TrainingBestSnapshot {
            world: WorldData {
                width: 2,
                height: 2,
                timestep: 5,
                cells: vec![Default::default(); 4],
                ..Default::default()
            },
            organism_ids: vec![1, 2],
            fitness: 12.5,
            generation: 3,
            scenario_video_frame: None,
        };
        assert_eq!(
            TrainingBestSnapshot::from_wire_bytes(&snapshot.to_wire_bytes()).unwrap(),
            snapshot
        );

        snapshot.scenario_video_frame = Some(ScenarioVideoFrame {
            width: 4,
            height: 4,
            frame_id: 1,
            pixels: vec![0; 32],
        });
        assert_eq!(
            TrainingBestSnapshot::from_wire_bytes(&snapshot.to_wire_bytes()).unwrap(),
            snapshot
        );
    }
}

//! Evolution and training: genome storage, fitness evaluation and the
//! incremental generation loop driven by the server state machine.

use std::path::PathBuf;

use dirtproto::api::server::EvolutionStart;
use dirtproto::error::ApiError;
use dirtproto::scenario::ScenarioId;
use dirtproto::world::{Entity, EntityKind, Vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::world::World;

/// A flat weight vector; the brain seam interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub weights: Vec<f64>,
}

impl Genome {
    pub const WEIGHT_COUNT: usize = 6;

    fn random(rng: &mut StdRng) -> Self {
        Self {
            weights: (0..Self::WEIGHT_COUNT).map(|_| rng.gen_range(-1.0..1.0)).collect(),
        }
    }

    fn mutated(&self, rng: &mut StdRng, rate: f64) -> Self {
        Self {
            weights: self
                .weights
                .iter()
                .map(|w| (w + rng.gen_range(-rate..rate)).clamp(-2.0, 2.0))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeMetadata {
    pub fitness: f64,
    pub generation: u32,
    pub scenario_id: ScenarioId,
}

/// Directory of per-id genome + metadata files.
#[derive(Debug, Clone)]
pub struct GenomeRepository {
    dir: PathBuf,
}

impl GenomeRepository {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ApiError::new(format!("Failed to open genome repository: {e}")))?;
        Ok(Self { dir })
    }

    fn genome_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.genome.json"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.meta.json"))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.genome_path(id).exists()
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        entry
                            .file_name()
                            .to_str()
                            .and_then(|name| name.strip_suffix(".genome.json"))
                            .map(|id| id.to_string())
                    })
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn save(
        &self,
        id: &str,
        genome: &Genome,
        metadata: &GenomeMetadata,
    ) -> Result<(), ApiError> {
        if self.contains(id) {
            return Err(ApiError::new(format!(
                "Genome '{id}' already exists in the repository"
            )));
        }
        let genome_body = serde_json::to_string_pretty(genome)
            .map_err(|e| ApiError::new(format!("Serialize genome: {e}")))?;
        let meta_body = serde_json::to_string_pretty(metadata)
            .map_err(|e| ApiError::new(format!("Serialize metadata: {e}")))?;
        std::fs::write(self.genome_path(id), genome_body)
            .map_err(|e| ApiError::new(format!("Write genome: {e}")))?;
        std::fs::write(self.meta_path(id), meta_body)
            .map_err(|e| ApiError::new(format!("Write metadata: {e}")))?;
        info!(target: "evolution", id, "Genome saved");
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<(Genome, GenomeMetadata), ApiError> {
        let genome: Genome = serde_json::from_str(
            &std::fs::read_to_string(self.genome_path(id))
                .map_err(|_| ApiError::new(format!("Genome '{id}' not found")))?,
        )
        .map_err(|e| ApiError::new(format!("Parse genome '{id}': {e}")))?;
        let metadata: GenomeMetadata = serde_json::from_str(
            &std::fs::read_to_string(self.meta_path(id))
                .map_err(|_| ApiError::new(format!("Metadata for '{id}' not found")))?,
        )
        .map_err(|e| ApiError::new(format!("Parse metadata '{id}': {e}")))?;
        Ok((genome, metadata))
    }
}

/// Movement-scored evaluation: the genome drives a duck across a flat
/// world; fitness rewards rightward distance plus sustained motion.
pub fn evaluate_genome(genome: &Genome, steps: u32, timestep: f64) -> (f64, World) {
    let mut world = World::new(World::DEFAULT_WIDTH, World::DEFAULT_HEIGHT);
    for x in 0..world.width() {
        world.place(x, world.height() - 1, dirtproto::world::Material::Stone, 1.0);
    }

    let mut duck = Entity {
        id: 1,
        kind: EntityKind::Duck,
        position: Vec2::new(1.0, (world.height() - 2) as f64),
        velocity: Vec2::default(),
        facing_left: false,
        frame: 0,
    };

    let w = &genome.weights;
    let mut movement_score = 0.0;
    let world_width = world.width() as f64;

    for step in 0..steps {
        // Tiny policy net: inputs are normalized position, velocity and a
        // slow oscillator; output is a horizontal impulse.
        let x_norm = duck.position.x / world_width;
        let oscillator = ((step as f64) * w[4].abs().max(0.01)).sin();
        let activation =
            (w[0] * x_norm + w[1] * duck.velocity.x / 10.0 + w[2] * oscillator + w[3]).tanh();

        duck.velocity.x = (duck.velocity.x + activation * w[5].abs() * 10.0 * timestep)
            .clamp(-10.0, 10.0);
        duck.position.x = (duck.position.x + duck.velocity.x * timestep)
            .clamp(0.0, world_width - 1.0);
        duck.facing_left = duck.velocity.x < 0.0;
        duck.frame = (step % 4) as u16;

        movement_score += duck.velocity.x.abs() * timestep;
        world.tick(timestep);
    }

    let distance = duck.position.x - 1.0;
    let fitness = distance + movement_score * 0.1;
    world.entities.push(duck);
    (fitness, world)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingCandidate {
    pub id: String,
    pub genome: Genome,
    pub metadata: GenomeMetadata,
}

/// What an evolution run leaves behind for the operator to review.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingResult {
    pub summary: String,
    pub candidates: Vec<TrainingCandidate>,
    pub best_fitness: f64,
}

/// Outcome of one evaluation step of the run.
pub enum StepOutcome {
    /// One candidate evaluated; `new_best` carries its world snapshot.
    Evaluated {
        new_best: Option<(f64, World)>,
    },
    GenerationComplete {
        generation: u32,
        best_fitness: f64,
        mean_fitness: f64,
        evaluated: u32,
    },
    RunComplete(TrainingResult),
}

/// An in-flight evolution run, advanced one candidate at a time so the
/// state machine stays responsive between evaluations.
pub struct EvolutionRun {
    params: EvolutionStart,
    rng: StdRng,
    population: Vec<Genome>,
    fitnesses: Vec<f64>,
    next_index: usize,
    generation: u32,
    best: Option<(Genome, f64)>,
}

impl EvolutionRun {
    pub fn new(params: EvolutionStart) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed.unwrap_or(0xD1_57));
        let population = (0..params.population.max(2))
            .map(|_| Genome::random(&mut rng))
            .collect();
        Self {
            params,
            rng,
            population,
            fitnesses: Vec::new(),
            next_index: 0,
            generation: 0,
            best: None,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn generations_total(&self) -> u32 {
        self.params.generations
    }

    pub fn best_fitness(&self) -> f64 {
        self.best.as_ref().map(|(_, f)| *f).unwrap_or(f64::MIN)
    }

    pub fn best_genome(&self) -> Option<&Genome> {
        self.best.as_ref().map(|(genome, _)| genome)
    }

    /// Evaluate the next candidate, rolling generations as they fill.
    pub fn step(&mut self) -> StepOutcome {
        let genome = self.population[self.next_index].clone();
        let (fitness, world) =
            evaluate_genome(&genome, self.params.steps_per_evaluation, self.params.timestep);
        self.fitnesses.push(fitness);
        self.next_index += 1;

        let new_best = if fitness > self.best_fitness() {
            self.best = Some((genome, fitness));
            Some((fitness, world))
        } else {
            None
        };

        if self.next_index < self.population.len() {
            return StepOutcome::Evaluated { new_best };
        }

        // Generation complete.
        let evaluated = self.fitnesses.len() as u32;
        let mean_fitness = self.fitnesses.iter().sum::<f64>() / evaluated as f64;
        let best_fitness = self.best_fitness();
        self.generation += 1;
        debug!(
            target: "evolution",
            generation = self.generation,
            best_fitness,
            mean_fitness,
            "Generation complete"
        );

        if self.generation >= self.params.generations {
            return StepOutcome::RunComplete(self.finish());
        }

        self.breed_next_generation();
        StepOutcome::GenerationComplete {
            generation: self.generation,
            best_fitness,
            mean_fitness,
            evaluated,
        }
    }

    fn breed_next_generation(&mut self) {
        let mut ranked: Vec<(usize, f64)> = self
            .fitnesses
            .iter()
            .copied()
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let survivors = (self.population.len() / 4).max(1);

        let mut next = Vec::with_capacity(self.population.len());
        for (index, _) in ranked.iter().take(survivors) {
            next.push(self.population[*index].clone());
        }
        while next.len() < self.population.len() {
            let parent = next[self.rng.gen_range(0..survivors)].clone();
            next.push(parent.mutated(&mut self.rng, 0.25));
        }

        self.population = next;
        self.fitnesses.clear();
        self.next_index = 0;
    }

    fn finish(&mut self) -> TrainingResult {
        // Final generation's top quarter become the saved-candidate pool.
        let mut ranked: Vec<(usize, f64)> = self
            .fitnesses
            .iter()
            .copied()
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let keep = (self.population.len() / 4).max(1);

        let candidates: Vec<TrainingCandidate> = ranked
            .iter()
            .take(keep)
            .enumerate()
            .map(|(rank, (index, fitness))| TrainingCandidate {
                id: format!("g{}-r{}-{}", self.generation, rank, uuid::Uuid::new_v4()),
                genome: self.population[*index].clone(),
                metadata: GenomeMetadata {
                    fitness: *fitness,
                    generation: self.generation,
                    scenario_id: self.params.scenario_id,
                },
            })
            .collect();

        TrainingResult {
            summary: format!(
                "{} generations, population {}, best fitness {:.3}",
                self.generation,
                self.population.len(),
                self.best_fitness()
            ),
            candidates,
            best_fitness: self.best_fitness(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(population: u32, generations: u32) -> EvolutionStart {
        EvolutionStart {
            scenario_id: ScenarioId::Sandbox,
            population,
            generations,
            timestep: 0.016,
            steps_per_evaluation: 50,
            seed: Some(7),
        }
    }

    #[test]
    fn repository_roundtrip_and_collision() {
        let dir = tempfile::tempdir().unwrap();
        let repo = GenomeRepository::open(dir.path()).unwrap();
        let genome = Genome {
            weights: vec![0.1; Genome::WEIGHT_COUNT],
        };
        let metadata = GenomeMetadata {
            fitness: 4.2,
            generation: 3,
            scenario_id: ScenarioId::Sandbox,
        };

        repo.save("abc", &genome, &metadata).unwrap();
        assert!(repo.contains("abc"));
        assert_eq!(repo.list(), vec!["abc".to_string()]);

        let (loaded, loaded_meta) = repo.load("abc").unwrap();
        assert_eq!(loaded, genome);
        assert_eq!(loaded_meta, metadata);

        let err = repo.save("abc", &genome, &metadata).unwrap_err();
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let genome = Genome {
            weights: vec![0.5, -0.2, 0.8, 0.1, 0.3, 0.9],
        };
        let (a, _) = evaluate_genome(&genome, 100, 0.016);
        let (b, _) = evaluate_genome(&genome, 100, 0.016);
        assert_eq!(a, b);
    }

    #[test]
    fn run_completes_after_configured_generations() {
        let mut run = EvolutionRun::new(params(4, 2));
        let mut completions = 0;
        loop {
            match run.step() {
                StepOutcome::RunComplete(result) => {
                    assert!(!result.candidates.is_empty());
                    assert!(result.summary.contains("2 generations"));
                    completions += 1;
                    break;
                }
                StepOutcome::GenerationComplete { generation, .. } => {
                    assert!(generation < 2);
                }
                StepOutcome::Evaluated { .. } => {}
            }
        }
        assert_eq!(completions, 1);
    }

    #[test]
    fn candidates_carry_distinct_ids() {
        let mut run = EvolutionRun::new(params(8, 1));
        let result = loop {
            if let StepOutcome::RunComplete(result) = run.step() {
                break result;
            }
        };
        let mut ids: Vec<&str> = result.candidates.iter().map(|c| c.id.as_str()).collect();
        let before = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn same_seed_reproduces_best_fitness() {
        let run_once = || {
            let mut run = EvolutionRun::new(params(4, 2));
            loop {
                if let StepOutcome::RunComplete(result) = run.step() {
                    return result.best_fitness;
                }
            }
        };
        assert_eq!(run_once(), run_once());
    }
}

//! Built-in grid-world scenarios.

use dirtproto::error::ApiError;
use dirtproto::scenario::{
    BenchmarkConfig, ClockConfig, DamBreakConfig, EmptyConfig, FallingDirtConfig, RainingConfig,
    SandboxConfig, ScenarioConfig, ScenarioId, ScenarioKind, ScenarioMetadata, TreeBrainType,
    TreeGerminationConfig, WaterEqualizationConfig,
};
use dirtproto::world::Material;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Scenario;
use crate::world::World;

fn metadata(
    id: ScenarioId,
    name: &str,
    description: &str,
    category: &str,
) -> ScenarioMetadata {
    ScenarioMetadata {
        id,
        name: name.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        kind: ScenarioKind::GridWorld,
        required_width: None,
        required_height: None,
    }
}

fn wrong_config(scenario: ScenarioId, config: &ScenarioConfig) -> ApiError {
    ApiError::new(format!(
        "Config variant '{}' does not match scenario '{}'",
        config.scenario_id(),
        scenario
    ))
}

/// Fixed seed: scenario randomness must replay identically run to run.
const SCENARIO_SEED: u64 = 0x5EED_D127;

// ---------------------------------------------------------------------------
// Empty

pub struct EmptyScenario {
    config: EmptyConfig,
}

impl EmptyScenario {
    pub fn new() -> Self {
        Self {
            config: EmptyConfig::default(),
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(ScenarioId::Empty, "Empty", "An empty world", "basic")
    }
}

impl Scenario for EmptyScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::Empty(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::Empty(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::Empty, &other)),
        }
    }

    fn setup(&mut self, _world: &mut World) {}

    fn tick(&mut self, _world: &mut World, _dt: f64) {}
}

// ---------------------------------------------------------------------------
// Sandbox

/// Interactive playground: dirt quadrant, water column, periodic dirt
/// throws from the right edge, optional rain.
pub struct SandboxScenario {
    config: SandboxConfig,
    rng: StdRng,
    throw_accumulator: f64,
    rain_accumulator: f64,
}

impl SandboxScenario {
    pub fn new() -> Self {
        Self {
            config: SandboxConfig::default(),
            rng: StdRng::seed_from_u64(SCENARIO_SEED),
            throw_accumulator: 0.0,
            rain_accumulator: 0.0,
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(
            ScenarioId::Sandbox,
            "Sandbox",
            "Interactive playground with configurable generators",
            "basic",
        )
    }
}

impl Scenario for SandboxScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::Sandbox(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::Sandbox(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::Sandbox, &other)),
        }
    }

    fn setup(&mut self, world: &mut World) {
        self.rng = StdRng::seed_from_u64(SCENARIO_SEED);
        self.throw_accumulator = 0.0;
        self.rain_accumulator = 0.0;

        if self.config.quadrant_enabled {
            for y in world.height() / 2..world.height() {
                for x in world.width() / 2..world.width() {
                    world.place(x, y, Material::Dirt, 1.0);
                }
            }
        }

        if self.config.water_column_enabled {
            let column_width = 5.min(world.width());
            let column_height = 20.min(world.height());
            for y in 0..column_height {
                for x in 0..column_width {
                    world.place(x, y, Material::Water, 1.0);
                }
            }
        }
    }

    fn tick(&mut self, world: &mut World, dt: f64) {
        if self.config.right_throw_enabled {
            self.throw_accumulator += dt;
            // One throw every two seconds of sim time.
            if self.throw_accumulator >= 2.0 {
                self.throw_accumulator -= 2.0;
                let x = world.width() - 1;
                let y = self.rng.gen_range(0..world.height() / 2);
                if world.cell(x, y).is_empty() {
                    let cell = world.cell_mut(x, y);
                    *cell = dirtproto::world::Cell::of_material(Material::Dirt, 1.0);
                    cell.velocity.x = -5.0;
                }
            }
        }

        if self.config.rain_rate > 0.0 {
            self.rain_accumulator += self.config.rain_rate * dt;
            while self.rain_accumulator >= 1.0 {
                self.rain_accumulator -= 1.0;
                let x = self.rng.gen_range(0..world.width());
                if world.cell(x, 0).is_empty() {
                    world.place(x, 0, Material::Water, 0.5);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Raining

pub struct RainingScenario {
    config: RainingConfig,
    rng: StdRng,
    accumulator: f64,
}

impl RainingScenario {
    pub fn new() -> Self {
        Self {
            config: RainingConfig::default(),
            rng: StdRng::seed_from_u64(SCENARIO_SEED),
            accumulator: 0.0,
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(
            ScenarioId::Raining,
            "Raining",
            "Continuous rain with optional floor drain",
            "water",
        )
    }
}

impl Scenario for RainingScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::Raining(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::Raining(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::Raining, &other)),
        }
    }

    fn setup(&mut self, world: &mut World) {
        self.rng = StdRng::seed_from_u64(SCENARIO_SEED);
        self.accumulator = 0.0;

        // Stone floor with an optional drain opening in the middle.
        let floor = world.height() - 1;
        let drain = self.config.drain_size.max(0.0) as u32;
        let drain_start = world.width().saturating_sub(drain) / 2;
        for x in 0..world.width() {
            if drain > 0 && x >= drain_start && x < drain_start + drain {
                continue;
            }
            world.place(x, floor, Material::Stone, 1.0);
        }
    }

    fn tick(&mut self, world: &mut World, dt: f64) {
        self.accumulator += self.config.rain_rate * dt;
        while self.accumulator >= 1.0 {
            self.accumulator -= 1.0;
            let x = self.rng.gen_range(0..world.width());
            if world.cell(x, 0).is_empty() {
                world.place(x, 0, Material::Water, 0.6);
            }
        }

        if self.config.max_fill_percent > 0.0
            && world.fill_fraction() * 100.0 > self.config.max_fill_percent
        {
            // Evaporate from the top row down until under the cap.
            'evaporate: for y in 0..world.height() {
                for x in 0..world.width() {
                    if world.cell(x, y).material == Material::Water {
                        *world.cell_mut(x, y) = Default::default();
                        if world.fill_fraction() * 100.0 <= self.config.max_fill_percent {
                            break 'evaporate;
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DamBreak

/// Classic dam break: a water column against the left wall, released at
/// t = 0.
pub struct DamBreakScenario {
    config: DamBreakConfig,
}

impl DamBreakScenario {
    pub fn new() -> Self {
        Self {
            config: DamBreakConfig::default(),
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(
            ScenarioId::DamBreak,
            "Dam Break",
            "Water column collapse against the left wall",
            "water",
        )
    }
}

impl Scenario for DamBreakScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::DamBreak(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::DamBreak(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::DamBreak, &other)),
        }
    }

    fn setup(&mut self, world: &mut World) {
        let column_width =
            ((world.width() as f64 * self.config.water_fraction).round() as u32).max(1);
        for y in 0..world.height() {
            for x in 0..column_width.min(world.width()) {
                world.place(x, y, Material::Water, 1.0);
            }
        }
    }

    fn tick(&mut self, _world: &mut World, _dt: f64) {}
}

// ---------------------------------------------------------------------------
// FallingDirt

pub struct FallingDirtScenario {
    config: FallingDirtConfig,
    rng: StdRng,
    accumulator: f64,
}

impl FallingDirtScenario {
    pub fn new() -> Self {
        Self {
            config: FallingDirtConfig::default(),
            rng: StdRng::seed_from_u64(SCENARIO_SEED),
            accumulator: 0.0,
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(
            ScenarioId::FallingDirt,
            "Falling Dirt",
            "Dirt continuously spawning at the top edge",
            "basic",
        )
    }
}

impl Scenario for FallingDirtScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::FallingDirt(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::FallingDirt(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::FallingDirt, &other)),
        }
    }

    fn setup(&mut self, _world: &mut World) {
        self.rng = StdRng::seed_from_u64(SCENARIO_SEED);
        self.accumulator = 0.0;
    }

    fn tick(&mut self, world: &mut World, dt: f64) {
        self.accumulator += self.config.spawn_rate * dt;
        while self.accumulator >= 1.0 {
            self.accumulator -= 1.0;
            let x = self.rng.gen_range(0..world.width());
            if world.cell(x, 0).is_empty() {
                world.place(x, 0, Material::Dirt, 1.0);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WaterEqualization

/// Two connected water columns of different heights; the interesting part
/// is watching the levels meet.
pub struct WaterEqualizationScenario {
    config: WaterEqualizationConfig,
}

impl WaterEqualizationScenario {
    pub fn new() -> Self {
        Self {
            config: WaterEqualizationConfig::default(),
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(
            ScenarioId::WaterEqualization,
            "Water Equalization",
            "Connected columns settling to a common level",
            "water",
        )
    }
}

impl Scenario for WaterEqualizationScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::WaterEqualization(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::WaterEqualization(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::WaterEqualization, &other)),
        }
    }

    fn setup(&mut self, world: &mut World) {
        let wall_x = world.width() / 2;
        // Dividing wall with a one-cell gap at the floor.
        for y in 0..world.height().saturating_sub(1) {
            world.place(wall_x, y, Material::Stone, 1.0);
        }

        let left_top = world
            .height()
            .saturating_sub(self.config.left_column_height.min(world.height()));
        for y in left_top..world.height() {
            for x in 0..wall_x {
                world.place(x, y, Material::Water, 1.0);
            }
        }

        let right_top = world
            .height()
            .saturating_sub(self.config.right_column_height.min(world.height()));
        for y in right_top..world.height() {
            for x in wall_x + 1..world.width() {
                world.place(x, y, Material::Water, 1.0);
            }
        }
    }

    fn tick(&mut self, _world: &mut World, _dt: f64) {}
}

// ---------------------------------------------------------------------------
// Benchmark

/// Dense load for measuring tick cost; half the grid starts as sand.
pub struct BenchmarkScenario {
    config: BenchmarkConfig,
}

impl BenchmarkScenario {
    pub fn new() -> Self {
        Self {
            config: BenchmarkConfig::default(),
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(
            ScenarioId::Benchmark,
            "Benchmark",
            "Dense sand load for performance measurement",
            "tools",
        )
    }
}

impl Scenario for BenchmarkScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::Benchmark(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::Benchmark(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::Benchmark, &other)),
        }
    }

    fn setup(&mut self, world: &mut World) {
        for y in 0..world.height() / 2 {
            for x in 0..world.width() {
                world.place(x, y, Material::Sand, 1.0);
            }
        }
    }

    fn tick(&mut self, _world: &mut World, _dt: f64) {}
}

// ---------------------------------------------------------------------------
// Clock

/// Renders the running time as sand digits on a 3x5 cell font. The
/// display clock derives from accumulated sim time plus the configured
/// timezone offset, so replays render identically.
pub struct ClockScenario {
    config: ClockConfig,
}

/// 3x5 digit bitmaps, row-major, most significant bit left.
const DIGIT_FONT: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b010, 0b010, 0b010], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

impl ClockScenario {
    pub fn new() -> Self {
        Self {
            config: ClockConfig::default(),
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        let mut meta = metadata(
            ScenarioId::Clock,
            "Clock",
            "Falling-dirt digits showing the running time",
            "display",
        );
        meta.required_width = Some(36);
        meta.required_height = Some(9);
        meta
    }

    fn draw_digit(world: &mut World, digit: usize, origin_x: u32, origin_y: u32) {
        for (row, bits) in DIGIT_FONT[digit].iter().enumerate() {
            for column in 0..3u32 {
                let lit = bits & (0b100 >> column) != 0;
                let x = origin_x + column;
                let y = origin_y + row as u32;
                if x < world.width() && y < world.height() {
                    if lit {
                        world.place(x, y, Material::Sand, 1.0);
                    } else {
                        *world.cell_mut(x, y) = Default::default();
                    }
                }
            }
        }
    }

    fn render_time(&self, world: &mut World) {
        let offset_seconds = self.config.timezone_offset_minutes as i64 * 60;
        let total = world.sim_time() as i64 + offset_seconds.max(0);
        let hours = (total / 3600) % 24;
        let minutes = (total / 60) % 60;
        let seconds = total % 60;

        let mut digits = vec![
            (hours / 10) as usize,
            (hours % 10) as usize,
            (minutes / 10) as usize,
            (minutes % 10) as usize,
        ];
        if self.config.show_seconds {
            digits.push((seconds / 10) as usize);
            digits.push((seconds % 10) as usize);
        }

        let y = 2.min(world.height().saturating_sub(5));
        for (position, digit) in digits.iter().enumerate() {
            // 3 cells of glyph + 1 of spacing, extra gap between pairs.
            let x = 1 + position as u32 * 4 + (position as u32 / 2) * 2;
            Self::draw_digit(world, *digit, x, y);
        }
    }
}

impl Scenario for ClockScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::Clock(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::Clock(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::Clock, &other)),
        }
    }

    fn setup(&mut self, world: &mut World) {
        self.render_time(world);
    }

    fn tick(&mut self, world: &mut World, _dt: f64) {
        self.render_time(world);
    }
}

// ---------------------------------------------------------------------------
// TreeGermination

/// A seed takes root and grows a small tree, tracked as organism 1 with
/// bone connections between trunk segments.
pub struct TreeGerminationScenario {
    config: TreeGerminationConfig,
    growth_accumulator: f64,
    grown: u32,
}

impl TreeGerminationScenario {
    const MAX_TRUNK: u32 = 8;

    pub fn new() -> Self {
        Self {
            config: TreeGerminationConfig::default(),
            growth_accumulator: 0.0,
            grown: 0,
        }
    }

    pub fn default_metadata() -> ScenarioMetadata {
        metadata(
            ScenarioId::TreeGermination,
            "Tree Germination",
            "A seed growing into a tree organism",
            "organisms",
        )
    }

    fn seed_position(world: &World) -> (u32, u32) {
        (world.width() / 2, world.height() - 2)
    }
}

impl Scenario for TreeGerminationScenario {
    fn metadata(&self) -> ScenarioMetadata {
        Self::default_metadata()
    }

    fn config(&self) -> ScenarioConfig {
        ScenarioConfig::TreeGermination(self.config.clone())
    }

    fn set_config(&mut self, config: ScenarioConfig, _world: &mut World) -> Result<(), ApiError> {
        match config {
            ScenarioConfig::TreeGermination(c) => {
                self.config = c;
                Ok(())
            }
            other => Err(wrong_config(ScenarioId::TreeGermination, &other)),
        }
    }

    fn setup(&mut self, world: &mut World) {
        self.growth_accumulator = 0.0;
        self.grown = 0;

        // Dirt bed across the bottom two rows, seed root in the middle.
        for y in world.height().saturating_sub(2)..world.height() {
            for x in 0..world.width() {
                world.place(x, y, Material::Dirt, 1.0);
            }
        }
        let (seed_x, seed_y) = Self::seed_position(world);
        world.place(seed_x, seed_y, Material::Root, 1.0);
        world.set_organism(seed_x, seed_y, 1);
    }

    fn tick(&mut self, world: &mut World, dt: f64) {
        if self.grown >= Self::MAX_TRUNK {
            return;
        }
        // Neural brains grow faster with a fit genome; the rule-based
        // brain grows one segment per simulated second.
        let growth_rate = match self.config.brain_type {
            TreeBrainType::RuleBased => 1.0,
            TreeBrainType::NeuralNet => 1.5,
        };
        self.growth_accumulator += growth_rate * dt;
        while self.growth_accumulator >= 1.0 && self.grown < Self::MAX_TRUNK {
            self.growth_accumulator -= 1.0;
            self.grown += 1;

            let (seed_x, seed_y) = Self::seed_position(world);
            let y = seed_y.saturating_sub(self.grown);
            world.place(seed_x, y, Material::Wood, 1.0);
            world.set_organism(seed_x, y, 1);
            world.bones.push(dirtproto::world::BoneData {
                cell_a: dirtproto::world::Vec2i {
                    x: seed_x as i32,
                    y: (y + 1) as i32,
                },
                cell_b: dirtproto::world::Vec2i {
                    x: seed_x as i32,
                    y: y as i32,
                },
            });

            // Crown of leaves once the trunk tops out.
            if self.grown == Self::MAX_TRUNK {
                for dy in 0..2u32 {
                    for dx in 0..3u32 {
                        let leaf_x = (seed_x + dx).saturating_sub(1);
                        let leaf_y = y.saturating_sub(1 + dy);
                        if leaf_x < world.width() {
                            world.place(leaf_x, leaf_y, Material::Leaf, 1.0);
                            world.set_organism(leaf_x, leaf_y, 1);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new(45, 30)
    }

    #[test]
    fn sandbox_setup_honors_feature_flags() {
        let mut scenario = SandboxScenario::new();
        let mut w = world();
        scenario
            .set_config(
                ScenarioConfig::Sandbox(SandboxConfig {
                    quadrant_enabled: true,
                    water_column_enabled: false,
                    right_throw_enabled: false,
                    rain_rate: 0.0,
                }),
                &mut w,
            )
            .unwrap();
        scenario.setup(&mut w);

        assert_eq!(w.cell(40, 25).material, Material::Dirt);
        assert_eq!(w.cell(0, 0).material, Material::Air);
    }

    #[test]
    fn config_variant_mismatch_is_rejected() {
        let mut scenario = RainingScenario::new();
        let mut w = world();
        let err = scenario
            .set_config(ScenarioConfig::Empty(EmptyConfig::default()), &mut w)
            .unwrap_err();
        assert!(err.message.contains("does not match"));
    }

    #[test]
    fn raining_spawns_water_over_time() {
        let mut scenario = RainingScenario::new();
        let mut w = world();
        scenario.setup(&mut w);
        for _ in 0..120 {
            scenario.tick(&mut w, 0.016);
            w.tick(0.016);
        }
        let water = w
            .cells()
            .iter()
            .filter(|c| c.material == Material::Water)
            .count();
        assert!(water > 0);
    }

    #[test]
    fn raining_drain_leaves_an_opening() {
        let mut scenario = RainingScenario::new();
        let mut w = world();
        scenario
            .set_config(
                ScenarioConfig::Raining(RainingConfig {
                    rain_rate: 0.0,
                    drain_size: 5.0,
                    max_fill_percent: 0.0,
                }),
                &mut w,
            )
            .unwrap();
        scenario.setup(&mut w);
        let floor = w.height() - 1;
        let open = (0..w.width()).filter(|&x| w.cell(x, floor).is_empty()).count();
        assert_eq!(open, 5);
    }

    #[test]
    fn dam_break_water_column_scales_with_fraction() {
        let mut scenario = DamBreakScenario::new();
        let mut w = world();
        scenario.setup(&mut w);
        // Default 0.35 of 45 columns, rounded.
        assert_eq!(w.cell(15, 10).material, Material::Water);
        assert_eq!(w.cell(16, 10).material, Material::Air);
    }

    #[test]
    fn water_equalization_builds_wall_with_gap() {
        let mut scenario = WaterEqualizationScenario::new();
        let mut w = world();
        scenario.setup(&mut w);
        let wall_x = w.width() / 2;
        assert_eq!(w.cell(wall_x, 0).material, Material::Stone);
        assert!(w.cell(wall_x, w.height() - 1).is_empty());
    }

    #[test]
    fn clock_draws_digits_deterministically() {
        let mut scenario = ClockScenario::new();
        let mut a = World::new(36, 9);
        let mut b = World::new(36, 9);
        scenario.setup(&mut a);
        scenario.setup(&mut b);
        assert_eq!(a.snapshot(), b.snapshot());
        let sand = a
            .cells()
            .iter()
            .filter(|c| c.material == Material::Sand)
            .count();
        assert!(sand > 0, "clock rendered nothing");
    }

    #[test]
    fn tree_growth_creates_organism_cells_and_bones() {
        let mut scenario = TreeGerminationScenario::new();
        let mut w = world();
        scenario.setup(&mut w);
        for _ in 0..600 {
            scenario.tick(&mut w, 0.016);
        }
        let organism_cells = w.organism_grid().iter().filter(|&&id| id == 1).count();
        assert!(organism_cells > 5, "tree never grew: {organism_cells}");
        assert!(!w.bones.is_empty());
    }

    #[test]
    fn reset_rebuilds_setup_state() {
        let mut scenario = SandboxScenario::new();
        let mut w = world();
        scenario.setup(&mut w);
        for _ in 0..50 {
            scenario.tick(&mut w, 0.016);
            w.tick(0.016);
        }
        scenario.reset(&mut w);
        assert_eq!(w.timestep(), 0);
        assert_eq!(w.cell(40, 25).material, Material::Dirt);
    }
}
